use anyhow::Result;
use log::debug;
use rand::seq::IndexedRandom;

use crate::{
    core::{
        cancel::CallCancelMode,
        error::InteractionError,
        hash::{
            HashMap,
            IndexMap,
            IndexSet,
        },
        id::{
            Id,
            IdScope,
            ScopedIdGenerator,
        },
        invocation_policy::InvocationPolicy,
        uri::Uri,
    },
    router::snapshot::RegistrationSnapshot,
};

/// A procedure and the callees registered for it.
#[derive(Debug)]
pub(crate) struct Registration {
    pub id: Id,
    pub procedure: Uri,
    pub invocation_policy: InvocationPolicy,
    /// Callees, in order of registration.
    pub callees: Vec<Id>,
    next_callee: usize,
}

impl Registration {
    fn select_callee(&mut self) -> Option<Id> {
        match self.invocation_policy {
            InvocationPolicy::Single | InvocationPolicy::First => self.callees.first().cloned(),
            InvocationPolicy::Last => self.callees.last().cloned(),
            InvocationPolicy::Random => self.callees.choose(&mut rand::rng()).cloned(),
            InvocationPolicy::RoundRobin => {
                if self.callees.is_empty() {
                    return None;
                }
                let index = self.next_callee % self.callees.len();
                self.next_callee = index + 1;
                Some(self.callees[index])
            }
        }
    }

    fn remove_callee(&mut self, callee: Id) -> bool {
        let index = match self.callees.iter().position(|id| *id == callee) {
            Some(index) => index,
            None => return false,
        };
        self.callees.remove(index);
        if index < self.next_callee {
            self.next_callee -= 1;
        }
        true
    }
}

/// A call routed to a callee, waiting for YIELD or ERROR.
#[derive(Debug, Clone)]
pub(crate) struct PendingInvocation {
    pub id: Id,
    pub caller: Id,
    pub caller_request: Id,
    pub callee: Id,
    pub registration: Id,
    /// Set once the caller canceled with mode kill; the callee still owes a response.
    pub interrupted: bool,
}

/// What the router must send to cancel a call.
#[derive(Debug, Clone)]
pub(crate) struct Cancellation {
    pub invocation: PendingInvocation,
    /// INTERRUPT the callee.
    pub interrupt_callee: bool,
    /// Reply to the caller with `wamp.error.canceled` right away.
    pub error_caller: bool,
}

/// Registration table and invocation correlation of a realm.
#[derive(Debug, Default)]
pub(crate) struct Dealer {
    /// Registrations, in order of creation.
    registrations: IndexMap<Id, Registration>,
    by_procedure: HashMap<Uri, Id>,
    by_session: HashMap<Id, IndexSet<Id>>,
    invocations: HashMap<Id, PendingInvocation>,
    by_call: HashMap<(Id, Id), Id>,
}

impl Dealer {
    /// Registers the session as a callee of the procedure.
    ///
    /// A procedure already registered rejects new callees, unless both sides ask for the same
    /// shared invocation policy.
    pub fn register(
        &mut self,
        ids: &ScopedIdGenerator,
        session: Id,
        procedure: Uri,
        invocation_policy: InvocationPolicy,
    ) -> Result<Id> {
        let id = match self.by_procedure.get(&procedure) {
            Some(id) => {
                let registration = self
                    .registrations
                    .get_mut(id)
                    .ok_or(InteractionError::NoSuchRegistration)?;
                if registration.callees.contains(&session)
                    || !registration.invocation_policy.shared()
                    || registration.invocation_policy != invocation_policy
                {
                    return Err(InteractionError::ProcedureAlreadyExists.into());
                }
                registration.callees.push(session);
                *id
            }
            None => {
                let id = ids.next_id(IdScope::Registration);
                self.registrations.insert(
                    id,
                    Registration {
                        id,
                        procedure: procedure.clone(),
                        invocation_policy,
                        callees: Vec::from_iter([session]),
                        next_callee: 0,
                    },
                );
                self.by_procedure.insert(procedure, id);
                id
            }
        };
        self.by_session.entry(session).or_default().insert(id);
        Ok(id)
    }

    /// Removes the session from the registration's callees.
    pub fn unregister(&mut self, session: Id, registration: Id) -> Result<()> {
        let entry = self
            .registrations
            .get_mut(&registration)
            .ok_or(InteractionError::NoSuchRegistration)?;
        if !entry.remove_callee(session) {
            return Err(InteractionError::NoSuchRegistration.into());
        }
        if entry.callees.is_empty() {
            self.remove_registration(registration);
        }
        if let Some(registrations) = self.by_session.get_mut(&session) {
            registrations.shift_remove(&registration);
            if registrations.is_empty() {
                self.by_session.remove(&session);
            }
        }
        Ok(())
    }

    fn remove_registration(&mut self, id: Id) {
        if let Some(registration) = self.registrations.shift_remove(&id) {
            debug!(
                "Registration {id} for {} has no callees and was removed",
                registration.procedure
            );
            self.by_procedure.remove(&registration.procedure);
        }
    }

    /// Checks if any callee serves the procedure.
    pub fn has_procedure(&self, procedure: &Uri) -> bool {
        self.by_procedure.contains_key(procedure)
    }

    /// Selects a callee for a call and records the pending invocation.
    pub fn route_call(
        &mut self,
        ids: &ScopedIdGenerator,
        caller: Id,
        caller_request: Id,
        procedure: &Uri,
    ) -> Result<PendingInvocation> {
        let registration = self
            .by_procedure
            .get(procedure)
            .and_then(|id| self.registrations.get_mut(id))
            .ok_or(InteractionError::NoSuchProcedure)?;
        if self.by_call.contains_key(&(caller, caller_request)) {
            return Err(InteractionError::ProtocolViolation(format!(
                "call request {caller_request} is already in flight"
            ))
            .into());
        }
        let callee = registration
            .select_callee()
            .ok_or(InteractionError::NoSuchProcedure)?;
        let invocation = PendingInvocation {
            id: ids.next_id(IdScope::Invocation),
            caller,
            caller_request,
            callee,
            registration: registration.id,
            interrupted: false,
        };
        self.by_call
            .insert((caller, caller_request), invocation.id);
        self.invocations.insert(invocation.id, invocation.clone());
        Ok(invocation)
    }

    /// Completes an invocation on a response from its callee.
    ///
    /// Returns `None` if the invocation does not exist or belongs to another callee.
    pub fn complete(&mut self, callee: Id, invocation: Id) -> Option<PendingInvocation> {
        if self
            .invocations
            .get(&invocation)
            .is_none_or(|pending| pending.callee != callee)
        {
            return None;
        }
        let pending = self.invocations.remove(&invocation)?;
        self.by_call
            .remove(&(pending.caller, pending.caller_request));
        Some(pending)
    }

    /// Cancels a call made by the caller.
    ///
    /// Returns `None` if the call is not in flight, or was already interrupted.
    pub fn cancel(
        &mut self,
        caller: Id,
        caller_request: Id,
        mode: CallCancelMode,
    ) -> Option<Cancellation> {
        let invocation = *self.by_call.get(&(caller, caller_request))?;
        match mode {
            CallCancelMode::Kill => {
                let pending = self.invocations.get_mut(&invocation)?;
                if pending.interrupted {
                    return None;
                }
                pending.interrupted = true;
                Some(Cancellation {
                    invocation: pending.clone(),
                    interrupt_callee: true,
                    error_caller: false,
                })
            }
            CallCancelMode::Skip | CallCancelMode::KillNoWait => {
                self.by_call.remove(&(caller, caller_request));
                let pending = self.invocations.remove(&invocation)?;
                Some(Cancellation {
                    invocation: pending,
                    interrupt_callee: mode == CallCancelMode::KillNoWait,
                    error_caller: true,
                })
            }
        }
    }

    /// Removes every registration of the session and every invocation it takes part in.
    ///
    /// Returns invocations the session owed a response to, so that their callers can be notified.
    pub fn remove_session(&mut self, session: Id) -> Vec<PendingInvocation> {
        if let Some(registrations) = self.by_session.remove(&session) {
            for id in registrations {
                let empty = match self.registrations.get_mut(&id) {
                    Some(registration) => {
                        registration.remove_callee(session);
                        registration.callees.is_empty()
                    }
                    None => false,
                };
                if empty {
                    self.remove_registration(id);
                }
            }
        }

        let affected = self
            .invocations
            .values()
            .filter(|pending| pending.caller == session || pending.callee == session)
            .map(|pending| pending.id)
            .collect::<Vec<_>>();
        let mut orphaned = Vec::new();
        for id in affected {
            let pending = match self.invocations.remove(&id) {
                Some(pending) => pending,
                None => continue,
            };
            self.by_call
                .remove(&(pending.caller, pending.caller_request));
            if pending.caller != session {
                orphaned.push(pending);
            }
        }
        orphaned.sort_by_key(|pending| pending.id);
        orphaned
    }

    /// Number of invocations waiting for a callee response.
    pub fn pending_invocations(&self) -> usize {
        self.invocations.len()
    }

    pub fn snapshot(&self) -> Vec<RegistrationSnapshot> {
        self.registrations
            .values()
            .map(|registration| RegistrationSnapshot {
                id: registration.id,
                procedure: registration.procedure.clone(),
                invocation_policy: registration.invocation_policy,
                callees: registration.callees.clone(),
            })
            .collect()
    }
}
