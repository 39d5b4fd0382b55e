use std::{
    fmt::Debug,
    sync::Arc,
};

use anyhow::{
    Error,
    Result,
};
use log::{
    debug,
    info,
    warn,
};
use tokio::sync::{
    RwLock,
    broadcast,
};

use crate::{
    auth::Identity,
    core::{
        close::CloseReason,
        error::{
            BasicError,
            InteractionError,
            is_protocol_violation,
        },
        features::router_roles_dictionary,
        id::{
            Id,
            IdScope,
        },
        match_style::MatchStyle,
        options::{
            CallOptions,
            CancelOptions,
            PublishOptions,
            RegisterOptions,
            SubscribeOptions,
        },
        peer_info::ConnectionType,
        roles::parse_peer_roles,
        types::{
            Dictionary,
            Value,
        },
    },
    message::{
        common::{
            abort_message_for_error,
            error_for_request,
            error_for_request_type,
            forwarded_error,
            goodbye_and_out,
            goodbye_with_close_reason,
        },
        message::{
            CallMessage,
            CancelMessage,
            ErrorMessage,
            HelloMessage,
            InterruptMessage,
            InvocationMessage,
            Message,
            PublishMessage,
            PublishedMessage,
            RegisterMessage,
            RegisteredMessage,
            ResultMessage,
            SubscribeMessage,
            SubscribedMessage,
            UnregisterMessage,
            UnregisteredMessage,
            UnsubscribeMessage,
            UnsubscribedMessage,
            WelcomeMessage,
            YieldMessage,
        },
    },
    router::{
        app::SessionContext,
        context::RouterContext,
        realm::{
            Realm,
            RealmSession,
        },
        sink::{
            OutgoingReceiver,
            SessionSink,
        },
    },
    serializer::SerializerType,
};

#[derive(Clone)]
struct EstablishedSessionState {
    realm: Arc<Realm>,
    identity: Identity,
}

impl EstablishedSessionState {
    fn session_context(&self, session: Id) -> SessionContext<'_> {
        SessionContext {
            realm: self.realm.uri(),
            session,
            identity: &self.identity,
        }
    }
}

impl Debug for EstablishedSessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[derive(Debug)]
        #[allow(unused)]
        struct DebugEstablishedSessionState<'a> {
            realm: &'a str,
            identity: &'a Identity,
        }

        DebugEstablishedSessionState {
            realm: self.realm.uri().as_ref(),
            identity: &self.identity,
        }
        .fmt(f)
    }
}

#[derive(Debug, Default, Clone)]
enum SessionState {
    #[default]
    PreHello,
    Established(EstablishedSessionState),
    /// The router sent GOODBYE and waits for the peer's GOODBYE.
    Closing(EstablishedSessionState),
    Closed,
}

/// The router end of a WAMP session.
///
/// Handles WAMP messages in a state machine and holds all session-scoped state. Everything the
/// session owns in its realm is released when it moves to the closed state.
pub struct Session {
    id: Id,
    connection_type: ConnectionType,
    serializer: SerializerType,
    sink: SessionSink,
    state: RwLock<SessionState>,
    closed_tx: broadcast::Sender<()>,
}

impl Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connection_type", &self.connection_type)
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(
        id: Id,
        connection_type: ConnectionType,
        serializer: SerializerType,
        context: &RouterContext,
    ) -> (Self, OutgoingReceiver) {
        let (sink, outgoing) = SessionSink::new(
            id,
            context.router().config.outgoing_queue_limit,
            context.router().observers.clone(),
        );
        let (closed_tx, _) = broadcast::channel(1);
        (
            Self {
                id,
                connection_type,
                serializer,
                sink,
                state: RwLock::new(SessionState::default()),
                closed_tx,
            },
            outgoing,
        )
    }

    /// The session ID.
    pub fn id(&self) -> Id {
        self.id
    }

    /// The type of connection the peer is communicating over.
    pub fn connection_type(&self) -> &ConnectionType {
        &self.connection_type
    }

    /// The serializer negotiated by the transport.
    pub fn serializer(&self) -> SerializerType {
        self.serializer
    }

    /// The outgoing message queue.
    pub fn sink(&self) -> &SessionSink {
        &self.sink
    }

    /// The realm the session joined, if any.
    pub async fn realm(&self) -> Option<Arc<Realm>> {
        match &*self.state.read().await {
            SessionState::Established(state) | SessionState::Closing(state) => {
                Some(state.realm.clone())
            }
            _ => None,
        }
    }

    /// The identity the session was authenticated with, if any.
    pub async fn identity(&self) -> Option<Identity> {
        match &*self.state.read().await {
            SessionState::Established(state) | SessionState::Closing(state) => {
                Some(state.identity.clone())
            }
            _ => None,
        }
    }

    /// Checks if the session is established in a realm.
    pub async fn established(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Established(_))
    }

    /// Checks if the session is closed.
    pub async fn closed(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Closed)
    }

    /// Receiver channel populated when the session moves to the closed state.
    pub fn closed_rx(&self) -> broadcast::Receiver<()> {
        self.closed_tx.subscribe()
    }

    /// Handles a message over the session state machine.
    ///
    /// Errors that end the session are returned after the peer is sent ABORT and the session is
    /// torn down. All other failures are reported to the peer as ERROR.
    pub(crate) async fn handle_message(
        self: Arc<Self>,
        context: &RouterContext,
        message: Message,
    ) -> Result<()> {
        for observer in context.router().observers.iter() {
            observer.on_ingress(self.id, &message);
        }
        let state = self.state.read().await.clone();
        let result = match state {
            SessionState::PreHello => Self::handle_pre_hello(&self, context, message).await,
            SessionState::Established(state) => {
                self.handle_established(context, &state, message).await
            }
            SessionState::Closing(_) => self.handle_closing(context, message).await,
            SessionState::Closed => {
                debug!(
                    "Dropping {} message received on closed session {}",
                    message.message_name(),
                    self.id
                );
                return Ok(());
            }
        };
        if let Err(err) = result {
            warn!("Aborting session {}: {err:#}", self.id);
            self.sink.send(abort_message_for_error(&err)).await;
            self.clean_up(context).await;
            return Err(err);
        }
        Ok(())
    }

    async fn handle_pre_hello(
        session: &Arc<Self>,
        context: &RouterContext,
        message: Message,
    ) -> Result<()> {
        match message {
            Message::Hello(message) => Self::handle_hello(session, context, message).await,
            Message::Abort(_) => {
                debug!("Session {} aborted by peer before joining", session.id);
                session.clean_up(context).await;
                Ok(())
            }
            _ => Err(InteractionError::ProtocolViolation(format!(
                "received {} message before HELLO",
                message.message_name()
            ))
            .into()),
        }
    }

    async fn handle_hello(
        session: &Arc<Self>,
        context: &RouterContext,
        message: HelloMessage,
    ) -> Result<()> {
        let roles = parse_peer_roles(&message.details)?;
        let router = context.router();
        if !router.config.auto_create_realms
            && router.realm_manager.get(&message.realm).await.is_none()
        {
            return Err(InteractionError::NoSuchRealm.into());
        }
        let identity = router
            .authenticator
            .authenticate(&message.realm, &message.details)
            .await
            .map_err(authentication_error)?;

        let realm = loop {
            let realm = router
                .realm_manager
                .get_or_create(&message.realm, router.config.auto_create_realms)
                .await?;
            let mut tables = realm.tables.lock().await;
            if tables.retired {
                continue;
            }
            let mut state = session.state.write().await;
            if !matches!(*state, SessionState::PreHello) {
                return Err(BasicError::NotAllowed(format!(
                    "session {} closed while joining",
                    session.id
                ))
                .into());
            }
            tables.sessions.insert(
                session.id,
                RealmSession {
                    session: session.clone(),
                    identity: identity.clone(),
                    roles: roles.clone(),
                    closing: false,
                },
            );
            *state = SessionState::Established(EstablishedSessionState {
                realm: realm.clone(),
                identity: identity.clone(),
            });
            drop(state);
            drop(tables);
            break realm;
        };
        info!(
            "Session {} joined realm {} as {}",
            session.id,
            realm.uri(),
            identity.id
        );

        let mut details = Dictionary::default();
        details.insert("agent".to_owned(), Value::String(router.config.agent.clone()));
        details.insert(
            "roles".to_owned(),
            Value::Dictionary(router_roles_dictionary(
                &router.config.roles,
                &router.config.pub_sub_features,
                &router.config.rpc_features,
            )),
        );
        details.insert("authid".to_owned(), Value::String(identity.id.clone()));
        details.insert("authrole".to_owned(), Value::String(identity.role.clone()));
        details.insert(
            "authmethod".to_owned(),
            Value::String(identity.method.clone()),
        );

        session
            .sink
            .send(Message::Welcome(WelcomeMessage {
                session: session.id,
                details,
            }))
            .await;
        Ok(())
    }

    async fn handle_established(
        &self,
        context: &RouterContext,
        state: &EstablishedSessionState,
        message: Message,
    ) -> Result<()> {
        let result = match &message {
            Message::Hello(_) => {
                return Err(InteractionError::ProtocolViolation(
                    "received HELLO message on an established session".to_owned(),
                )
                .into());
            }
            message if message.is_router_only() => {
                return Err(InteractionError::ProtocolViolation(format!(
                    "received {} message, which only a router may send",
                    message.message_name()
                ))
                .into());
            }
            Message::Abort(abort) => {
                info!("Session {} aborted by peer: {}", self.id, abort.reason);
                self.clean_up(context).await;
                return Ok(());
            }
            Message::Goodbye(goodbye) => {
                info!("Session {} said goodbye: {}", self.id, goodbye.reason);
                self.tear_down(context, Some(goodbye_and_out())).await;
                return Ok(());
            }
            Message::Subscribe(message) => self.handle_subscribe(context, state, message).await,
            Message::Unsubscribe(message) => self.handle_unsubscribe(state, message).await,
            Message::Publish(message) => {
                let result = self.handle_publish(context, state, message).await;
                if result.as_ref().is_err_and(|err| !is_protocol_violation(err))
                    && !matches!(message.options.get("acknowledge"), Some(Value::Bool(true)))
                {
                    debug!(
                        "Unacknowledged publication from session {} to {} failed",
                        self.id, message.topic
                    );
                    return Ok(());
                }
                result
            }
            Message::Register(message) => self.handle_register(context, state, message).await,
            Message::Unregister(message) => self.handle_unregister(state, message).await,
            Message::Call(message) => self.handle_call(context, state, message).await,
            Message::Cancel(message) => self.handle_cancel(state, message).await,
            Message::Yield(message) => self.handle_yield(state, message).await,
            Message::Error(message) => self.handle_error(state, message).await,
            // Router-only messages were handled above.
            _ => Ok(()),
        };
        match result {
            Err(err) if is_protocol_violation(&err) => Err(err),
            Err(err) => {
                debug!(
                    "Failed to handle {} message from session {}: {err:#}",
                    message.message_name(),
                    self.id
                );
                self.sink.send(error_for_request(&message, &err)).await;
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn handle_subscribe(
        &self,
        context: &RouterContext,
        state: &EstablishedSessionState,
        message: &SubscribeMessage,
    ) -> Result<()> {
        let options = SubscribeOptions::try_from(&message.options)?;
        if options.match_style != MatchStyle::Wildcard && message.topic.has_wildcard() {
            return Err(Error::from(InteractionError::InvalidUri)
                .context("empty topic components require wildcard matching"));
        }
        context
            .router()
            .pub_sub_policies
            .validate_subscription(state.session_context(self.id), &message.topic)
            .await?;

        let realm = &state.realm;
        let mut tables = realm.tables.lock().await;
        if !tables.has_session(self.id) {
            return Ok(());
        }
        let subscription =
            tables
                .broker
                .subscribe(&realm.ids, self.id, message.topic.clone(), options.match_style);
        debug!(
            "Session {} subscribed to {} ({:?}) as subscription {subscription}",
            self.id, message.topic, options.match_style
        );
        // Queued under the realm lock, so no EVENT for the subscription can precede it.
        self.sink
            .send(Message::Subscribed(SubscribedMessage {
                subscribe_request: message.request,
                subscription,
            }))
            .await;
        Ok(())
    }

    async fn handle_unsubscribe(
        &self,
        state: &EstablishedSessionState,
        message: &UnsubscribeMessage,
    ) -> Result<()> {
        let mut tables = state.realm.tables.lock().await;
        if !tables.has_session(self.id) {
            return Ok(());
        }
        tables
            .broker
            .unsubscribe(self.id, message.subscribed_subscription)?;
        self.sink
            .send(Message::Unsubscribed(UnsubscribedMessage {
                unsubscribe_request: message.request,
            }))
            .await;
        Ok(())
    }

    async fn handle_publish(
        &self,
        context: &RouterContext,
        state: &EstablishedSessionState,
        message: &PublishMessage,
    ) -> Result<()> {
        let options = PublishOptions::try_from(&message.options)?;
        context
            .router()
            .pub_sub_policies
            .validate_publication(state.session_context(self.id), &message.topic)
            .await?;

        let realm = &state.realm;
        let tables = realm.tables.lock().await;
        if !tables.has_session(self.id) {
            return Ok(());
        }
        let publication = realm.ids.next_id(IdScope::Publication);
        let delivered = tables
            .broker
            .publish(
                &tables.sessions,
                self.id,
                publication,
                &message.topic,
                &options,
                &message.arguments,
                &message.arguments_keyword,
            )
            .await;
        debug!(
            "Publication {publication} to {} from session {} delivered {delivered} events",
            message.topic, self.id
        );
        if options.acknowledge {
            self.sink
                .send(Message::Published(PublishedMessage {
                    publish_request: message.request,
                    publication,
                }))
                .await;
        }
        Ok(())
    }

    async fn handle_register(
        &self,
        context: &RouterContext,
        state: &EstablishedSessionState,
        message: &RegisterMessage,
    ) -> Result<()> {
        let options = RegisterOptions::try_from(&message.options)?;
        context
            .router()
            .rpc_policies
            .validate_registration(state.session_context(self.id), &message.procedure)
            .await?;

        let realm = &state.realm;
        let mut tables = realm.tables.lock().await;
        if !tables.has_session(self.id) {
            return Ok(());
        }
        let registration = tables.dealer.register(
            &realm.ids,
            self.id,
            message.procedure.clone(),
            options.invocation_policy,
        )?;
        debug!(
            "Session {} registered {} as registration {registration}",
            self.id, message.procedure
        );
        // Queued under the realm lock, so no INVOCATION for the registration can precede it.
        self.sink
            .send(Message::Registered(RegisteredMessage {
                register_request: message.request,
                registration,
            }))
            .await;
        Ok(())
    }

    async fn handle_unregister(
        &self,
        state: &EstablishedSessionState,
        message: &UnregisterMessage,
    ) -> Result<()> {
        let mut tables = state.realm.tables.lock().await;
        if !tables.has_session(self.id) {
            return Ok(());
        }
        tables
            .dealer
            .unregister(self.id, message.registered_registration)?;
        self.sink
            .send(Message::Unregistered(UnregisteredMessage {
                unregister_request: message.request,
            }))
            .await;
        Ok(())
    }

    async fn handle_call(
        &self,
        context: &RouterContext,
        state: &EstablishedSessionState,
        message: &CallMessage,
    ) -> Result<()> {
        let options = CallOptions::try_from(&message.options)?;
        let realm = &state.realm;
        if !realm.tables.lock().await.dealer.has_procedure(&message.procedure) {
            return Err(InteractionError::NoSuchProcedure.into());
        }
        context
            .router()
            .rpc_policies
            .validate_call(state.session_context(self.id), &message.procedure)
            .await?;

        let mut guard = realm.tables.lock().await;
        if !guard.has_session(self.id) {
            return Ok(());
        }
        let tables = &mut *guard;
        let invocation =
            tables
                .dealer
                .route_call(&realm.ids, self.id, message.request, &message.procedure)?;
        let callee = match tables.sessions.get(&invocation.callee) {
            Some(callee) if !callee.closing => callee,
            _ => {
                tables.dealer.complete(invocation.callee, invocation.id);
                return Err(InteractionError::CalleeUnavailable.into());
            }
        };
        let mut details = Dictionary::default();
        if options.disclose_me {
            details.insert("caller".to_owned(), Value::Integer(self.id.value()));
        }
        debug!(
            "Call {} from session {} to {} routed to session {} as invocation {}",
            message.request, self.id, message.procedure, invocation.callee, invocation.id
        );
        callee
            .session
            .sink()
            .send(Message::Invocation(InvocationMessage {
                request: invocation.id,
                registered_registration: invocation.registration,
                details,
                call_arguments: message.arguments.clone(),
                call_arguments_keyword: message.arguments_keyword.clone(),
            }))
            .await;
        Ok(())
    }

    async fn handle_cancel(
        &self,
        state: &EstablishedSessionState,
        message: &CancelMessage,
    ) -> Result<()> {
        let options = CancelOptions::try_from(&message.options)?;
        let mut guard = state.realm.tables.lock().await;
        let tables = &mut *guard;
        let cancellation = match tables
            .dealer
            .cancel(self.id, message.call_request, options.mode)
        {
            Some(cancellation) => cancellation,
            None => {
                debug!(
                    "Ignoring cancel from session {} for call {} that is not in flight",
                    self.id, message.call_request
                );
                return Ok(());
            }
        };
        if cancellation.interrupt_callee {
            if let Some(callee) = tables.sessions.get(&cancellation.invocation.callee) {
                callee
                    .session
                    .sink()
                    .send(Message::Interrupt(InterruptMessage {
                        invocation_request: cancellation.invocation.id,
                        options: Dictionary::from_iter([(
                            "mode".to_owned(),
                            Value::String(options.mode.to_string()),
                        )]),
                    }))
                    .await;
            }
        }
        if cancellation.error_caller {
            self.sink
                .send(error_for_request_type(
                    Message::CALL_CODE,
                    message.call_request,
                    &Error::from(InteractionError::Canceled),
                ))
                .await;
        }
        Ok(())
    }

    async fn handle_yield(
        &self,
        state: &EstablishedSessionState,
        message: &YieldMessage,
    ) -> Result<()> {
        let mut guard = state.realm.tables.lock().await;
        let tables = &mut *guard;
        let invocation = match tables
            .dealer
            .complete(self.id, message.invocation_request)
        {
            Some(invocation) => invocation,
            None => {
                warn!(
                    "Discarding YIELD from session {} for unknown invocation {}",
                    self.id, message.invocation_request
                );
                return Ok(());
            }
        };
        if let Some(caller) = tables.sessions.get(&invocation.caller) {
            caller
                .session
                .sink()
                .send(Message::Result(ResultMessage {
                    call_request: invocation.caller_request,
                    details: Dictionary::default(),
                    yield_arguments: message.arguments.clone(),
                    yield_arguments_keyword: message.arguments_keyword.clone(),
                }))
                .await;
        }
        Ok(())
    }

    async fn handle_error(
        &self,
        state: &EstablishedSessionState,
        message: &ErrorMessage,
    ) -> Result<()> {
        if message.request_type != Message::INVOCATION_CODE {
            return Err(InteractionError::ProtocolViolation(format!(
                "received ERROR message for request type {}",
                message.request_type
            ))
            .into());
        }
        let mut guard = state.realm.tables.lock().await;
        let tables = &mut *guard;
        let invocation = match tables.dealer.complete(self.id, message.request) {
            Some(invocation) => invocation,
            None => {
                warn!(
                    "Discarding ERROR from session {} for unknown invocation {}",
                    self.id, message.request
                );
                return Ok(());
            }
        };
        if let Some(caller) = tables.sessions.get(&invocation.caller) {
            caller
                .session
                .sink()
                .send(forwarded_error(
                    Message::CALL_CODE,
                    invocation.caller_request,
                    message.details.clone(),
                    message.error.clone(),
                    message.arguments.clone(),
                    message.arguments_keyword.clone(),
                ))
                .await;
        }
        Ok(())
    }

    async fn handle_closing(&self, context: &RouterContext, message: Message) -> Result<()> {
        match message {
            Message::Goodbye(_) | Message::Abort(_) => {
                self.clean_up(context).await;
            }
            _ => debug!(
                "Ignoring {} message on closing session {}",
                message.message_name(),
                self.id
            ),
        }
        Ok(())
    }

    /// Sends GOODBYE to the peer and waits for its GOODBYE before tearing down.
    ///
    /// Nothing is routed to the session after the GOODBYE.
    pub(crate) async fn close(&self, close_reason: CloseReason) -> Result<()> {
        let realm = match &*self.state.read().await {
            SessionState::Established(state) => state.realm.clone(),
            _ => return Err(self.not_established()),
        };
        // Realm lock before session state, as in HELLO.
        let mut tables = realm.tables.lock().await;
        let mut state = self.state.write().await;
        let established = match &*state {
            SessionState::Established(established) => established.clone(),
            _ => return Err(self.not_established()),
        };
        *state = SessionState::Closing(established);
        drop(state);
        debug!("Router session {} transitioned to Closing", self.id);
        if let Some(session) = tables.sessions.get_mut(&self.id) {
            session.closing = true;
        }
        self.sink
            .send(goodbye_with_close_reason(close_reason))
            .await;
        Ok(())
    }

    fn not_established(&self) -> Error {
        BasicError::NotAllowed(format!("session {} is not established", self.id)).into()
    }

    /// Sends GOODBYE to an established peer and tears the session down without waiting.
    pub(crate) async fn shut_down(&self, context: &RouterContext, close_reason: CloseReason) {
        self.tear_down(context, Some(goodbye_with_close_reason(close_reason)))
            .await;
    }

    /// Moves the session to the closed state and releases everything it owns.
    ///
    /// Safe to call any number of times.
    pub(crate) async fn clean_up(&self, context: &RouterContext) {
        self.tear_down(context, None).await;
    }

    /// Tears the session down.
    ///
    /// `goodbye` is queued for an established peer once the session is out of its realm, so no
    /// routed message can follow it.
    async fn tear_down(&self, context: &RouterContext, goodbye: Option<Message>) {
        let previous = std::mem::replace(&mut *self.state.write().await, SessionState::Closed);
        let (state, goodbye) = match previous {
            SessionState::Closed => return,
            SessionState::PreHello => (None, None),
            SessionState::Established(state) => (Some(state), goodbye),
            SessionState::Closing(state) => (Some(state), None),
        };
        debug!("Router session {} transitioned to Closed", self.id);

        if let Some(state) = state {
            self.leave_realm(context, &state.realm, goodbye).await;
        }
        context.router().sessions.write().await.remove(&self.id);
        self.sink.close().await;
        self.closed_tx.send(()).ok();
    }

    async fn leave_realm(
        &self,
        context: &RouterContext,
        realm: &Arc<Realm>,
        goodbye: Option<Message>,
    ) {
        let empty = {
            let mut guard = realm.tables.lock().await;
            let tables = &mut *guard;
            tables.sessions.shift_remove(&self.id);
            let subscriptions = tables.broker.remove_session(self.id);
            let orphaned = tables.dealer.remove_session(self.id);
            if let Some(goodbye) = goodbye {
                self.sink.send(goodbye).await;
            }
            for invocation in &orphaned {
                if let Some(caller) = tables.sessions.get(&invocation.caller) {
                    caller
                        .session
                        .sink()
                        .send(error_for_request_type(
                            Message::CALL_CODE,
                            invocation.caller_request,
                            &Error::from(InteractionError::CalleeUnavailable),
                        ))
                        .await;
                }
            }
            info!(
                "Session {} left realm {} ({subscriptions} subscriptions released, {} calls failed)",
                self.id,
                realm.uri(),
                orphaned.len()
            );
            tables.sessions.is_empty()
        };

        if empty && !realm.persistent() && context.router().config.collect_empty_realms {
            context
                .router()
                .realm_manager
                .remove_if_empty(realm.uri())
                .await;
        }
    }
}

/// Authenticator failures without a WAMP error of their own are reported as failed authorization.
fn authentication_error(error: Error) -> Error {
    if error.downcast_ref::<InteractionError>().is_some()
        || error.downcast_ref::<BasicError>().is_some()
    {
        return error;
    }
    InteractionError::AuthorizationFailed(format!("{error:#}")).into()
}
