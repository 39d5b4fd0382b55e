use std::fmt::Display;

use anyhow::{
    Error,
    Result,
};
use async_trait::async_trait;
use log::debug;

use crate::{
    core::{
        error::InteractionError,
        hash::{
            HashMap,
            HashSet,
        },
        id::Id,
        uri::{
            Uri,
            WildcardUri,
        },
    },
    router::app::{
        SessionContext,
        pub_sub::PubSubPolicies,
        rpc::RpcPolicies,
    },
};

/// An action that can be permitted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionAction {
    Subscribe,
    Publish,
    Register,
    Call,
}

impl From<PermissionAction> for &'static str {
    fn from(value: PermissionAction) -> Self {
        match value {
            PermissionAction::Subscribe => "subscribe",
            PermissionAction::Publish => "publish",
            PermissionAction::Register => "register",
            PermissionAction::Call => "call",
        }
    }
}

impl Display for PermissionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

/// Who a permission entry applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    Session(Id),
    AuthId(String),
    AuthRole(String),
}

#[derive(Debug, Clone)]
struct ActionPermissions {
    allow: HashSet<Principal>,
    deny: HashSet<Principal>,
    default_allow: bool,
}

impl Default for ActionPermissions {
    fn default() -> Self {
        Self {
            allow: HashSet::default(),
            deny: HashSet::default(),
            default_allow: true,
        }
    }
}

impl ActionPermissions {
    fn permits(&self, principals: &[Principal]) -> bool {
        if principals
            .iter()
            .any(|principal| self.allow.contains(principal))
        {
            return true;
        }
        if principals
            .iter()
            .any(|principal| self.deny.contains(principal))
        {
            return false;
        }
        self.default_allow
    }
}

/// Allow and deny lists per action, keyed by session ID, authentication ID or authentication role.
///
/// An allow entry matching any of the session's principals wins over a deny entry. Sessions
/// matching neither list get the action's default, which starts out as allowed.
#[derive(Debug, Clone, Default)]
pub struct PermissionPolicies {
    actions: HashMap<PermissionAction, ActionPermissions>,
}

impl PermissionPolicies {
    /// Allows the action for the principal.
    pub fn allow(&mut self, action: PermissionAction, principal: Principal) -> &mut Self {
        self.actions
            .entry(action)
            .or_default()
            .allow
            .insert(principal);
        self
    }

    /// Denies the action for the principal.
    pub fn deny(&mut self, action: PermissionAction, principal: Principal) -> &mut Self {
        self.actions
            .entry(action)
            .or_default()
            .deny
            .insert(principal);
        self
    }

    /// Sets whether the action is allowed for sessions not on either list.
    pub fn set_default(&mut self, action: PermissionAction, allow: bool) -> &mut Self {
        self.actions.entry(action).or_default().default_allow = allow;
        self
    }

    /// Checks if the session may perform the action.
    pub fn authorize(&self, action: PermissionAction, context: SessionContext<'_>) -> Result<()> {
        let permissions = match self.actions.get(&action) {
            Some(permissions) => permissions,
            None => return Ok(()),
        };
        let principals = [
            Principal::Session(context.session),
            Principal::AuthId(context.identity.id.clone()),
            Principal::AuthRole(context.identity.role.clone()),
        ];
        if permissions.permits(&principals) {
            return Ok(());
        }
        debug!(
            "Session {} in realm {} is not authorized to {action}",
            context.session, context.realm
        );
        Err(Error::from(InteractionError::NotAuthorized)
            .context(format!("session is not authorized to {action}")))
    }
}

#[async_trait]
impl PubSubPolicies for PermissionPolicies {
    async fn validate_subscription(
        &self,
        context: SessionContext<'_>,
        _: &WildcardUri,
    ) -> Result<()> {
        self.authorize(PermissionAction::Subscribe, context)
    }

    async fn validate_publication(&self, context: SessionContext<'_>, _: &Uri) -> Result<()> {
        self.authorize(PermissionAction::Publish, context)
    }
}

#[async_trait]
impl RpcPolicies for PermissionPolicies {
    async fn validate_registration(&self, context: SessionContext<'_>, _: &Uri) -> Result<()> {
        self.authorize(PermissionAction::Register, context)
    }

    async fn validate_call(&self, context: SessionContext<'_>, _: &Uri) -> Result<()> {
        self.authorize(PermissionAction::Call, context)
    }
}

#[cfg(test)]
mod permissions_test {
    use crate::{
        auth::Identity,
        core::{
            error::error_uri,
            id::Id,
            uri::Uri,
        },
        router::app::{
            SessionContext,
            permissions::{
                PermissionAction,
                PermissionPolicies,
                Principal,
            },
        },
    };

    fn identity(id: &str, role: &str) -> Identity {
        Identity {
            id: id.to_owned(),
            role: role.to_owned(),
            method: "anonymous".to_owned(),
        }
    }

    #[test]
    fn allows_everything_by_default() {
        let realm = Uri::try_from("com.battler").unwrap();
        let identity = identity("alice", "user");
        let context = SessionContext {
            realm: &realm,
            session: Id::MIN,
            identity: &identity,
        };
        let policies = PermissionPolicies::default();
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Call, context), Ok(()));
    }

    #[test]
    fn denies_listed_principals() {
        let realm = Uri::try_from("com.battler").unwrap();
        let alice = identity("alice", "user");
        let bob = identity("bob", "user");
        let mut policies = PermissionPolicies::default();
        policies.deny(PermissionAction::Publish, Principal::AuthId("alice".to_owned()));

        let context = SessionContext {
            realm: &realm,
            session: Id::MIN,
            identity: &alice,
        };
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Publish, context), Err(err) => {
            assert_eq!(error_uri(&err).as_ref(), "wamp.error.not_authorized");
        });
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Subscribe, context), Ok(()));

        let context = SessionContext {
            realm: &realm,
            session: Id::MIN,
            identity: &bob,
        };
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Publish, context), Ok(()));
    }

    #[test]
    fn allow_list_overrides_deny_by_default() {
        let realm = Uri::try_from("com.battler").unwrap();
        let admin = identity("carol", "admin");
        let user = identity("dave", "user");
        let mut policies = PermissionPolicies::default();
        policies
            .set_default(PermissionAction::Register, false)
            .allow(PermissionAction::Register, Principal::AuthRole("admin".to_owned()))
            .deny(PermissionAction::Register, Principal::AuthId("carol".to_owned()));

        let context = SessionContext {
            realm: &realm,
            session: Id::MIN,
            identity: &admin,
        };
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Register, context), Ok(()));

        let context = SessionContext {
            realm: &realm,
            session: Id::try_from(2).unwrap(),
            identity: &user,
        };
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Register, context), Err(_));
    }

    #[test]
    fn matches_session_ids() {
        let realm = Uri::try_from("com.battler").unwrap();
        let user = identity("anonymous", "anonymous");
        let mut policies = PermissionPolicies::default();
        policies.deny(PermissionAction::Call, Principal::Session(Id::try_from(7).unwrap()));
        let context = SessionContext {
            realm: &realm,
            session: Id::try_from(7).unwrap(),
            identity: &user,
        };
        assert_matches::assert_matches!(policies.authorize(PermissionAction::Call, context), Err(_));
    }
}
