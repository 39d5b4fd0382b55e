use crate::core::{
    roles::RouterRole,
    types::{
        Dictionary,
        Value,
    },
};

/// Advanced features announced by the broker role.
#[derive(Debug, Clone)]
pub struct PubSubFeatures {
    /// Subscriptions may use prefix and wildcard matching.
    pub pattern_based_subscription: bool,
    /// Publishers may narrow the set of receivers.
    pub subscriber_blackwhite_listing: bool,
    /// Publishers may receive their own events.
    pub publisher_exclusion: bool,
    /// Publishers may disclose their identity to subscribers.
    pub publisher_identification: bool,
}

impl Default for PubSubFeatures {
    fn default() -> Self {
        Self {
            pattern_based_subscription: true,
            subscriber_blackwhite_listing: true,
            publisher_exclusion: true,
            publisher_identification: true,
        }
    }
}

impl PubSubFeatures {
    fn to_dictionary(&self) -> Dictionary {
        Dictionary::from_iter([
            (
                "pattern_based_subscription".to_owned(),
                Value::Bool(self.pattern_based_subscription),
            ),
            (
                "subscriber_blackwhite_listing".to_owned(),
                Value::Bool(self.subscriber_blackwhite_listing),
            ),
            (
                "publisher_exclusion".to_owned(),
                Value::Bool(self.publisher_exclusion),
            ),
            (
                "publisher_identification".to_owned(),
                Value::Bool(self.publisher_identification),
            ),
        ])
    }
}

/// Advanced features announced by the dealer role.
#[derive(Debug, Clone)]
pub struct RpcFeatures {
    /// A caller may cancel a call in flight.
    pub call_canceling: bool,
    /// Callers may disclose their identity to callees.
    pub caller_identification: bool,
    /// Multiple callees may share one registration.
    pub shared_registration: bool,
}

impl Default for RpcFeatures {
    fn default() -> Self {
        Self {
            call_canceling: true,
            caller_identification: true,
            shared_registration: true,
        }
    }
}

impl RpcFeatures {
    fn to_dictionary(&self) -> Dictionary {
        Dictionary::from_iter([
            ("call_canceling".to_owned(), Value::Bool(self.call_canceling)),
            (
                "caller_identification".to_owned(),
                Value::Bool(self.caller_identification),
            ),
            (
                "shared_registration".to_owned(),
                Value::Bool(self.shared_registration),
            ),
        ])
    }
}

/// Builds the `roles` dictionary announced in WELCOME.
pub fn router_roles_dictionary(
    roles: &[RouterRole],
    pub_sub: &PubSubFeatures,
    rpc: &RpcFeatures,
) -> Dictionary {
    roles
        .iter()
        .map(|role| {
            let features = match role {
                RouterRole::Broker => pub_sub.to_dictionary(),
                RouterRole::Dealer => rpc.to_dictionary(),
            };
            (
                role.to_string(),
                Value::Dictionary(Dictionary::from_iter([(
                    "features".to_owned(),
                    Value::Dictionary(features),
                )])),
            )
        })
        .collect()
}
