use anyhow::Error;

use crate::core::{
    cancel::CallCancelMode,
    error::BasicError,
    hash::HashSet,
    id::Id,
    invocation_policy::InvocationPolicy,
    match_style::MatchStyle,
    types::{
        Dictionary,
        Value,
    },
};

fn invalid_option(name: &str, expected: &str) -> Error {
    BasicError::InvalidArgument(format!("{name} must be {expected}")).into()
}

fn bool_option(options: &Dictionary, name: &str) -> Result<Option<bool>, Error> {
    match options.get(name) {
        None => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(_) => Err(invalid_option(name, "a boolean")),
    }
}

fn string_option<'a>(options: &'a Dictionary, name: &str) -> Result<Option<&'a str>, Error> {
    match options.get(name) {
        None => Ok(None),
        Some(Value::String(value)) => Ok(Some(value)),
        Some(_) => Err(invalid_option(name, "a string")),
    }
}

fn id_set_option(options: &Dictionary, name: &str) -> Result<Option<HashSet<Id>>, Error> {
    let list = match options.get(name) {
        None => return Ok(None),
        Some(Value::List(list)) => list,
        Some(_) => return Err(invalid_option(name, "a list of session ids")),
    };
    list.iter()
        .map(|value| {
            value
                .integer()
                .and_then(|value| Id::try_from(value).ok())
                .ok_or_else(|| invalid_option(name, "a list of session ids"))
        })
        .collect::<Result<HashSet<_>, _>>()
        .map(Some)
}

fn string_set_option(options: &Dictionary, name: &str) -> Result<Option<HashSet<String>>, Error> {
    let list = match options.get(name) {
        None => return Ok(None),
        Some(Value::List(list)) => list,
        Some(_) => return Err(invalid_option(name, "a list of strings")),
    };
    list.iter()
        .map(|value| {
            value
                .string()
                .map(|value| value.to_owned())
                .ok_or_else(|| invalid_option(name, "a list of strings"))
        })
        .collect::<Result<HashSet<_>, _>>()
        .map(Some)
}

/// Options for subscribing to a topic.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// How the subscription topic is matched against published topics.
    pub match_style: MatchStyle,
}

impl TryFrom<&Dictionary> for SubscribeOptions {
    type Error = Error;
    fn try_from(value: &Dictionary) -> Result<Self, Self::Error> {
        let match_style = match string_option(value, "match")? {
            Some(match_style) => MatchStyle::try_from(match_style)
                .map_err(|err| BasicError::InvalidArgument(err.to_string()))?,
            None => MatchStyle::default(),
        };
        Ok(Self { match_style })
    }
}

/// Options for publishing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Should the publisher receive PUBLISHED (or ERROR)?
    pub acknowledge: bool,
    /// Should the publisher be excluded from receiving the event?
    pub exclude_me: bool,
    /// Should the publisher's session ID be disclosed to subscribers?
    pub disclose_me: bool,
    /// Blocked session IDs.
    pub exclude: Option<HashSet<Id>>,
    /// Blocked authenticated IDs.
    pub exclude_authid: Option<HashSet<String>>,
    /// Blocked authenticated roles.
    pub exclude_authrole: Option<HashSet<String>>,
    /// Allowed session IDs.
    pub eligible: Option<HashSet<Id>>,
    /// Allowed authenticated IDs.
    pub eligible_authid: Option<HashSet<String>>,
    /// Allowed authenticated roles.
    pub eligible_authrole: Option<HashSet<String>>,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            acknowledge: false,
            exclude_me: true,
            disclose_me: false,
            exclude: None,
            exclude_authid: None,
            exclude_authrole: None,
            eligible: None,
            eligible_authid: None,
            eligible_authrole: None,
        }
    }
}

impl PublishOptions {
    /// Checks if a subscriber may receive the event.
    pub fn allows(&self, session: Id, authid: &str, authrole: &str) -> bool {
        if self
            .exclude
            .as_ref()
            .is_some_and(|exclude| exclude.contains(&session))
            || self
                .exclude_authid
                .as_ref()
                .is_some_and(|exclude| exclude.contains(authid))
            || self
                .exclude_authrole
                .as_ref()
                .is_some_and(|exclude| exclude.contains(authrole))
        {
            return false;
        }
        self.eligible
            .as_ref()
            .is_none_or(|eligible| eligible.contains(&session))
            && self
                .eligible_authid
                .as_ref()
                .is_none_or(|eligible| eligible.contains(authid))
            && self
                .eligible_authrole
                .as_ref()
                .is_none_or(|eligible| eligible.contains(authrole))
    }
}

impl TryFrom<&Dictionary> for PublishOptions {
    type Error = Error;
    fn try_from(value: &Dictionary) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        Ok(Self {
            acknowledge: bool_option(value, "acknowledge")?.unwrap_or(defaults.acknowledge),
            exclude_me: bool_option(value, "exclude_me")?.unwrap_or(defaults.exclude_me),
            disclose_me: bool_option(value, "disclose_me")?.unwrap_or(defaults.disclose_me),
            exclude: id_set_option(value, "exclude")?,
            exclude_authid: string_set_option(value, "exclude_authid")?,
            exclude_authrole: string_set_option(value, "exclude_authrole")?,
            eligible: id_set_option(value, "eligible")?,
            eligible_authid: string_set_option(value, "eligible_authid")?,
            eligible_authrole: string_set_option(value, "eligible_authrole")?,
        })
    }
}

/// Options for registering a procedure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RegisterOptions {
    /// How callees are selected when the registration is shared.
    pub invocation_policy: InvocationPolicy,
}

impl TryFrom<&Dictionary> for RegisterOptions {
    type Error = Error;
    fn try_from(value: &Dictionary) -> Result<Self, Self::Error> {
        let invocation_policy = match string_option(value, "invoke")? {
            Some(policy) => InvocationPolicy::try_from(policy)
                .map_err(|err| BasicError::InvalidArgument(err.to_string()))?,
            None => InvocationPolicy::default(),
        };
        Ok(Self { invocation_policy })
    }
}

/// Options for calling a procedure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Should the caller's session ID be disclosed to the callee?
    pub disclose_me: bool,
}

impl TryFrom<&Dictionary> for CallOptions {
    type Error = Error;
    fn try_from(value: &Dictionary) -> Result<Self, Self::Error> {
        Ok(Self {
            disclose_me: bool_option(value, "disclose_me")?.unwrap_or_default(),
        })
    }
}

/// Options for canceling a call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CancelOptions {
    /// How the call is canceled.
    pub mode: CallCancelMode,
}

impl TryFrom<&Dictionary> for CancelOptions {
    type Error = Error;
    fn try_from(value: &Dictionary) -> Result<Self, Self::Error> {
        let mode = match string_option(value, "mode")? {
            Some(mode) => CallCancelMode::try_from(mode)
                .map_err(|err| BasicError::InvalidArgument(err.to_string()))?,
            None => CallCancelMode::default(),
        };
        Ok(Self { mode })
    }
}
