use std::fmt::Display;

use anyhow::Error;

use crate::core::{
    error::InteractionError,
    types::{
        Dictionary,
        Value,
    },
};

/// A role a peer can announce in HELLO.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    /// Calls procedures.
    Caller,
    /// Registers procedures.
    Callee,
    /// Publishes events to topics.
    Publisher,
    /// Subscribes to topics.
    Subscriber,
}

impl TryFrom<&str> for PeerRole {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "caller" => Ok(Self::Caller),
            "callee" => Ok(Self::Callee),
            "publisher" => Ok(Self::Publisher),
            "subscriber" => Ok(Self::Subscriber),
            _ => Err(Error::msg(format!("invalid peer role: {value}"))),
        }
    }
}

impl From<PeerRole> for &'static str {
    fn from(value: PeerRole) -> Self {
        match value {
            PeerRole::Caller => "caller",
            PeerRole::Callee => "callee",
            PeerRole::Publisher => "publisher",
            PeerRole::Subscriber => "subscriber",
        }
    }
}

impl Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

/// A role the router plays in a realm.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterRole {
    /// Routes calls to callees.
    Dealer,
    /// Routes events to subscribers.
    Broker,
}

impl TryFrom<&str> for RouterRole {
    type Error = Error;
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "dealer" => Ok(Self::Dealer),
            "broker" => Ok(Self::Broker),
            _ => Err(Error::msg(format!("invalid router role: {value}"))),
        }
    }
}

impl From<RouterRole> for &'static str {
    fn from(value: RouterRole) -> Self {
        match value {
            RouterRole::Dealer => "dealer",
            RouterRole::Broker => "broker",
        }
    }
}

impl Display for RouterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).into())
    }
}

/// Parses the `roles` entry of HELLO details.
///
/// A missing entry yields no roles. Unknown role names are rejected with
/// [`InteractionError::NoSuchRole`], and malformed entries are protocol violations.
pub fn parse_peer_roles(details: &Dictionary) -> Result<Vec<PeerRole>, Error> {
    let roles = match details.get("roles") {
        None => return Ok(Vec::new()),
        Some(Value::Dictionary(roles)) => roles,
        Some(_) => {
            return Err(
                InteractionError::ProtocolViolation("roles must be a dictionary".to_owned()).into(),
            );
        }
    };
    let mut parsed = roles
        .iter()
        .map(|(role, features)| match features {
            Value::Dictionary(_) => PeerRole::try_from(role.as_str())
                .map_err(|err| Error::from(InteractionError::NoSuchRole).context(err)),
            _ => Err(InteractionError::ProtocolViolation(format!(
                "features for {role} must be a dictionary"
            ))
            .into()),
        })
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_by_key(|role| Into::<&'static str>::into(*role));
    Ok(parsed)
}

#[cfg(test)]
mod roles_test {
    use crate::core::{
        error::InteractionError,
        roles::{
            PeerRole,
            parse_peer_roles,
        },
        types::{
            Dictionary,
            Value,
        },
    };

    fn details_with_roles(roles: &[&str]) -> Dictionary {
        let roles = roles
            .iter()
            .map(|role| ((*role).to_owned(), Value::Dictionary(Dictionary::default())))
            .collect::<Dictionary>();
        Dictionary::from_iter([("roles".to_owned(), Value::Dictionary(roles))])
    }

    #[test]
    fn parses_known_roles() {
        assert_matches::assert_matches!(
            parse_peer_roles(&details_with_roles(&["subscriber", "caller"])),
            Ok(roles) => {
                pretty_assertions::assert_eq!(roles, vec![PeerRole::Caller, PeerRole::Subscriber]);
            }
        );
    }

    #[test]
    fn missing_roles_are_empty() {
        assert_matches::assert_matches!(parse_peer_roles(&Dictionary::default()), Ok(roles) => {
            assert!(roles.is_empty());
        });
    }

    #[test]
    fn rejects_unknown_roles() {
        assert_matches::assert_matches!(
            parse_peer_roles(&details_with_roles(&["caller", "dealer"])),
            Err(err) => {
                assert_eq!(err.to_string(), "invalid peer role: dealer");
                assert_matches::assert_matches!(
                    err.downcast_ref::<InteractionError>(),
                    Some(InteractionError::NoSuchRole)
                );
            }
        );
    }

    #[test]
    fn rejects_non_dictionary_roles() {
        let details = Dictionary::from_iter([("roles".to_owned(), Value::from("caller"))]);
        assert_matches::assert_matches!(parse_peer_roles(&details), Err(err) => {
            assert_matches::assert_matches!(
                err.downcast_ref::<InteractionError>(),
                Some(InteractionError::ProtocolViolation(_))
            );
        });
    }
}
