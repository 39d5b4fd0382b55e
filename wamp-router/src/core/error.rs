use anyhow::Error;
use thiserror::Error;

use crate::{
    core::{
        types::Value,
        uri::Uri,
    },
    message::message::Message,
};

/// A basic error that occurs while processing a WAMP message.
#[derive(Debug, Error)]
pub enum BasicError {
    /// A generic resource was not found.
    ///
    /// WAMP defines standard URIs for not finding specific resource types. This error should only
    /// be used when the standard URI cannot be used.
    #[error("{0}")]
    NotFound(String),
    /// An invalid argument was passed.
    #[error("{0}")]
    InvalidArgument(String),
    /// The operation is not allowed based on router configuration.
    #[error("{0}")]
    NotAllowed(String),
    /// The operation is not allowed based on user permissions.
    #[error("{0}")]
    PermissionDenied(String),
    /// Some internal error occurred.
    #[error("{0}")]
    Internal(String),
}

impl BasicError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotAllowed(_) => "not_allowed",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Internal(_) => "internal",
        }
    }
}

/// An interaction error that occurs while processing a WAMP message.
///
/// Interaction errors are reserved for errors that peers must be able to parse easily, so each one
/// maps to a well-known error URI.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The incoming message violates the WAMP protocol.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The procedure being called does not exist.
    #[error("no such procedure")]
    NoSuchProcedure,
    /// The procedure being registered already exists.
    #[error("procedure already exists")]
    ProcedureAlreadyExists,
    /// The registration being referenced does not exist.
    #[error("no such registration")]
    NoSuchRegistration,
    /// The subscription being referenced does not exist.
    #[error("no such subscription")]
    NoSuchSubscription,
    /// The realm being referenced does not exist.
    #[error("no such realm")]
    NoSuchRealm,
    /// The role being referenced does not exist.
    #[error("no such role")]
    NoSuchRole,
    /// The call was canceled.
    #[error("canceled")]
    Canceled,
    /// The session is not authorized to perform the action.
    #[error("not authorized")]
    NotAuthorized,
    /// The session could not be authenticated.
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),
    /// A URI in the message is malformed.
    #[error("invalid uri")]
    InvalidUri,
    /// The callee handling an invocation left before responding.
    #[error("callee unavailable")]
    CalleeUnavailable,
}

impl InteractionError {
    /// The trailing URI component for the error.
    pub fn uri_component(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) => "protocol_violation",
            Self::NoSuchProcedure => "no_such_procedure",
            Self::ProcedureAlreadyExists => "procedure_already_exists",
            Self::NoSuchRegistration => "no_such_registration",
            Self::NoSuchSubscription => "no_such_subscription",
            Self::NoSuchRealm => "no_such_realm",
            Self::NoSuchRole => "no_such_role",
            Self::Canceled => "canceled",
            Self::NotAuthorized => "not_authorized",
            Self::AuthorizationFailed(_) => "authorization_failed",
            Self::InvalidUri => "invalid_uri",
            Self::CalleeUnavailable => "callee_unavailable",
        }
    }

    /// The full error URI.
    pub fn uri(&self) -> Uri {
        Uri::from_known(format!("wamp.error.{}", self.uri_component()))
    }
}

/// Selects the error URI that describes the error to a peer.
///
/// Errors that are not part of the WAMP error taxonomy are reported as internal errors.
pub fn error_uri(error: &Error) -> Uri {
    if let Some(error) = error.downcast_ref::<InteractionError>() {
        return error.uri();
    }
    let component = match error.downcast_ref::<BasicError>() {
        Some(error) => error.uri_component(),
        None => "internal",
    };
    Uri::from_known(format!("wamp.error.{component}"))
}

/// Checks if the error should terminate the session rather than produce an ERROR reply.
pub fn is_protocol_violation(error: &Error) -> bool {
    matches!(
        error.downcast_ref::<InteractionError>(),
        Some(InteractionError::ProtocolViolation(_))
    )
}

/// Creates an [`struct@Error`] from a URI error reason and message.
pub fn error_from_uri_reason_and_message(reason: Uri, message: String) -> Error {
    match reason.as_ref() {
        "wamp.error.not_found" => BasicError::NotFound(message).into(),
        "wamp.error.invalid_argument" => BasicError::InvalidArgument(message).into(),
        "wamp.error.not_allowed" => BasicError::NotAllowed(message).into(),
        "wamp.error.permission_denied" => BasicError::PermissionDenied(message).into(),
        "wamp.error.protocol_violation" => InteractionError::ProtocolViolation(message).into(),
        "wamp.error.no_such_procedure" => InteractionError::NoSuchProcedure.into(),
        "wamp.error.procedure_already_exists" => InteractionError::ProcedureAlreadyExists.into(),
        "wamp.error.no_such_registration" => InteractionError::NoSuchRegistration.into(),
        "wamp.error.no_such_subscription" => InteractionError::NoSuchSubscription.into(),
        "wamp.error.no_such_realm" => InteractionError::NoSuchRealm.into(),
        "wamp.error.no_such_role" => InteractionError::NoSuchRole.into(),
        "wamp.error.canceled" => InteractionError::Canceled.into(),
        "wamp.error.not_authorized" => InteractionError::NotAuthorized.into(),
        "wamp.error.authorization_failed" => InteractionError::AuthorizationFailed(message).into(),
        "wamp.error.invalid_uri" => InteractionError::InvalidUri.into(),
        "wamp.error.callee_unavailable" => InteractionError::CalleeUnavailable.into(),
        _ => BasicError::Internal(message).into(),
    }
}

/// Extracts a URI error reason and message from a WAMP message.
pub fn extract_error_uri_reason_and_message(message: &Message) -> Result<(&Uri, &str), Error> {
    let reason = match message.reason() {
        Some(reason) => reason,
        None => return Err(Error::msg("message does not contain a reason uri")),
    };
    let message = match message.details().and_then(|details| details.get("message")) {
        Some(Value::String(message)) => message.as_str(),
        _ => "unknown error",
    };
    Ok((reason, message))
}

/// Constructs an [`struct@Error`] from a WAMP message.
///
/// Fails if the message does not describe any error.
pub fn error_from_message(message: &Message) -> Result<Error, Error> {
    let (uri, message) = extract_error_uri_reason_and_message(message)?;
    Ok(error_from_uri_reason_and_message(
        uri.clone(),
        message.to_owned(),
    ))
}

#[cfg(test)]
mod error_test {
    use anyhow::Error;

    use crate::core::error::{
        BasicError,
        InteractionError,
        error_from_uri_reason_and_message,
        error_uri,
        is_protocol_violation,
    };

    #[test]
    fn maps_errors_to_uris() {
        assert_eq!(
            error_uri(&InteractionError::NoSuchProcedure.into()).as_ref(),
            "wamp.error.no_such_procedure"
        );
        assert_eq!(
            error_uri(&BasicError::InvalidArgument("bad".to_owned()).into()).as_ref(),
            "wamp.error.invalid_argument"
        );
        assert_eq!(
            error_uri(&Error::msg("something else")).as_ref(),
            "wamp.error.internal"
        );
    }

    #[test]
    fn maps_context_wrapped_errors_to_uris() {
        let error = Error::from(InteractionError::CalleeUnavailable).context("call failed");
        assert_eq!(error_uri(&error).as_ref(), "wamp.error.callee_unavailable");
    }

    #[test]
    fn detects_protocol_violations() {
        assert!(is_protocol_violation(
            &InteractionError::ProtocolViolation("bad message".to_owned()).into()
        ));
        assert!(!is_protocol_violation(
            &InteractionError::NoSuchSubscription.into()
        ));
    }

    #[test]
    fn round_trips_error_uris() {
        let error = error_from_uri_reason_and_message(
            InteractionError::ProcedureAlreadyExists.uri(),
            String::default(),
        );
        assert_matches::assert_matches!(
            error.downcast_ref::<InteractionError>(),
            Some(InteractionError::ProcedureAlreadyExists)
        );
    }
}
