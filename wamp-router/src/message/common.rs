use anyhow::Error;

use crate::{
    core::{
        close::CloseReason,
        error::error_uri,
        id::Id,
        types::{
            Dictionary,
            Integer,
            Value,
        },
        uri::Uri,
    },
    message::message::{
        AbortMessage,
        ErrorMessage,
        GoodbyeMessage,
        Message,
    },
};

fn error_details(error: &Error) -> Dictionary {
    Dictionary::from_iter([("message".to_owned(), Value::String(error.to_string()))])
}

/// ABORT describing why a session could not continue.
pub fn abort_message_for_error(error: &Error) -> Message {
    Message::Abort(AbortMessage {
        details: error_details(error),
        reason: error_uri(error),
        ..Default::default()
    })
}

/// GOODBYE with the given close reason.
pub fn goodbye_with_close_reason(close_reason: CloseReason) -> Message {
    Message::Goodbye(GoodbyeMessage {
        details: Dictionary::default(),
        reason: close_reason.uri(),
    })
}

/// GOODBYE acknowledging a peer's GOODBYE.
pub fn goodbye_and_out() -> Message {
    goodbye_with_close_reason(CloseReason::GoodbyeAndOut)
}

/// ERROR for a request of the given type.
pub fn error_for_request_type(request_type: Integer, request: Id, error: &Error) -> Message {
    Message::Error(ErrorMessage {
        request_type,
        request,
        details: error_details(error),
        error: error_uri(error),
        ..Default::default()
    })
}

/// ERROR replying to the request message.
pub fn error_for_request(message: &Message, error: &Error) -> Message {
    error_for_request_type(
        message.code(),
        message.request_id().unwrap_or_default(),
        error,
    )
}

/// ERROR with a URI and payload supplied by a peer, such as a callee's failure.
pub fn forwarded_error(
    request_type: Integer,
    request: Id,
    details: Dictionary,
    error: Uri,
    arguments: Vec<Value>,
    arguments_keyword: Dictionary,
) -> Message {
    Message::Error(ErrorMessage {
        request_type,
        request,
        details,
        error,
        arguments,
        arguments_keyword,
    })
}

#[cfg(test)]
mod common_test {
    use anyhow::Error;

    use crate::{
        core::{
            error::InteractionError,
            id::Id,
        },
        message::{
            common::{
                abort_message_for_error,
                error_for_request,
                goodbye_and_out,
            },
            message::{
                CallMessage,
                Message,
            },
        },
    };

    #[test]
    fn error_correlates_to_request() {
        let call = Message::Call(CallMessage {
            request: Id::try_from(9).unwrap(),
            ..Default::default()
        });
        let error = Error::from(InteractionError::NoSuchProcedure);
        assert_matches::assert_matches!(error_for_request(&call, &error), Message::Error(message) => {
            assert_eq!(message.request_type, Message::CALL_CODE);
            assert_eq!(message.request, Id::try_from(9).unwrap());
            assert_eq!(message.error.as_ref(), "wamp.error.no_such_procedure");
        });
    }

    #[test]
    fn abort_carries_reason_and_message() {
        let error = Error::from(InteractionError::NoSuchRealm);
        assert_matches::assert_matches!(abort_message_for_error(&error), Message::Abort(message) => {
            assert_eq!(message.reason.as_ref(), "wamp.error.no_such_realm");
            assert_eq!(
                message.details.get("message").and_then(|value| value.string()),
                Some("no such realm")
            );
        });
    }

    #[test]
    fn goodbye_and_out_uses_close_reason() {
        assert_matches::assert_matches!(goodbye_and_out(), Message::Goodbye(message) => {
            assert_eq!(message.reason.as_ref(), "wamp.close.goodbye_and_out");
        });
    }
}
