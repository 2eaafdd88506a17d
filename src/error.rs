use std::fmt::Display;

use alloy::transports;

/// Error produced by the binding runtime.
///
/// Every failure is surfaced as a value: synchronously from call/transact/
/// filter dispatch, or as the sticky terminal state of an
/// [`crate::event::EventIterator`] / result of an
/// [`crate::event::EventWatch`] task. Nothing is retried at this layer.
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// The interface descriptor itself could not be parsed.
    #[error("invalid interface descriptor: {0}")]
    Descriptor(String),

    /// Method or event name is not present in the descriptor.
    #[error("unknown method or event: {0}")]
    UnknownName(String),

    /// Caller-supplied arguments are inconsistent with the descriptor.
    /// Raised before any backend is contacted.
    #[error("encoding error: {0}")]
    Encode(String),

    /// Backend returned bytes inconsistent with the declared shape.
    #[error("decoding error: {0}")]
    Decode(String),

    /// The handle was not configured with the backend the operation needs.
    #[error("no {0} backend configured")]
    NoBackend(&'static str),

    /// Backend/transport failure, propagated verbatim.
    #[error("remote error: {0}")]
    Remote(String),

    /// The live log feed terminated abnormally.
    #[error("subscription terminated: {0}")]
    Subscription(String),
}

impl BindError {
    pub(crate) fn encode(err: impl Display) -> Self {
        Self::Encode(err.to_string())
    }

    pub(crate) fn decode(err: impl Display) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<transports::TransportError> for BindError {
    fn from(value: transports::TransportError) -> Self {
        match value {
            transports::RpcError::NullResp => Self::Remote("unexpected empty RPC response".into()),
            other => Self::Remote(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for BindError {
    fn from(value: serde_json::Error) -> Self {
        Self::Descriptor(value.to_string())
    }
}
