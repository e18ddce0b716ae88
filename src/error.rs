//! Error type shared by the UI thread and the worker.
//!
//! Errors travel through shared futures and across the worker boundary, so the
//! type is `Clone` and carries only plain text payloads.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlannerError {
    /// The worker bridge went away while requests were outstanding.
    #[error("channel closed")]
    ChannelClosed,

    /// An error raised on the other side of the worker boundary. Only the
    /// message survives serialization.
    #[error("{0}")]
    Remote(String),

    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("failed to decode dataset: {0}")]
    Decode(String),

    #[error("unknown stop: {0}")]
    UnknownStop(String),

    /// The worker received a request `type` it does not handle.
    #[error("unsupported request type")]
    UnsupportedRequest,

    #[error("unexpected reply from worker (expected {expected})")]
    UnexpectedReply { expected: &'static str },

    #[error("cannot build cache key: {0}")]
    Key(String),
}

impl From<serde_json::Error> for PlannerError {
    fn from(err: serde_json::Error) -> Self {
        PlannerError::Key(err.to_string())
    }
}

impl From<bincode::Error> for PlannerError {
    fn from(err: bincode::Error) -> Self {
        PlannerError::Decode(err.to_string())
    }
}
