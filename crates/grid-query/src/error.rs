use thiserror::Error;

/// Failure reported by a [`Transport`](crate::Transport).
///
/// Cloneable so a failed grid can keep the error in its published state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected status: {status} body={body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum GridError {
    /// Raised while building an engine; retrying cannot fix it.
    #[error("grid configuration error: {0}")]
    Configuration(String),
}
