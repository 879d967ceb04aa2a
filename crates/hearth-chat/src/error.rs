use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// Malformed input. Callers absorb this rather than report it.
    #[error("invalid input: {0}")]
    Validation(&'static str),

    /// The requester does not own the message, or the message does not exist.
    /// Both cases look the same to the caller.
    #[error("unauthorized")]
    Unauthorized,
}
