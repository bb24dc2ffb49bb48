use thiserror::Error;

/// Framing and payload decoding failures.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed header: need {expected} bytes, got {actual}")]
    MalformedHeader { expected: usize, actual: usize },

    #[error("truncated payload for code {code}: need at least {expected} bytes, got {actual}")]
    TruncatedPayload {
        code: u16,
        expected: usize,
        actual: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
