//! Error types for the protocol layer.

/// Errors that can occur while encoding or decoding lobby messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, missing fields, or an
    /// unknown message tag.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message decoded but breaks protocol rules, e.g. a request
    /// arriving where a broadcast was expected.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
