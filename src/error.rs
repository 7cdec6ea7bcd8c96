//! Error types for the RESP codec.
//!
//! [`RadishError`] is the tagged union the reader and writer surface to
//! callers: a transport error from the underlying source/sink, a clean
//! end-of-stream at a frame boundary, or a structured protocol error.
//! [`ProtocolError`] is the payload of the last case and is also what the
//! writer serializes for `-ERR ...` replies.

use std::fmt;
use std::io;

use thiserror::Error;

/// A structured RESP error reply: `-KIND MSG\r\n` on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub kind: String,
    pub msg: String,
}

impl ProtocolError {
    pub fn new(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            kind: if kind.is_empty() { "ERR".to_string() } else { kind },
            msg: msg.into(),
        }
    }

    pub(crate) fn invalid_multibulk_length() -> Self {
        Self::new("ERR", "Protocol error: invalid multibulk length")
    }

    pub(crate) fn invalid_bulk_length() -> Self {
        Self::new("ERR", "Protocol error: invalid bulk length")
    }

    pub(crate) fn invalid_integer_value() -> Self {
        Self::new("ERR", "Protocol error: invalid integer value")
    }

    pub(crate) fn unknown_reply_type(byte: u8) -> Self {
        Self::new(
            "ERR",
            format!(
                "Protocol error, got \"{}\" as reply type byte",
                byte as char
            ),
        )
    }

    pub(crate) fn framing(expected: u8, got: u8) -> Self {
        Self::new(
            "ERR",
            format!(
                "expected '{}', got '{}'",
                expected as char, got as char
            ),
        )
    }

    pub(crate) fn line_too_long() -> Self {
        Self::new("ERR", "line too long")
    }

    /// Internal-only marker used by length-line parsing before a call site
    /// rewrites it into one of the three canonical wire messages above.
    pub(crate) fn invalid_value() -> Self {
        Self::new("ERR", "invalid value")
    }

    pub(crate) fn is_invalid_value(&self) -> bool {
        self.msg == "invalid value"
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.kind.is_empty() { "<nil>" } else { &self.kind };
        let msg = if self.msg.is_empty() { "<nil>" } else { &self.msg };
        write!(f, "radish: {kind} {msg}")
    }
}

/// Everything a [`crate::Reader`] or [`crate::Writer`] operation can fail with.
#[derive(Debug, Error)]
pub enum RadishError {
    /// The underlying source/sink returned an error, propagated unchanged.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    /// The source was exhausted cleanly at a frame boundary.
    #[error("end of stream")]
    EndOfStream,

    /// A framing, length, or bulk-content violation.
    #[error("{0}")]
    Protocol(ProtocolError),
}

impl RadishError {
    pub(crate) fn protocol(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        RadishError::Protocol(ProtocolError::new(kind, msg))
    }

    /// Rewrites the internal "invalid value" sentinel into the canonical
    /// wire message for the length-line call site that produced it;
    /// everything else (Io, EndOfStream, other Protocol errors) passes
    /// through unchanged. See spec.md §4.2.3.
    pub(crate) fn rewrite_invalid_value(self, canonical: ProtocolError) -> Self {
        match self {
            RadishError::Protocol(p) if p.is_invalid_value() => RadishError::Protocol(canonical),
            other => other,
        }
    }
}
