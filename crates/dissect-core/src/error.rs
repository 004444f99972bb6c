use serde::Serialize;
use thiserror::Error;

/// Decode failures raised by the cursor, the record walker, and the
/// schema engine.
///
/// Every variant is recoverable: it degrades the record or field that
/// produced it and is attached to the enclosing tree node as a
/// diagnostic. Nothing in this crate panics on out-of-range input.
///
/// # Examples
/// ```
/// use dissect_core::error::DecodeError;
///
/// let err = DecodeError::Truncated { at: 4, needed: 2, actual: 0 };
/// assert!(err.to_string().contains("field missing on the wire"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The wire format guarantees bytes that are not present in the
    /// reported packet.
    #[error("field missing on the wire: need {needed} bytes at offset {at}, {actual} remain")]
    Truncated {
        at: usize,
        needed: usize,
        actual: usize,
    },
    /// The packet was cut short at capture time (snaplen); the bytes
    /// existed on the wire but were not captured.
    #[error("packet cut short at capture: need {needed} bytes at offset {at}, {actual} captured")]
    Incomplete {
        at: usize,
        needed: usize,
        actual: usize,
    },
    /// A length or tag value contradicts the enclosing record.
    #[error("malformed record at offset {at}: {reason}")]
    Malformed { at: usize, reason: String },
    /// A required field spec did not match the next record's tag.
    #[error("schema violation at offset {at}: expected {expected}, found tag {found:#04x}")]
    SchemaViolation {
        at: usize,
        expected: String,
        found: u32,
    },
    /// Unknown discriminant with no registered decoder.
    #[error("unsupported discriminant {discriminant:#04x} at offset {at}")]
    UnsupportedField { at: usize, discriminant: u32 },
    /// A context id was referenced before any PDU registered it.
    #[error("decoder for context id {context_id} is not available")]
    ContextMiss { context_id: u32 },
}

impl DecodeError {
    /// Diagnostic classification for the tree's side channel.
    pub fn kind(&self) -> DiagnosticKind {
        match self {
            DecodeError::Truncated { .. } => DiagnosticKind::Truncated,
            DecodeError::Incomplete { .. } => DiagnosticKind::Incomplete,
            DecodeError::Malformed { .. } => DiagnosticKind::Malformed,
            DecodeError::SchemaViolation { .. } => DiagnosticKind::SchemaViolation,
            DecodeError::UnsupportedField { .. } => DiagnosticKind::UnsupportedField,
            DecodeError::ContextMiss { .. } => DiagnosticKind::ContextMiss,
        }
    }

    /// Byte offset the failure is anchored to, when it has one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            DecodeError::Truncated { at, .. }
            | DecodeError::Incomplete { at, .. }
            | DecodeError::Malformed { at, .. }
            | DecodeError::SchemaViolation { at, .. }
            | DecodeError::UnsupportedField { at, .. } => Some(*at),
            DecodeError::ContextMiss { .. } => None,
        }
    }
}

/// Diagnostic categories, one per [`DecodeError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Truncated,
    Incomplete,
    Malformed,
    SchemaViolation,
    UnsupportedField,
    ContextMiss,
}
