use thiserror::Error;

/// A locally detected argument error.
///
/// Raised before any backend round-trip: bad object names, bad container
/// names, malformed chunk shapes, oversized chunks.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{operation}: invalid {field} {value:?}: {reason}")]
pub struct ValidationError {
    /// The offending field (`name`, `container`, `chunk_index`, ...).
    pub field: &'static str,
    /// The offending value, rendered as text.
    pub value: String,
    /// Operation label of the call that was rejected.
    pub operation: String,
    /// Human-readable rule that was violated.
    pub reason: String,
}

impl ValidationError {
    pub fn new(
        field: &'static str,
        value: impl Into<String>,
        operation: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            field,
            value: value.into(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for validation.
pub type TypeResult<T> = Result<T, ValidationError>;
