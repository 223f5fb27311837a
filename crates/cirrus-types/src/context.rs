use std::fmt;

use serde::{Deserialize, Serialize};

/// Application-level request context passed to every caller-facing
/// operation.
///
/// The store does not interpret it; the correlation id only tags log output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestContext {
    correlation_id: uuid::Uuid,
}

impl RequestContext {
    /// New context with a fresh time-ordered correlation id (UUID v7).
    pub fn new() -> Self {
        Self {
            correlation_id: uuid::Uuid::now_v7(),
        }
    }

    /// Context carrying an existing correlation id.
    pub fn from_uuid(correlation_id: uuid::Uuid) -> Self {
        Self { correlation_id }
    }

    pub fn correlation_id(&self) -> &uuid::Uuid {
        &self.correlation_id
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestContext({})", self.correlation_id)
    }
}
