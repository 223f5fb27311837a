use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeResult;
use crate::names;

/// Address of a blob: a container plus an object name within it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub container: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Check both names against the naming rules in [`names`].
    pub fn validate(&self, operation: &str) -> TypeResult<()> {
        names::validate(self, operation)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}
