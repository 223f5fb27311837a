//! Connection-string parsing.
//!
//! Grammar: `;`-separated `Key=Value` pairs with case-insensitive keys.
//!
//! | Key            | Value                                   |
//! |----------------|-----------------------------------------|
//! | `Backend`      | `memory` or `filesystem` (required)     |
//! | `Root`         | directory, required for `filesystem`    |
//! | `MaxRetries`   | retries after the first attempt         |
//! | `RetryDeltaMs` | base backoff increment in milliseconds  |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::BlobBackend;
use crate::error::{StoreError, StoreResult};
use crate::fs::LocalFsBackend;
use crate::memory::InMemoryBackend;
use crate::retry::{RetryPolicy, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELTA};

/// Which backend a connection string selects.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    FileSystem { root: PathBuf },
}

/// A parsed connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionString {
    pub backend: BackendKind,
    pub retry: RetryPolicy,
}

impl ConnectionString {
    /// Construct the backend client this connection string describes.
    pub fn connect(&self) -> StoreResult<Arc<dyn BlobBackend>> {
        match &self.backend {
            BackendKind::Memory => Ok(Arc::new(InMemoryBackend::new())),
            BackendKind::FileSystem { root } => {
                let backend = LocalFsBackend::open(root.clone()).map_err(|e| {
                    StoreError::configuration(format!(
                        "cannot open filesystem backend at {}: {e}",
                        root.display()
                    ))
                })?;
                Ok(Arc::new(backend))
            }
        }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> StoreResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| StoreError::configuration(format!("{key} must be a number, got {value:?}")))
}

impl FromStr for ConnectionString {
    type Err = StoreError;

    fn from_str(raw: &str) -> StoreResult<Self> {
        let mut backend = None;
        let mut root = None;
        let mut max_retries = DEFAULT_MAX_RETRIES;
        let mut delta = DEFAULT_RETRY_DELTA;

        for pair in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                StoreError::configuration(format!("malformed connection string segment {pair:?}"))
            })?;
            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "backend" => backend = Some(value.to_ascii_lowercase()),
                "root" => root = Some(PathBuf::from(value)),
                "maxretries" => max_retries = parse_number("MaxRetries", value)?,
                "retrydeltams" => {
                    delta = Duration::from_millis(parse_number("RetryDeltaMs", value)?)
                }
                other => {
                    return Err(StoreError::configuration(format!(
                        "unknown connection string key {other:?}"
                    )))
                }
            }
        }

        let backend = match backend.as_deref() {
            Some("memory") => BackendKind::Memory,
            Some("filesystem") => BackendKind::FileSystem {
                root: root.ok_or_else(|| {
                    StoreError::configuration("filesystem backend requires Root")
                })?,
            },
            Some(other) => {
                return Err(StoreError::configuration(format!("unknown backend {other:?}")))
            }
            None => return Err(StoreError::configuration("connection string has no Backend")),
        };

        Ok(Self {
            backend,
            retry: RetryPolicy::Exponential {
                max_retries,
                delta,
                max_backoff: DEFAULT_MAX_BACKOFF,
            },
        })
    }
}
