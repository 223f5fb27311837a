//! The [`BlobBackend`] trait: the remote object store as seen by cirrus.
//!
//! A backend exposes container/object semantics, snapshots, and a staging
//! area for uncommitted blocks. The stores above it never talk to a service
//! directly; they go through this trait, which keeps them testable against
//! [`InMemoryBackend`](crate::memory::InMemoryBackend).

use std::fmt;
use std::io::{self, Read, Write};

use chrono::{Duration, Timelike, Utc};
use cirrus_types::SnapshotTime;
use serde::{Deserialize, Serialize};

/// Anonymous-access level of a container.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerAccess {
    /// No anonymous access.
    #[default]
    Private,
    /// Anonymous read access to objects, but not to listings.
    Blob,
    /// Anonymous read access to objects and listings.
    Container,
}

/// One entry in a container listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobListing {
    pub name: String,
    /// `Some` for a snapshot, `None` for the object's current state.
    pub snapshot: Option<SnapshotTime>,
    pub size: u64,
}

/// What went wrong inside a backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendErrorKind {
    /// The container, object, or snapshot does not exist.
    NotFound,
    /// The service could not be reached or refused the request for now.
    Unavailable,
    /// The request did not complete in time.
    Timeout,
    /// The content digest did not match the received bytes.
    IntegrityMismatch,
    /// The backend returned data the client cannot interpret.
    InvalidResponse,
    /// Local or remote I/O failure.
    Io,
    /// Any other permanent failure.
    Other,
}

impl BackendErrorKind {
    /// Transient failures are worth retrying.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::IntegrityMismatch => "integrity mismatch",
            Self::InvalidResponse => "invalid response",
            Self::Io => "io",
            Self::Other => "backend failure",
        };
        f.write_str(label)
    }
}

/// A failure reported by a backend.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    kind: BackendErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> BackendErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == BackendErrorKind::NotFound
    }
}

impl From<io::Error> for BackendError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => BackendErrorKind::NotFound,
            io::ErrorKind::TimedOut => BackendErrorKind::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted => BackendErrorKind::Unavailable,
            io::ErrorKind::InvalidData => BackendErrorKind::InvalidResponse,
            _ => BackendErrorKind::Io,
        };
        let message = err.to_string();
        Self::new(kind, message).with_source(err)
    }
}

/// Result alias for backend calls.
pub type BackendResult<T> = Result<T, BackendError>;

/// Remote object storage with containers, snapshots, and staged blocks.
///
/// Implementations must be thread-safe (`Send + Sync`); a single backend is
/// shared by every call issued through one store. Calls are blocking.
///
/// Object-level calls other than `create_container_if_absent` may assume the
/// container exists and fail with [`BackendErrorKind::NotFound`] otherwise.
pub trait BlobBackend: Send + Sync {
    /// Short name of the backend, for logs.
    fn backend_name(&self) -> &'static str;

    /// Create the container if it does not exist yet. Returns `true` if it
    /// was created by this call, in which case it gets `access`.
    fn create_container_if_absent(&self, container: &str, access: ContainerAccess)
        -> BackendResult<bool>;

    /// Whether the object currently has committed content.
    fn object_exists(&self, container: &str, name: &str) -> BackendResult<bool>;

    /// Replace the object's current content with everything `content`
    /// yields. Returns the number of bytes stored.
    fn put_object(&self, container: &str, name: &str, content: &mut dyn Read)
        -> BackendResult<u64>;

    /// Write the object's content (or a snapshot's) into `sink`.
    fn get_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
        sink: &mut dyn Write,
    ) -> BackendResult<u64>;

    /// Open a stream over the object's current content.
    fn open_read(&self, container: &str, name: &str) -> BackendResult<Box<dyn Read + Send>>;

    /// Delete the object (with all its snapshots) or a single snapshot.
    /// Returns `true` if something was deleted.
    fn delete_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
    ) -> BackendResult<bool>;

    /// Freeze the object's current content as an immutable snapshot.
    fn create_snapshot(&self, container: &str, name: &str) -> BackendResult<SnapshotTime>;

    /// Stage a block under `block_id`, replacing any staged block with the
    /// same id. `content_md5` is the base64 MD5 of the block; a mismatch
    /// fails with [`BackendErrorKind::IntegrityMismatch`].
    fn put_block(
        &self,
        container: &str,
        name: &str,
        block_id: &str,
        content: &mut dyn Read,
        content_md5: &str,
    ) -> BackendResult<()>;

    /// Ids of the blocks staged for the object and not yet committed.
    fn list_uncommitted_blocks(&self, container: &str, name: &str) -> BackendResult<Vec<String>>;

    /// Make the listed staged blocks, in order, the object's content.
    /// Staged blocks not in the list are discarded.
    fn commit_block_list(&self, container: &str, name: &str, block_ids: &[String])
        -> BackendResult<()>;

    /// List the container's objects, optionally with their snapshots.
    fn list_blobs(&self, container: &str, include_snapshots: bool)
        -> BackendResult<Vec<BlobListing>>;
}

/// Timestamp for a new snapshot: now, at microsecond precision, and strictly
/// after `previous`.
pub(crate) fn next_snapshot_time(previous: Option<SnapshotTime>) -> SnapshotTime {
    let now = Utc::now();
    let now = now
        .with_nanosecond(now.nanosecond() / 1_000 * 1_000)
        .unwrap_or(now);
    match previous {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn transient_kinds() {
        assert!(BackendErrorKind::Unavailable.is_transient());
        assert!(BackendErrorKind::Timeout.is_transient());
        assert!(!BackendErrorKind::NotFound.is_transient());
        assert!(!BackendErrorKind::IntegrityMismatch.is_transient());
        assert!(!BackendErrorKind::Io.is_transient());
    }

    #[test]
    fn io_error_mapping() {
        let err = BackendError::from(io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(err.is_not_found());
        assert!(err.source().is_some());

        let err = BackendError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(err.is_transient());

        let err = BackendError::from(io::Error::new(io::ErrorKind::InvalidData, "bad"));
        assert_eq!(err.kind(), BackendErrorKind::InvalidResponse);

        let err = BackendError::from(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert_eq!(err.kind(), BackendErrorKind::Io);
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = BackendError::not_found("object sagelabs/doc1");
        assert_eq!(err.to_string(), "not found: object sagelabs/doc1");
        assert_eq!(err.message(), "object sagelabs/doc1");
    }

    #[test]
    fn snapshot_times_are_strictly_increasing() {
        let first = next_snapshot_time(None);
        let second = next_snapshot_time(Some(first));
        let third = next_snapshot_time(Some(second));
        assert!(second > first);
        assert!(third > second);
        assert_eq!(first.nanosecond() % 1_000, 0);
    }

    #[test]
    fn snapshot_time_after_future_previous() {
        let future = Utc::now() + Duration::hours(1);
        let next = next_snapshot_time(Some(future));
        assert_eq!(next, future + Duration::microseconds(1));
    }

    #[test]
    fn default_access_is_private() {
        assert_eq!(ContainerAccess::default(), ContainerAccess::Private);
        assert_eq!(
            serde_json::to_string(&ContainerAccess::Private).unwrap(),
            "\"private\""
        );
    }
}
