use std::fmt;

use cirrus_types::{ObjectRef, ValidationError};

use crate::backend::BackendError;

/// Errors from store operations.
///
/// Validation failures are raised before any backend call and are never
/// wrapped. Backend failures are wrapped exactly once, into the variant of
/// the operation that failed, together with the object's name and container.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Bad name, container, or chunk shape, detected locally.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    /// The backend endpoint could not be resolved or constructed.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("upload of {name} to {container} failed")]
    Upload {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    #[error("download of {name} from {container} failed")]
    Download {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    #[error("delete of {name} from {container} failed")]
    Delete {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    #[error("snapshot of {name} in {container} failed")]
    Snapshot {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    #[error("block upload for {name} in {container} failed")]
    PutBlock {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    #[error("block commit for {name} in {container} failed")]
    Commit {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    /// The staged blocks do not form the sequence `0..chunk_count`.
    /// Never retried; nothing was committed.
    #[error("missing blocks for {name} in {container}: expected chunk {expected}, found {}", display_found(.found))]
    MissingBlocks {
        name: String,
        container: String,
        expected: i64,
        found: Option<i64>,
    },

    #[error("listing snapshots of {name} in {container} failed")]
    List {
        name: String,
        container: String,
        #[source]
        source: BackendError,
    },

    /// The object does not exist (or has no such version).
    #[error("{name} does not exist in {container}")]
    NotFound { name: String, container: String },
}

fn display_found(found: &Option<i64>) -> String {
    match found {
        Some(index) => format!("chunk {index}"),
        None => "end of staged blocks".to_string(),
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// The taxonomy of [`StoreError`] without payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Configuration,
    Upload,
    Download,
    Delete,
    Snapshot,
    PutBlock,
    Commit,
    MissingBlocks,
    List,
    NotFound,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InvalidArgument => "invalid_argument",
            Self::Configuration => "configuration",
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Delete => "delete",
            Self::Snapshot => "snapshot",
            Self::PutBlock => "put_block",
            Self::Commit => "commit",
            Self::MissingBlocks => "missing_blocks",
            Self::List => "list",
            Self::NotFound => "not_found",
        };
        f.write_str(label)
    }
}

/// A store operation that reaches the backend; each one wraps backend
/// failures into its own [`StoreError`] variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Upload,
    Download,
    Delete,
    Snapshot,
    PutBlock,
    Commit,
    List,
}

impl StoreOp {
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::Upload => ErrorKind::Upload,
            Self::Download => ErrorKind::Download,
            Self::Delete => ErrorKind::Delete,
            Self::Snapshot => ErrorKind::Snapshot,
            Self::PutBlock => ErrorKind::PutBlock,
            Self::Commit => ErrorKind::Commit,
            Self::List => ErrorKind::List,
        }
    }
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

impl StoreError {
    /// Wrap a backend failure into the variant for `op`.
    pub fn backend(op: StoreOp, object: &ObjectRef, source: BackendError) -> Self {
        let name = object.name.clone();
        let container = object.container.clone();
        match op {
            StoreOp::Upload => Self::Upload { name, container, source },
            StoreOp::Download => Self::Download { name, container, source },
            StoreOp::Delete => Self::Delete { name, container, source },
            StoreOp::Snapshot => Self::Snapshot { name, container, source },
            StoreOp::PutBlock => Self::PutBlock { name, container, source },
            StoreOp::Commit => Self::Commit { name, container, source },
            StoreOp::List => Self::List { name, container, source },
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn not_found(object: &ObjectRef) -> Self {
        Self::NotFound {
            name: object.name.clone(),
            container: object.container.clone(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Upload { .. } => ErrorKind::Upload,
            Self::Download { .. } => ErrorKind::Download,
            Self::Delete { .. } => ErrorKind::Delete,
            Self::Snapshot { .. } => ErrorKind::Snapshot,
            Self::PutBlock { .. } => ErrorKind::PutBlock,
            Self::Commit { .. } => ErrorKind::Commit,
            Self::MissingBlocks { .. } => ErrorKind::MissingBlocks,
            Self::List { .. } => ErrorKind::List,
            Self::NotFound { .. } => ErrorKind::NotFound,
        }
    }

    /// The wrapped backend failure, if this error carries one.
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Upload { source, .. }
            | Self::Download { source, .. }
            | Self::Delete { source, .. }
            | Self::Snapshot { source, .. }
            | Self::PutBlock { source, .. }
            | Self::Commit { source, .. }
            | Self::List { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether the object (or version) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
            || self.backend_error().is_some_and(BackendError::is_not_found)
    }

    /// Whether the failure came from a transient backend condition that
    /// outlasted the retry policy.
    pub fn is_transient(&self) -> bool {
        self.backend_error().is_some_and(BackendError::is_transient)
    }
}
