//! High-level SDK for cirrus.
//!
//! Three caller-facing stores share one [`BaseStore`]:
//!
//! - [`BlobStore`] -- whole-object put/get/delete
//! - [`ChunkStore`] -- multi-request block uploads and reassembling downloads
//! - [`VersionStore`] -- snapshot-backed versions with 1-based numbering
//!
//! Every operation takes a [`RequestContext`]; its correlation id is attached
//! to the operation's `tracing` span. Errors are the store's [`StoreError`],
//! returned unchanged so callers can match on the kind.

pub mod blob;
pub mod chunk;
pub mod version;

pub use blob::BlobStore;
pub use chunk::{ChunkStore, UploadPhase, DOWNLOAD_BUFFER_SIZE};
pub use version::{PutOutcome, VersionStore};

// Re-export key types
pub use cirrus_store::{BaseStore, ErrorKind, StoreError, StoreResult};
pub use cirrus_types::{
    BlobContent, BlobPayload, ChunkPayload, ObjectRef, RequestContext, SnapshotTime, VersionInfo,
    VersionPayload,
};

/// Span for one caller-facing operation.
pub(crate) fn request_span(
    operation: &'static str,
    ctx: &RequestContext,
    object: &ObjectRef,
) -> tracing::Span {
    tracing::info_span!(
        "cirrus",
        operation,
        correlation_id = %ctx.correlation_id(),
        container = %object.container,
        name = %object.name,
    )
}
