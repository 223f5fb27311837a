//! Foundation types for cirrus.
//!
//! Every other cirrus crate depends on `cirrus-types`. It holds the data the
//! stores pass around and the naming rules checked before any backend call.
//!
//! # Key Types
//!
//! - [`ObjectRef`]: container + object name
//! - [`BlobContent`]: caller content: bytes, text, or a borrowed stream
//! - [`BlobPayload`], [`ChunkPayload`], [`VersionPayload`]: operation inputs
//! - [`VersionInfo`]: a numbered snapshot
//! - [`RequestContext`]: opaque per-request correlation token
//! - [`ValidationError`]: the `InvalidArgument` error kind

pub mod content;
pub mod context;
pub mod error;
pub mod names;
pub mod object_ref;
pub mod payload;

pub use content::{BlobContent, BlobStream, ContentReader, ContentSink};
pub use context::RequestContext;
pub use error::{TypeResult, ValidationError};
pub use object_ref::ObjectRef;
pub use payload::{
    validate_chunk_shape, BlobPayload, ChunkPayload, SnapshotTime, VersionInfo, VersionPayload,
    MAX_CHUNK_SIZE,
};
