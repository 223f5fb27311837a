use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::{BlobContent, BlobStream};
use crate::error::{TypeResult, ValidationError};
use crate::object_ref::ObjectRef;

/// UTC timestamp identifying a snapshot of an object.
pub type SnapshotTime = DateTime<Utc>;

/// Largest chunk accepted by a single block upload (4 MiB).
pub const MAX_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// An object address paired with the caller's content.
///
/// For uploads the content is the source; for downloads it is the
/// destination and is overwritten.
#[derive(Debug)]
pub struct BlobPayload<'a> {
    pub object: ObjectRef,
    pub content: BlobContent<'a>,
}

impl<'a> BlobPayload<'a> {
    pub fn new(object: ObjectRef, content: impl Into<BlobContent<'a>>) -> Self {
        Self {
            object,
            content: content.into(),
        }
    }

    /// Payload with empty byte content, e.g. for a download into memory.
    pub fn empty(object: ObjectRef) -> Self {
        Self::new(object, BlobContent::default())
    }

    pub fn bytes(object: ObjectRef, data: Vec<u8>) -> Self {
        Self::new(object, BlobContent::Bytes(data))
    }

    pub fn text(object: ObjectRef, text: impl Into<String>) -> Self {
        Self::new(object, BlobContent::Text(text.into()))
    }

    pub fn stream(object: ObjectRef, stream: &'a mut dyn BlobStream) -> Self {
        Self::new(object, BlobContent::Stream(stream))
    }

    /// Content as bytes, if the payload holds `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.content {
            BlobContent::Bytes(data) => Some(data),
            _ => None,
        }
    }

    /// Content as text, if the payload holds `Text`.
    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            BlobContent::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// One chunk of a multi-request block upload.
///
/// Chunks of one logical object are numbered `0..chunk_count`; the chunk
/// with `chunk_index + 1 == chunk_count` triggers the commit.
#[derive(Debug)]
pub struct ChunkPayload<'a> {
    pub blob: BlobPayload<'a>,
    /// Zero-based position of this chunk.
    pub chunk_index: i64,
    /// Total number of chunks in the upload.
    pub chunk_count: i32,
}

impl<'a> ChunkPayload<'a> {
    pub fn new(blob: BlobPayload<'a>, chunk_index: i64, chunk_count: i32) -> Self {
        Self {
            blob,
            chunk_index,
            chunk_count,
        }
    }

    /// Whether accepting this chunk completes the upload.
    pub fn is_last(&self) -> bool {
        self.chunk_index + 1 == i64::from(self.chunk_count)
    }

    /// Check names, chunk shape and chunk size.
    ///
    /// Takes `&mut self` because measuring a stream's remaining length
    /// seeks it (its position is restored).
    pub fn validate(&mut self, operation: &str) -> TypeResult<()> {
        self.blob.object.validate(operation)?;
        validate_chunk_shape(self.chunk_index, self.chunk_count, operation)?;

        let len = self.blob.content.remaining_len().map_err(|e| {
            ValidationError::new("content", "<stream>", operation, format!("unreadable: {e}"))
        })?;
        if len > MAX_CHUNK_SIZE {
            return Err(ValidationError::new(
                "content",
                format!("{len} bytes"),
                operation,
                format!("chunk exceeds the {MAX_CHUNK_SIZE}-byte block limit"),
            ));
        }
        Ok(())
    }
}

/// Check `chunk_count >= 1` and `0 <= chunk_index < chunk_count`.
pub fn validate_chunk_shape(chunk_index: i64, chunk_count: i32, operation: &str) -> TypeResult<()> {
    if chunk_count < 1 {
        return Err(ValidationError::new(
            "chunk_count",
            chunk_count.to_string(),
            operation,
            "must be at least 1",
        ));
    }
    if chunk_index < 0 || chunk_index >= i64::from(chunk_count) {
        return Err(ValidationError::new(
            "chunk_index",
            chunk_index.to_string(),
            operation,
            format!("must be within 0..{chunk_count}"),
        ));
    }
    Ok(())
}

/// A blob payload addressed at one snapshot of the object.
///
/// Transient: stores never persist or cache it.
#[derive(Debug)]
pub struct VersionPayload<'a> {
    pub blob: BlobPayload<'a>,
    pub snapshot_time: SnapshotTime,
}

impl<'a> VersionPayload<'a> {
    pub fn new(blob: BlobPayload<'a>, snapshot_time: SnapshotTime) -> Self {
        Self {
            blob,
            snapshot_time,
        }
    }
}

/// A snapshot with its position in the listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    /// 1-based position in the backend's listing order. Recomputed on every
    /// listing, so it is only as stable as that order.
    pub version_number: u32,
    pub snapshot_time: SnapshotTime,
}

impl VersionInfo {
    /// Number snapshots 1..=N in the order given.
    pub fn enumerate(snapshots: impl IntoIterator<Item = SnapshotTime>) -> Vec<VersionInfo> {
        snapshots
            .into_iter()
            .zip(1u32..)
            .map(|(snapshot_time, version_number)| VersionInfo {
                version_number,
                snapshot_time,
            })
            .collect()
    }
}
