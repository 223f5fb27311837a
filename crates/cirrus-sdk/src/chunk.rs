//! Chunked uploads and reassembling downloads.
//!
//! An upload of one logical object is a sequence of [`ChunkStore::put`]
//! calls, one per chunk. Each chunk is staged as an uncommitted block; the
//! chunk with `chunk_index + 1 == chunk_count` triggers the commit. Nothing
//! is kept between calls except the staged blocks on the backend, so a
//! failed upload can be resumed by re-sending the chunks that did not land.

use std::io::{self, Read, Write};
use std::sync::Arc;

use cirrus_store::{BackendError, BaseStore, ConfigProvider, StoreError, StoreOp, StoreResult};
use cirrus_types::{BlobPayload, ChunkPayload, RequestContext};
use tracing::{debug, info};

use crate::request_span;

/// Read buffer size for chunked downloads (64 KiB).
pub const DOWNLOAD_BUFFER_SIZE: usize = 64 * 1024;

/// Where a chunked upload stands after a chunk is accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    /// More chunks are expected.
    Uploading,
    /// The final chunk was accepted and the block list is being committed.
    Committing,
    /// The block list was committed; the object holds the full content.
    Committed,
}

impl UploadPhase {
    /// Phase reached once chunk `chunk_index` of `chunk_count` is staged.
    pub fn after_accepting(chunk_index: i64, chunk_count: i32) -> Self {
        if chunk_index + 1 == i64::from(chunk_count) {
            Self::Committing
        } else {
            Self::Uploading
        }
    }
}

/// Blob store for objects uploaded in chunks.
#[derive(Clone)]
pub struct ChunkStore {
    base: Arc<BaseStore>,
}

impl ChunkStore {
    pub fn new(base: Arc<BaseStore>) -> Self {
        Self { base }
    }

    pub fn from_config(provider: &dyn ConfigProvider) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(BaseStore::from_config(provider)?)))
    }

    pub fn base(&self) -> &Arc<BaseStore> {
        &self.base
    }

    /// Stage one chunk, committing the upload if it is the last one.
    ///
    /// Returns [`UploadPhase::Uploading`] or [`UploadPhase::Committed`]. On
    /// failure the upload stays uncommitted; re-sending a chunk replaces the
    /// earlier block for that index.
    pub fn put(
        &self,
        ctx: &RequestContext,
        payload: &mut ChunkPayload<'_>,
    ) -> StoreResult<UploadPhase> {
        let _span = request_span("chunk_put", ctx, &payload.blob.object).entered();
        let block_id = self.base.put_block(payload)?;

        let phase = UploadPhase::after_accepting(payload.chunk_index, payload.chunk_count);
        debug!(
            chunk_index = payload.chunk_index,
            chunk_count = payload.chunk_count,
            %block_id,
            ?phase,
            "accepted chunk"
        );
        if phase != UploadPhase::Committing {
            return Ok(phase);
        }

        let blocks = self
            .base
            .commit_blocks(&payload.blob.object, payload.chunk_count)?;
        info!(blocks = blocks.len(), "chunked upload committed");
        Ok(UploadPhase::Committed)
    }

    /// Stream the committed object into the payload's content in
    /// [`DOWNLOAD_BUFFER_SIZE`] reads. A stream destination is rewound to
    /// the start afterwards.
    pub fn get(&self, ctx: &RequestContext, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        let _span = request_span("chunk_get", ctx, &payload.object).entered();
        let mut source = self.base.block_stream(&payload.object)?;

        let object = &payload.object;
        let wrap =
            |e: io::Error| StoreError::backend(StoreOp::Download, object, BackendError::from(e));
        let mut sink = payload.content.sink().map_err(wrap)?;
        let mut buffer = vec![0u8; DOWNLOAD_BUFFER_SIZE];
        loop {
            let n = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(wrap(e)),
            };
            sink.write_all(&buffer[..n]).map_err(wrap)?;
        }
        let size = sink.finish().map_err(wrap)?;
        debug!(size, "reassembled chunked object");
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::memory_store;
    use cirrus_store::{BackendErrorKind, BackendOp, ErrorKind, InMemoryBackend};
    use cirrus_types::{ObjectRef, MAX_CHUNK_SIZE};
    use std::io::Cursor;

    fn big() -> ObjectRef {
        ObjectRef::new("sagelabs", "big")
    }

    fn chunk(data: &[u8], index: i64, count: i32) -> ChunkPayload<'static> {
        ChunkPayload::new(BlobPayload::bytes(big(), data.to_vec()), index, count)
    }

    fn download(store: &ChunkStore) -> Vec<u8> {
        let mut out = BlobPayload::empty(big());
        store.get(&RequestContext::new(), &mut out).unwrap();
        out.as_bytes().unwrap().to_vec()
    }

    fn commits(backend: &InMemoryBackend) -> usize {
        backend.count_of(BackendOp::CommitBlockList)
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    #[test]
    fn phase_transitions() {
        assert_eq!(UploadPhase::after_accepting(0, 3), UploadPhase::Uploading);
        assert_eq!(UploadPhase::after_accepting(1, 3), UploadPhase::Uploading);
        assert_eq!(UploadPhase::after_accepting(2, 3), UploadPhase::Committing);
        assert_eq!(UploadPhase::after_accepting(0, 1), UploadPhase::Committing);
    }

    // -----------------------------------------------------------------------
    // Upload
    // -----------------------------------------------------------------------

    #[test]
    fn three_chunks_commit_once_and_reassemble() {
        let (backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        let parts: [&[u8]; 3] = [b"alpha-", b"beta-", b"gamma"];

        for (index, part) in parts.iter().enumerate() {
            let phase = store.put(&ctx, &mut chunk(part, index as i64, 3)).unwrap();
            if index < 2 {
                assert_eq!(phase, UploadPhase::Uploading);
                assert_eq!(commits(&backend), 0);
            } else {
                assert_eq!(phase, UploadPhase::Committed);
            }
        }
        assert_eq!(commits(&backend), 1);
        assert_eq!(download(&store), parts.concat());
    }

    #[test]
    fn out_of_order_chunks_commit_in_index_order() {
        let (_backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        store.put(&ctx, &mut chunk(b"b", 1, 3)).unwrap();
        store.put(&ctx, &mut chunk(b"a", 0, 3)).unwrap();
        assert_eq!(store.put(&ctx, &mut chunk(b"c", 2, 3)).unwrap(), UploadPhase::Committed);
        assert_eq!(download(&store), b"abc");
    }

    #[test]
    fn last_chunk_over_a_gap_fails_and_resumes() {
        let (backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        store.put(&ctx, &mut chunk(b"0", 0, 4)).unwrap();
        store.put(&ctx, &mut chunk(b"1", 1, 4)).unwrap();
        let err = store.put(&ctx, &mut chunk(b"3", 3, 4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingBlocks);
        assert_eq!(commits(&backend), 0);

        // Re-sending the missing chunk and the last one completes the upload.
        store.put(&ctx, &mut chunk(b"2", 2, 4)).unwrap();
        store.put(&ctx, &mut chunk(b"3", 3, 4)).unwrap();
        assert_eq!(download(&store), b"0123");
    }

    #[test]
    fn resent_chunk_replaces_earlier_block() {
        let (_backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        store.put(&ctx, &mut chunk(b"a", 0, 3)).unwrap();
        store.put(&ctx, &mut chunk(b"stale", 1, 3)).unwrap();
        store.put(&ctx, &mut chunk(b"b", 1, 3)).unwrap();
        store.put(&ctx, &mut chunk(b"c", 2, 3)).unwrap();
        assert_eq!(download(&store), b"abc");
    }

    #[test]
    fn oversized_and_malformed_chunks_are_invalid() {
        let (backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();

        let oversized = vec![0u8; MAX_CHUNK_SIZE as usize + 1];
        let err = store.put(&ctx, &mut chunk(&oversized, 0, 1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = store.put(&ctx, &mut chunk(b"x", 0, 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn failed_commit_leaves_upload_resumable() {
        let (backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        store.put(&ctx, &mut chunk(b"a", 0, 2)).unwrap();
        backend.inject_failure(BackendOp::CommitBlockList, BackendErrorKind::Other, 1);
        let err = store.put(&ctx, &mut chunk(b"b", 1, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Commit);
        assert_eq!(backend.staged_block_ids("sagelabs", "big").len(), 2);

        assert_eq!(store.put(&ctx, &mut chunk(b"b", 1, 2)).unwrap(), UploadPhase::Committed);
        assert_eq!(download(&store), b"ab");
    }

    #[test]
    fn stream_chunks_upload_from_current_position() {
        let (_backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        let mut first = Cursor::new(b"head".to_vec());
        let mut second = Cursor::new(b"tail".to_vec());
        store
            .put(&ctx, &mut ChunkPayload::new(BlobPayload::stream(big(), &mut first), 0, 2))
            .unwrap();
        store
            .put(&ctx, &mut ChunkPayload::new(BlobPayload::stream(big(), &mut second), 1, 2))
            .unwrap();
        assert_eq!(download(&store), b"headtail");
    }

    // -----------------------------------------------------------------------
    // Download
    // -----------------------------------------------------------------------

    #[test]
    fn get_spans_multiple_buffers() {
        let (_backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let ctx = RequestContext::new();
        let data: Vec<u8> = (0..DOWNLOAD_BUFFER_SIZE * 2 + 17).map(|i| (i % 251) as u8).collect();
        store.put(&ctx, &mut chunk(&data, 0, 1)).unwrap();

        let mut dest = Cursor::new(Vec::new());
        let size = store
            .get(&ctx, &mut BlobPayload::stream(big(), &mut dest))
            .unwrap();
        assert_eq!(size, data.len() as u64);
        assert_eq!(dest.position(), 0);
        assert_eq!(dest.into_inner(), data);
    }

    #[test]
    fn get_reads_objects_put_whole() {
        let (_backend, base) = memory_store();
        let ctx = RequestContext::new();
        base.put(&mut BlobPayload::text(big(), "not chunked")).unwrap();
        let store = ChunkStore::new(base);
        let mut out = BlobPayload::text(big(), "");
        store.get(&ctx, &mut out).unwrap();
        assert_eq!(out.as_text(), Some("not chunked"));
    }

    #[test]
    fn get_missing_object_is_not_found() {
        let (_backend, base) = memory_store();
        let store = ChunkStore::new(base);
        let err = store
            .get(&RequestContext::new(), &mut BlobPayload::empty(big()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(err.is_not_found());
    }

    // -----------------------------------------------------------------------
    // Shared use across threads
    // -----------------------------------------------------------------------

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn stores_are_send_and_sync() {
        assert_send_sync::<BaseStore>();
        assert_send_sync::<ChunkStore>();
        assert_send_sync::<crate::VersionStore>();
        assert_send_sync::<crate::BlobStore>();
    }

    /// Upload a distinct three-chunk object from each of eight threads and
    /// check that every object reassembles to its own bytes.
    fn concurrent_uploads_stay_independent(store: ChunkStore) {
        use std::thread;

        let expected = |n: usize| format!("object-{n}:").repeat(100 + n).into_bytes();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                let data = expected(n);
                thread::spawn(move || {
                    let object = ObjectRef::new("sagelabs", format!("part-{n}"));
                    let ctx = RequestContext::new();
                    let third = data.len() / 3;
                    let parts = [&data[..third], &data[third..2 * third], &data[2 * third..]];
                    for (index, part) in parts.iter().enumerate() {
                        let blob = BlobPayload::bytes(object.clone(), part.to_vec());
                        store
                            .put(&ctx, &mut ChunkPayload::new(blob, index as i64, 3))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }

        for n in 0..8 {
            let mut out = BlobPayload::empty(ObjectRef::new("sagelabs", format!("part-{n}")));
            store.get(&RequestContext::new(), &mut out).unwrap();
            assert_eq!(out.as_bytes().unwrap(), expected(n).as_slice());
        }
    }

    #[test]
    fn concurrent_uploads_on_memory_backend() {
        let (backend, base) = memory_store();
        concurrent_uploads_stay_independent(ChunkStore::new(base));
        assert_eq!(commits(&backend), 8);
    }

    #[test]
    fn concurrent_uploads_on_filesystem_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw = format!("Backend=filesystem;Root={}", dir.path().display());
        let base = Arc::new(BaseStore::create(&raw).unwrap());
        concurrent_uploads_stay_independent(ChunkStore::new(base));
    }

    #[test]
    fn chunked_upload_on_filesystem_backend() {
        let dir = tempfile::TempDir::new().unwrap();
        let raw = format!("Backend=filesystem;Root={}", dir.path().display());
        let store = ChunkStore::new(Arc::new(BaseStore::create(&raw).unwrap()));
        let ctx = RequestContext::new();
        store.put(&ctx, &mut chunk(b"one-", 0, 3)).unwrap();
        store.put(&ctx, &mut chunk(b"two-", 1, 3)).unwrap();
        assert_eq!(store.put(&ctx, &mut chunk(b"three", 2, 3)).unwrap(), UploadPhase::Committed);
        assert_eq!(download(&store), b"one-two-three");
    }
}
