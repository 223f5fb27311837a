//! [`BaseStore`]: validated, retried, error-mapped access to one backend.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use cirrus_crypto::{decode_block_id, encode_block_id, ContentDigest};
use cirrus_types::{
    validate_chunk_shape, BlobContent, BlobPayload, ChunkPayload, ObjectRef, SnapshotTime,
    VersionPayload,
};
use tracing::{debug, info};

use crate::backend::{BackendError, BackendErrorKind, BackendResult, BlobBackend, ContainerAccess};
use crate::config::{resolve_connection_string, ConfigProvider};
use crate::connection::ConnectionString;
use crate::error::{StoreError, StoreOp, StoreResult};
use crate::retry::RetryPolicy;

/// The base blob store.
///
/// Owns one backend handle for its whole lifetime and routes every backend
/// call through the retry policy. Every operation validates its object
/// reference first, so invalid input never reaches the backend, and ensures
/// the container exists (created private) before touching the object.
///
/// Holds no mutable state; a single instance can be shared across threads.
/// Calls against the same object are not coordinated.
pub struct BaseStore {
    backend: Arc<dyn BlobBackend>,
    retry: RetryPolicy,
}

impl BaseStore {
    /// Resolve a connection string into a store with its backend client.
    pub fn create(connection_string: &str) -> StoreResult<Self> {
        let connection: ConnectionString = connection_string.parse()?;
        let backend = connection.connect()?;
        info!(
            backend = backend.backend_name(),
            max_retries = connection.retry.max_retries(),
            "created blob store"
        );
        Ok(Self {
            backend,
            retry: connection.retry,
        })
    }

    /// Create a store from the connection string held by `provider`.
    pub fn from_config(provider: &dyn ConfigProvider) -> StoreResult<Self> {
        Self::create(&resolve_connection_string(provider)?)
    }

    /// Wrap an existing backend with the default retry policy.
    pub fn with_backend(backend: Arc<dyn BlobBackend>) -> Self {
        Self {
            backend,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Run `call` against the backend under the retry policy, after making
    /// sure the container exists. Failures are wrapped into `op`'s variant.
    fn call<T>(
        &self,
        op: StoreOp,
        object: &ObjectRef,
        mut call: impl FnMut(&dyn BlobBackend) -> BackendResult<T>,
    ) -> StoreResult<T> {
        let backend = self.backend.as_ref();
        self.retry
            .execute(&op.to_string(), || {
                backend.create_container_if_absent(&object.container, ContainerAccess::Private)?;
                call(backend)
            })
            .map_err(|e| StoreError::backend(op, object, e))
    }

    /// Upload the payload's content from its current position, rewinding to
    /// that position before every attempt.
    fn upload(&self, op: StoreOp, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        let object = &payload.object;
        let mut reader = payload.content.to_stream();
        let start = reader
            .stream_position()
            .map_err(|e| StoreError::backend(op, object, e.into()))?;
        self.call(op, object, |backend| {
            reader.seek(SeekFrom::Start(start))?;
            backend.put_object(&object.container, &object.name, &mut reader)
        })
    }

    /// Download into `content`, discarding partial output before each retry.
    fn download(
        &self,
        object: &ObjectRef,
        snapshot: Option<SnapshotTime>,
        content: &mut BlobContent<'_>,
    ) -> StoreResult<u64> {
        let wrap = |e: io::Error| StoreError::backend(StoreOp::Download, object, e.into());
        let mut sink = content.sink().map_err(wrap)?;
        self.call(StoreOp::Download, object, |backend| {
            sink.reset()?;
            backend.get_object(&object.container, &object.name, snapshot, &mut sink)
        })?;
        sink.finish().map_err(wrap)
    }

    // -----------------------------------------------------------------------
    // Whole objects
    // -----------------------------------------------------------------------

    /// Upload the content as the object's new current state, replacing any
    /// existing content. Returns the number of bytes stored.
    pub fn put(&self, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        payload.object.validate("put")?;
        let size = self.upload(StoreOp::Upload, payload)?;
        debug!(
            container = %payload.object.container,
            name = %payload.object.name,
            size,
            "put object"
        );
        Ok(size)
    }

    /// Snapshot the object's current state, then overwrite it with the
    /// payload. Returns the time of the snapshot holding the prior content.
    pub fn put_version(&self, payload: &mut BlobPayload<'_>) -> StoreResult<SnapshotTime> {
        payload.object.validate("put_version")?;
        let object = &payload.object;
        let snapshot = self.call(StoreOp::Snapshot, object, |backend| {
            backend.create_snapshot(&object.container, &object.name)
        })?;
        let size = self.upload(StoreOp::Snapshot, payload)?;
        debug!(
            container = %payload.object.container,
            name = %payload.object.name,
            %snapshot,
            size,
            "put new version"
        );
        Ok(snapshot)
    }

    /// Download the object's current content into the payload.
    pub fn get(&self, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        payload.object.validate("get")?;
        let size = self.download(&payload.object, None, &mut payload.content)?;
        debug!(
            container = %payload.object.container,
            name = %payload.object.name,
            size,
            "got object"
        );
        Ok(size)
    }

    /// Download the object as it was at `payload.snapshot_time`.
    pub fn get_version(&self, payload: &mut VersionPayload<'_>) -> StoreResult<u64> {
        let blob = &mut payload.blob;
        blob.object.validate("get_version")?;
        let size = self.download(&blob.object, Some(payload.snapshot_time), &mut blob.content)?;
        debug!(
            container = %blob.object.container,
            name = %blob.object.name,
            snapshot = %payload.snapshot_time,
            size,
            "got version"
        );
        Ok(size)
    }

    /// Delete the object together with its snapshots. Returns whether it
    /// existed.
    pub fn delete(&self, object: &ObjectRef) -> StoreResult<bool> {
        object.validate("delete")?;
        let deleted = self.call(StoreOp::Delete, object, |backend| {
            backend.delete_object(&object.container, &object.name, None)
        })?;
        debug!(container = %object.container, name = %object.name, deleted, "deleted object");
        Ok(deleted)
    }

    /// Delete one snapshot of the object. Returns whether it existed.
    pub fn delete_version(&self, object: &ObjectRef, snapshot: SnapshotTime) -> StoreResult<bool> {
        object.validate("delete_version")?;
        let deleted = self.call(StoreOp::Delete, object, |backend| {
            backend.delete_object(&object.container, &object.name, Some(snapshot))
        })?;
        debug!(
            container = %object.container,
            name = %object.name,
            %snapshot,
            deleted,
            "deleted version"
        );
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    /// Stage one chunk as an uncommitted block. Returns its block id.
    ///
    /// The block id is the base64 of the chunk index as 8 little-endian
    /// bytes, so re-uploading an index replaces the earlier block. The MD5 of
    /// the chunk travels with it for transport verification.
    pub fn put_block(&self, payload: &mut ChunkPayload<'_>) -> StoreResult<String> {
        payload.validate("put_block")?;
        let block_id = encode_block_id(payload.chunk_index);
        let object = &payload.blob.object;
        let mut reader = payload.blob.content.to_stream();

        let wrap = |e: io::Error| StoreError::backend(StoreOp::PutBlock, object, e.into());
        let start = reader.stream_position().map_err(wrap)?;
        let md5 = ContentDigest::from_reader(&mut reader).map_err(wrap)?.to_base64();

        self.call(StoreOp::PutBlock, object, |backend| {
            reader.seek(SeekFrom::Start(start))?;
            backend.put_block(&object.container, &object.name, &block_id, &mut reader, &md5)
        })?;
        debug!(
            container = %object.container,
            name = %object.name,
            chunk_index = payload.chunk_index,
            %block_id,
            %md5,
            "staged block"
        );
        Ok(block_id)
    }

    /// Commit the staged blocks `0..chunk_count` in index order as the
    /// object's content. Returns the committed block ids.
    ///
    /// Fails with [`StoreError::MissingBlocks`], without committing, unless
    /// every index in `0..chunk_count` is staged. Staged blocks beyond
    /// `chunk_count` are discarded by the commit.
    pub fn commit_blocks(&self, object: &ObjectRef, chunk_count: i32) -> StoreResult<Vec<String>> {
        object.validate("commit_blocks")?;
        validate_chunk_shape(0, chunk_count, "commit_blocks")?;

        let staged = self.call(StoreOp::Commit, object, |backend| {
            backend.list_uncommitted_blocks(&object.container, &object.name)
        })?;

        let mut indexed = Vec::with_capacity(staged.len());
        for block_id in staged {
            let index = decode_block_id(&block_id).map_err(|e| {
                let cause = BackendError::new(
                    BackendErrorKind::InvalidResponse,
                    format!("staged block id {block_id:?} is not a chunk index"),
                )
                .with_source(e);
                StoreError::backend(StoreOp::Commit, object, cause)
            })?;
            indexed.push((index, block_id));
        }
        indexed.sort_by_key(|(index, _)| *index);

        let count = i64::from(chunk_count);
        let mut ordered = Vec::with_capacity(indexed.len());
        for (index, block_id) in indexed.into_iter().filter(|(i, _)| (0..count).contains(i)) {
            let expected = ordered.len() as i64;
            if index != expected {
                return Err(StoreError::MissingBlocks {
                    name: object.name.clone(),
                    container: object.container.clone(),
                    expected,
                    found: Some(index),
                });
            }
            ordered.push(block_id);
        }
        if (ordered.len() as i64) < count {
            return Err(StoreError::MissingBlocks {
                name: object.name.clone(),
                container: object.container.clone(),
                expected: ordered.len() as i64,
                found: None,
            });
        }

        self.call(StoreOp::Commit, object, |backend| {
            backend.commit_block_list(&object.container, &object.name, &ordered)
        })?;
        info!(
            container = %object.container,
            name = %object.name,
            blocks = ordered.len(),
            "committed blocks"
        );
        Ok(ordered)
    }

    /// Open a stream over the object's committed content.
    pub fn block_stream(&self, object: &ObjectRef) -> StoreResult<Box<dyn Read + Send>> {
        object.validate("block_stream")?;
        self.call(StoreOp::Download, object, |backend| {
            backend.open_read(&object.container, &object.name)
        })
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Snapshot times of the object in backend listing order, or `None` if
    /// the object does not exist.
    pub fn versions(&self, object: &ObjectRef) -> StoreResult<Option<Vec<SnapshotTime>>> {
        object.validate("versions")?;
        let exists = self.call(StoreOp::List, object, |backend| {
            backend.object_exists(&object.container, &object.name)
        })?;
        if !exists {
            return Ok(None);
        }
        let listing = self.call(StoreOp::List, object, |backend| {
            backend.list_blobs(&object.container, true)
        })?;
        let snapshots: Vec<SnapshotTime> = listing
            .into_iter()
            .filter(|entry| entry.name == object.name)
            .filter_map(|entry| entry.snapshot)
            .collect();
        debug!(
            container = %object.container,
            name = %object.name,
            count = snapshots.len(),
            "listed versions"
        );
        Ok(Some(snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::memory::{BackendOp, InMemoryBackend};
    use std::collections::HashMap;
    use std::io::Cursor;
    use std::time::Duration;

    fn store() -> (Arc<InMemoryBackend>, BaseStore) {
        let backend = Arc::new(InMemoryBackend::new());
        let shared: Arc<dyn BlobBackend> = backend.clone();
        let store = BaseStore::with_backend(shared)
            .with_retry_policy(RetryPolicy::exponential(5, Duration::ZERO));
        (backend, store)
    }

    fn doc() -> ObjectRef {
        ObjectRef::new("sagelabs", "doc1")
    }

    fn read_back(store: &BaseStore, object: &ObjectRef) -> Vec<u8> {
        let mut payload = BlobPayload::empty(object.clone());
        store.get(&mut payload).unwrap();
        payload.as_bytes().unwrap().to_vec()
    }

    fn stage(store: &BaseStore, object: &ObjectRef, index: i64, count: i32, data: &[u8]) {
        let blob = BlobPayload::bytes(object.clone(), data.to_vec());
        let mut chunk = ChunkPayload::new(blob, index, count);
        store.put_block(&mut chunk).unwrap();
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn create_from_connection_string() {
        let store = BaseStore::create("Backend=memory;MaxRetries=1").unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert_eq!(store.retry_policy().max_retries(), 1);
    }

    #[test]
    fn create_rejects_bad_connection_string() {
        let err = BaseStore::create("Backend=carrier-pigeon").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn from_config_requires_connection_string() {
        let empty: HashMap<String, String> = HashMap::new();
        let err = BaseStore::from_config(&empty).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    // -----------------------------------------------------------------------
    // Whole objects
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get_text() {
        let (backend, store) = store();
        let mut payload = BlobPayload::text(doc(), "hello");
        assert_eq!(store.put(&mut payload).unwrap(), 5);
        assert_eq!(backend.container_access("sagelabs"), Some(ContainerAccess::Private));

        let mut out = BlobPayload::text(doc(), "");
        store.get(&mut out).unwrap();
        assert_eq!(out.as_text(), Some("hello"));
    }

    #[test]
    fn put_overwrites() {
        let (_backend, store) = store();
        store.put(&mut BlobPayload::text(doc(), "first")).unwrap();
        store.put(&mut BlobPayload::text(doc(), "second")).unwrap();
        assert_eq!(read_back(&store, &doc()), b"second");
    }

    #[test]
    fn put_from_stream_and_get_into_stream() {
        let (_backend, store) = store();
        let mut source = Cursor::new(b"streamed".to_vec());
        store.put(&mut BlobPayload::stream(doc(), &mut source)).unwrap();

        let mut dest = Cursor::new(Vec::new());
        store.get(&mut BlobPayload::stream(doc(), &mut dest)).unwrap();
        assert_eq!(dest.position(), 0);
        assert_eq!(dest.get_ref(), b"streamed");
    }

    #[test]
    fn get_missing_object_is_download_not_found() {
        let (_backend, store) = store();
        let err = store.get(&mut BlobPayload::empty(doc())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(err.is_not_found());
    }

    #[test]
    fn get_invalid_utf8_as_text_is_download_error() {
        let (_backend, store) = store();
        store.put(&mut BlobPayload::bytes(doc(), vec![0xff, 0xfe])).unwrap();
        let err = store.get(&mut BlobPayload::text(doc(), "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(!err.is_not_found());
    }

    #[test]
    fn delete_reports_existence() {
        let (_backend, store) = store();
        store.put(&mut BlobPayload::text(doc(), "x")).unwrap();
        assert!(store.delete(&doc()).unwrap());
        assert!(!store.delete(&doc()).unwrap());
        assert!(store.get(&mut BlobPayload::empty(doc())).unwrap_err().is_not_found());
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn invalid_names_never_reach_the_backend() {
        let (backend, store) = store();
        for object in [
            ObjectRef::new("sagelabs", ""),
            ObjectRef::new("sagelabs", "Upper"),
            ObjectRef::new("sagelabs", "a/b"),
            ObjectRef::new("ab", "doc1"),
            ObjectRef::new("Sage", "doc1"),
            ObjectRef::new("sage--labs", "doc1"),
            ObjectRef::new("-sagelabs", "doc1"),
            ObjectRef::new("sagelabs", "x".repeat(1025)),
        ] {
            let errors = [
                store.put(&mut BlobPayload::text(object.clone(), "x")).unwrap_err(),
                store.put_version(&mut BlobPayload::text(object.clone(), "x")).unwrap_err(),
                store.get(&mut BlobPayload::empty(object.clone())).unwrap_err(),
                store
                    .get_version(&mut VersionPayload::new(
                        BlobPayload::empty(object.clone()),
                        chrono::Utc::now(),
                    ))
                    .unwrap_err(),
                store.delete(&object).unwrap_err(),
                store.delete_version(&object, chrono::Utc::now()).unwrap_err(),
                store
                    .put_block(&mut ChunkPayload::new(BlobPayload::empty(object.clone()), 0, 1))
                    .unwrap_err(),
                store.commit_blocks(&object, 1).unwrap_err(),
                store.block_stream(&object).err().unwrap(),
                store.versions(&object).unwrap_err(),
            ];
            for err in errors {
                assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{object}: {err}");
            }
        }
        assert_eq!(backend.call_count(), 0);
    }

    #[test]
    fn invalid_chunk_shape_never_reaches_the_backend() {
        let (backend, store) = store();
        for (index, count) in [(0, 0), (-1, 2), (2, 2)] {
            let mut chunk = ChunkPayload::new(BlobPayload::text(doc(), "x"), index, count);
            let err = store.put_block(&mut chunk).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(store.commit_blocks(&doc(), 0).unwrap_err().kind(), ErrorKind::InvalidArgument);
        assert_eq!(backend.call_count(), 0);
    }

    // -----------------------------------------------------------------------
    // Blocks
    // -----------------------------------------------------------------------

    #[test]
    fn block_ids_encode_chunk_index() {
        let (backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        let mut chunk = ChunkPayload::new(BlobPayload::text(object.clone(), "a"), 1, 3);
        assert_eq!(store.put_block(&mut chunk).unwrap(), "AQAAAAAAAAA=");
        assert_eq!(backend.staged_block_ids("sagelabs", "big"), vec!["AQAAAAAAAAA="]);
    }

    #[test]
    fn commit_in_ascending_index_order() {
        let (backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        for (index, data) in [(3, "d"), (1, "b"), (0, "a"), (2, "c")] {
            stage(&store, &object, index, 4, data.as_bytes());
        }
        let committed = store.commit_blocks(&object, 4).unwrap();
        assert_eq!(committed, (0..4).map(encode_block_id).collect::<Vec<_>>());
        assert_eq!(read_back(&store, &object), b"abcd");
        assert_eq!(backend.count_of(BackendOp::CommitBlockList), 1);
    }

    #[test]
    fn gap_fails_without_commit() {
        let (backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        for index in [0, 1, 3] {
            stage(&store, &object, index, 4, b"x");
        }
        let err = store.commit_blocks(&object, 4).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingBlocks { expected: 2, found: Some(3), .. }
        ));
        assert_eq!(backend.count_of(BackendOp::CommitBlockList), 0);
        assert_eq!(backend.staged_block_ids("sagelabs", "big").len(), 3);
    }

    #[test]
    fn missing_tail_fails_without_commit() {
        let (backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        stage(&store, &object, 0, 3, b"x");
        stage(&store, &object, 1, 3, b"y");
        let err = store.commit_blocks(&object, 3).unwrap_err();
        assert!(matches!(
            err,
            StoreError::MissingBlocks { expected: 2, found: None, .. }
        ));
        assert_eq!(backend.count_of(BackendOp::CommitBlockList), 0);
    }

    #[test]
    fn blocks_beyond_count_are_discarded() {
        let (_backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        stage(&store, &object, 5, 6, b"stale");
        stage(&store, &object, 0, 2, b"he");
        stage(&store, &object, 1, 2, b"llo");
        assert_eq!(store.commit_blocks(&object, 2).unwrap().len(), 2);
        assert_eq!(read_back(&store, &object), b"hello");
    }

    #[test]
    fn undecodable_block_id_is_commit_error() {
        let (backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        stage(&store, &object, 0, 1, b"x");
        let md5 = ContentDigest::compute(b"y").to_base64();
        backend
            .put_block("sagelabs", "big", "not-a-block", &mut b"y".as_slice(), &md5)
            .unwrap();
        let err = store.commit_blocks(&object, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Commit);
        assert_eq!(backend.count_of(BackendOp::CommitBlockList), 0);
    }

    #[test]
    fn restaged_block_replaces_previous_content() {
        let (_backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        stage(&store, &object, 0, 2, b"aa");
        stage(&store, &object, 1, 2, b"old");
        stage(&store, &object, 1, 2, b"new");
        store.commit_blocks(&object, 2).unwrap();
        assert_eq!(read_back(&store, &object), b"aanew");
    }

    #[test]
    fn put_block_from_stream_position() {
        let (_backend, store) = store();
        let object = ObjectRef::new("sagelabs", "big");
        let mut source = Cursor::new(b"skip:payload".to_vec());
        source.seek(SeekFrom::Start(5)).unwrap();
        let mut chunk = ChunkPayload::new(BlobPayload::stream(object.clone(), &mut source), 0, 1);
        store.put_block(&mut chunk).unwrap();
        store.commit_blocks(&object, 1).unwrap();
        assert_eq!(read_back(&store, &object), b"payload");
    }

    #[test]
    fn block_stream_reads_committed_content() {
        let (_backend, store) = store();
        store.put(&mut BlobPayload::text(doc(), "whole")).unwrap();
        let mut out = String::new();
        store.block_stream(&doc()).unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "whole");
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    #[test]
    fn versions_of_missing_object_is_none() {
        let (_backend, store) = store();
        assert_eq!(store.versions(&doc()).unwrap(), None);
    }

    #[test]
    fn put_version_keeps_prior_content() {
        let (_backend, store) = store();
        store.put(&mut BlobPayload::text(doc(), "v1")).unwrap();
        assert_eq!(store.versions(&doc()).unwrap(), Some(vec![]));

        let snapshot = store.put_version(&mut BlobPayload::text(doc(), "v2")).unwrap();
        assert_eq!(store.versions(&doc()).unwrap(), Some(vec![snapshot]));
        assert_eq!(read_back(&store, &doc()), b"v2");

        let mut old = VersionPayload::new(BlobPayload::text(doc(), ""), snapshot);
        store.get_version(&mut old).unwrap();
        assert_eq!(old.blob.as_text(), Some("v1"));

        assert!(store.delete_version(&doc(), snapshot).unwrap());
        assert!(!store.delete_version(&doc(), snapshot).unwrap());
        assert_eq!(store.versions(&doc()).unwrap(), Some(vec![]));
    }

    #[test]
    fn versions_ignore_other_objects() {
        let (_backend, store) = store();
        let other = ObjectRef::new("sagelabs", "doc2");
        store.put(&mut BlobPayload::text(doc(), "a")).unwrap();
        store.put(&mut BlobPayload::text(other.clone(), "b")).unwrap();
        store.put_version(&mut BlobPayload::text(other.clone(), "c")).unwrap();
        assert_eq!(store.versions(&doc()).unwrap(), Some(vec![]));
        assert_eq!(store.versions(&other).unwrap().map(|v| v.len()), Some(1));
    }

    #[test]
    fn put_version_of_missing_object_is_snapshot_error() {
        let (_backend, store) = store();
        let err = store.put_version(&mut BlobPayload::text(doc(), "x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Snapshot);
        assert!(err.is_not_found());
    }

    // -----------------------------------------------------------------------
    // Retries
    // -----------------------------------------------------------------------

    #[test]
    fn transient_failures_are_retried() {
        let (backend, store) = store();
        backend.inject_failure(BackendOp::PutObject, BackendErrorKind::Unavailable, 2);
        store.put(&mut BlobPayload::text(doc(), "hello")).unwrap();
        assert_eq!(backend.count_of(BackendOp::PutObject), 3);
        assert_eq!(read_back(&store, &doc()), b"hello");
    }

    #[test]
    fn exhausted_retries_surface_as_transient() {
        let (backend, store) = store();
        backend.inject_failure(BackendOp::GetObject, BackendErrorKind::Timeout, 100);
        let err = store.get(&mut BlobPayload::empty(doc())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
        assert!(err.is_transient());
        assert_eq!(backend.count_of(BackendOp::GetObject), 6);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let (backend, store) = store();
        backend.inject_failure(BackendOp::DeleteObject, BackendErrorKind::Other, 1);
        let err = store.delete(&doc()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Delete);
        assert_eq!(backend.count_of(BackendOp::DeleteObject), 1);
    }
}
