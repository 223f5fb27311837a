use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use std::sync::{Mutex, RwLock};

use cirrus_crypto::ContentDigest;
use cirrus_types::SnapshotTime;

use crate::backend::{
    next_snapshot_time, BackendError, BackendErrorKind, BackendResult, BlobBackend, BlobListing,
    ContainerAccess,
};

/// Backend calls, as recorded in the [`InMemoryBackend`] operation log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendOp {
    CreateContainer,
    ObjectExists,
    PutObject,
    GetObject,
    OpenRead,
    DeleteObject,
    CreateSnapshot,
    PutBlock,
    ListUncommittedBlocks,
    CommitBlockList,
    ListBlobs,
}

#[derive(Default)]
struct ObjectState {
    current: Option<Vec<u8>>,
    /// Ascending by time.
    snapshots: Vec<(SnapshotTime, Vec<u8>)>,
    staged: BTreeMap<String, Vec<u8>>,
}

impl ObjectState {
    fn is_empty(&self) -> bool {
        self.current.is_none() && self.snapshots.is_empty() && self.staged.is_empty()
    }
}

struct ContainerState {
    access: ContainerAccess,
    objects: BTreeMap<String, ObjectState>,
}

struct Fault {
    op: BackendOp,
    kind: BackendErrorKind,
    remaining: u32,
}

/// In-memory, HashMap-based blob backend.
///
/// Intended for tests and embedding. Besides storing data it records every
/// call it receives and can be told to fail specific operations, so it also
/// serves as the spy backend in store tests.
pub struct InMemoryBackend {
    containers: RwLock<HashMap<String, ContainerState>>,
    calls: Mutex<Vec<BackendOp>>,
    faults: Mutex<Vec<Fault>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            containers: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Vec::new()),
        }
    }

    /// Total number of backend calls received.
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("lock poisoned").len()
    }

    /// Every call received, in order.
    pub fn operations(&self) -> Vec<BackendOp> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Number of calls of one kind.
    pub fn count_of(&self, op: BackendOp) -> usize {
        self.calls
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|recorded| **recorded == op)
            .count()
    }

    /// Forget the recorded calls.
    pub fn reset_operations(&self) {
        self.calls.lock().expect("lock poisoned").clear();
    }

    /// Make the next `times` calls of `op` fail with `kind`.
    pub fn inject_failure(&self, op: BackendOp, kind: BackendErrorKind, times: u32) {
        self.faults.lock().expect("lock poisoned").push(Fault {
            op,
            kind,
            remaining: times,
        });
    }

    /// Ids of the blocks currently staged for an object.
    pub fn staged_block_ids(&self, container: &str, name: &str) -> Vec<String> {
        let map = self.containers.read().expect("lock poisoned");
        map.get(container)
            .and_then(|c| c.objects.get(name))
            .map(|o| o.staged.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Access level of a container, if it exists.
    pub fn container_access(&self, container: &str) -> Option<ContainerAccess> {
        let map = self.containers.read().expect("lock poisoned");
        map.get(container).map(|c| c.access)
    }

    fn record(&self, op: BackendOp) -> BackendResult<()> {
        self.calls.lock().expect("lock poisoned").push(op);
        let mut faults = self.faults.lock().expect("lock poisoned");
        if let Some(fault) = faults.iter_mut().find(|f| f.op == op && f.remaining > 0) {
            fault.remaining -= 1;
            let kind = fault.kind;
            faults.retain(|f| f.remaining > 0);
            return Err(BackendError::new(kind, format!("injected failure on {op:?}")));
        }
        Ok(())
    }

    fn with_object<T>(
        &self,
        container: &str,
        name: &str,
        f: impl FnOnce(&ObjectState) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let map = self.containers.read().expect("lock poisoned");
        let state = map
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        match state.objects.get(name) {
            Some(object) => f(object),
            None => f(&ObjectState::default()),
        }
    }

    fn with_object_mut<T>(
        &self,
        container: &str,
        name: &str,
        f: impl FnOnce(&mut ObjectState) -> BackendResult<T>,
    ) -> BackendResult<T> {
        let mut map = self.containers.write().expect("lock poisoned");
        let state = map
            .get_mut(container)
            .ok_or_else(|| missing_container(container))?;
        let object = state.objects.entry(name.to_string()).or_default();
        let result = f(&mut *object);
        if object.is_empty() {
            state.objects.remove(name);
        }
        result
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_container(container: &str) -> BackendError {
    BackendError::not_found(format!("container {container}"))
}

fn missing_object(container: &str, name: &str) -> BackendError {
    BackendError::not_found(format!("object {container}/{name}"))
}

fn read_all(content: &mut dyn Read) -> BackendResult<Vec<u8>> {
    let mut data = Vec::new();
    content.read_to_end(&mut data)?;
    Ok(data)
}

impl BlobBackend for InMemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> BackendResult<bool> {
        self.record(BackendOp::CreateContainer)?;
        let mut map = self.containers.write().expect("lock poisoned");
        if map.contains_key(container) {
            return Ok(false);
        }
        map.insert(
            container.to_string(),
            ContainerState {
                access,
                objects: BTreeMap::new(),
            },
        );
        Ok(true)
    }

    fn object_exists(&self, container: &str, name: &str) -> BackendResult<bool> {
        self.record(BackendOp::ObjectExists)?;
        let map = self.containers.read().expect("lock poisoned");
        Ok(map
            .get(container)
            .and_then(|c| c.objects.get(name))
            .is_some_and(|o| o.current.is_some()))
    }

    fn put_object(
        &self,
        container: &str,
        name: &str,
        content: &mut dyn Read,
    ) -> BackendResult<u64> {
        self.record(BackendOp::PutObject)?;
        let data = read_all(content)?;
        let len = data.len() as u64;
        self.with_object_mut(container, name, |object| {
            object.current = Some(data);
            object.staged.clear();
            Ok(len)
        })
    }

    fn get_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
        sink: &mut dyn Write,
    ) -> BackendResult<u64> {
        self.record(BackendOp::GetObject)?;
        self.with_object(container, name, |object| {
            let data = match snapshot {
                None => object.current.as_deref(),
                Some(time) => object
                    .snapshots
                    .iter()
                    .find(|(t, _)| *t == time)
                    .map(|(_, data)| data.as_slice()),
            }
            .ok_or_else(|| missing_object(container, name))?;
            sink.write_all(data)?;
            Ok(data.len() as u64)
        })
    }

    fn open_read(&self, container: &str, name: &str) -> BackendResult<Box<dyn Read + Send>> {
        self.record(BackendOp::OpenRead)?;
        self.with_object(container, name, |object| {
            let data = object
                .current
                .clone()
                .ok_or_else(|| missing_object(container, name))?;
            Ok(Box::new(Cursor::new(data)) as Box<dyn Read + Send>)
        })
    }

    fn delete_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
    ) -> BackendResult<bool> {
        self.record(BackendOp::DeleteObject)?;
        self.with_object_mut(container, name, |object| match snapshot {
            None => {
                let existed = object.current.is_some();
                *object = ObjectState::default();
                Ok(existed)
            }
            Some(time) => {
                let before = object.snapshots.len();
                object.snapshots.retain(|(t, _)| *t != time);
                Ok(object.snapshots.len() != before)
            }
        })
    }

    fn create_snapshot(&self, container: &str, name: &str) -> BackendResult<SnapshotTime> {
        self.record(BackendOp::CreateSnapshot)?;
        self.with_object_mut(container, name, |object| {
            let data = object
                .current
                .clone()
                .ok_or_else(|| missing_object(container, name))?;
            let time = next_snapshot_time(object.snapshots.last().map(|(t, _)| *t));
            object.snapshots.push((time, data));
            Ok(time)
        })
    }

    fn put_block(
        &self,
        container: &str,
        name: &str,
        block_id: &str,
        content: &mut dyn Read,
        content_md5: &str,
    ) -> BackendResult<()> {
        self.record(BackendOp::PutBlock)?;
        let data = read_all(content)?;
        if !ContentDigest::compute(&data).matches_base64(content_md5) {
            return Err(BackendError::new(
                BackendErrorKind::IntegrityMismatch,
                format!("block {block_id} of {container}/{name} does not match {content_md5}"),
            ));
        }
        self.with_object_mut(container, name, |object| {
            object.staged.insert(block_id.to_string(), data);
            Ok(())
        })
    }

    fn list_uncommitted_blocks(&self, container: &str, name: &str) -> BackendResult<Vec<String>> {
        self.record(BackendOp::ListUncommittedBlocks)?;
        self.with_object(container, name, |object| {
            Ok(object.staged.keys().cloned().collect())
        })
    }

    fn commit_block_list(
        &self,
        container: &str,
        name: &str,
        block_ids: &[String],
    ) -> BackendResult<()> {
        self.record(BackendOp::CommitBlockList)?;
        self.with_object_mut(container, name, |object| {
            let mut assembled = Vec::new();
            for id in block_ids {
                let block = object.staged.get(id).ok_or_else(|| {
                    BackendError::new(
                        BackendErrorKind::InvalidResponse,
                        format!("block {id} is not staged for {container}/{name}"),
                    )
                })?;
                assembled.extend_from_slice(block);
            }
            object.current = Some(assembled);
            object.staged.clear();
            Ok(())
        })
    }

    fn list_blobs(
        &self,
        container: &str,
        include_snapshots: bool,
    ) -> BackendResult<Vec<BlobListing>> {
        self.record(BackendOp::ListBlobs)?;
        let map = self.containers.read().expect("lock poisoned");
        let state = map
            .get(container)
            .ok_or_else(|| missing_container(container))?;
        let mut listing = Vec::new();
        for (name, object) in &state.objects {
            if include_snapshots {
                listing.extend(object.snapshots.iter().map(|(time, data)| BlobListing {
                    name: name.clone(),
                    snapshot: Some(*time),
                    size: data.len() as u64,
                }));
            }
            if let Some(data) = &object.current {
                listing.push(BlobListing {
                    name: name.clone(),
                    snapshot: None,
                    size: data.len() as u64,
                });
            }
        }
        Ok(listing)
    }
}
