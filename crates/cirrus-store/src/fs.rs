//! Local filesystem backend.
//!
//! On-disk layout under the root directory:
//!
//! ```text
//! <root>/<container>/container.json           access level (JSON)
//! <root>/<container>/<name md5>/object.json   object name (JSON)
//! <root>/<container>/<name md5>/current       committed content
//! <root>/<container>/<name md5>/snapshots/<unix micros>
//! <root>/<container>/<name md5>/blocks/<hex block id>
//! ```
//!
//! Object directories are named by the hex MD5 of the object name, so names
//! up to the 1024-character limit map to a fixed-length path component. The
//! name itself lives in `object.json` and is checked on every access. Block
//! ids are hex-encoded. Every file is written to a temp file in the target
//! directory and renamed into place, so readers never observe a partial
//! write.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use cirrus_crypto::ContentDigest;
use cirrus_types::SnapshotTime;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::backend::{
    next_snapshot_time, BackendError, BackendErrorKind, BackendResult, BlobBackend, BlobListing,
    ContainerAccess,
};

const CONTAINER_META: &str = "container.json";
const OBJECT_META: &str = "object.json";
const CURRENT: &str = "current";
const SNAPSHOTS: &str = "snapshots";
const BLOCKS: &str = "blocks";

#[derive(Debug, Serialize, Deserialize)]
struct ContainerMeta {
    access: ContainerAccess,
}

#[derive(Debug, Serialize, Deserialize)]
struct ObjectMeta {
    name: String,
}

/// Blob backend storing containers as directories on the local disk.
pub struct LocalFsBackend {
    root: PathBuf,
    /// Serializes mutations; reads go straight to disk.
    write_lock: Mutex<()>,
}

impl LocalFsBackend {
    /// Open a backend rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> BackendResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!(root = %root.display(), "opened filesystem backend");
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Access level recorded for a container.
    pub fn container_access(&self, container: &str) -> BackendResult<ContainerAccess> {
        let raw = fs::read(self.container_dir(container)?.join(CONTAINER_META))?;
        let meta: ContainerMeta = serde_json::from_slice(&raw).map_err(|e| {
            BackendError::new(
                BackendErrorKind::InvalidResponse,
                format!("corrupt metadata for container {container}"),
            )
            .with_source(e)
        })?;
        Ok(meta.access)
    }

    /// Directory of an existing container.
    fn container_dir(&self, container: &str) -> BackendResult<PathBuf> {
        let dir = self.root.join(container);
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(BackendError::not_found(format!("container {container}")))
        }
    }

    /// Directory of `name` inside an existing container.
    ///
    /// Fails if the directory is already bound to a different name.
    fn object_dir(&self, container: &str, name: &str) -> BackendResult<PathBuf> {
        let dir = self.container_dir(container)?.join(object_dir_name(name));
        match read_object_meta(&dir)? {
            Some(meta) if meta.name != name => Err(BackendError::new(
                BackendErrorKind::Other,
                format!(
                    "object {container}/{name} collides with {container}/{}",
                    meta.name
                ),
            )),
            _ => Ok(dir),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().expect("lock poisoned")
    }
}

fn snapshot_file_name(time: SnapshotTime) -> String {
    time.timestamp_micros().to_string()
}

fn parse_snapshot_file_name(file_name: &str) -> Option<SnapshotTime> {
    file_name
        .parse::<i64>()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_micros)
}

fn object_dir_name(name: &str) -> String {
    ContentDigest::compute(name.as_bytes()).to_hex()
}

fn read_object_meta(object_dir: &Path) -> BackendResult<Option<ObjectMeta>> {
    let raw = match fs::read(object_dir.join(OBJECT_META)) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta = serde_json::from_slice(&raw).map_err(|e| {
        BackendError::new(
            BackendErrorKind::InvalidResponse,
            format!("corrupt object metadata in {}", object_dir.display()),
        )
        .with_source(e)
    })?;
    Ok(Some(meta))
}

/// Record `name` as the owner of `object_dir` before anything is written
/// there.
fn bind_object_dir(object_dir: &Path, name: &str) -> BackendResult<()> {
    if object_dir.join(OBJECT_META).is_file() {
        return Ok(());
    }
    let meta = serde_json::to_vec(&ObjectMeta {
        name: name.to_string(),
    })
    .map_err(|e| {
        BackendError::new(BackendErrorKind::Other, "cannot encode object metadata").with_source(e)
    })?;
    write_atomic(object_dir, OBJECT_META, &mut meta.as_slice())?;
    Ok(())
}

fn missing_object(container: &str, name: &str) -> BackendError {
    BackendError::not_found(format!("object {container}/{name}"))
}

/// Copy `content` into `dir/file_name` through a temp file and rename.
fn write_atomic(dir: &Path, file_name: &str, content: &mut dyn Read) -> BackendResult<u64> {
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    let written = io::copy(content, &mut tmp)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dir.join(file_name)).map_err(|e| e.error)?;
    Ok(written)
}

/// Snapshot files of an object, ascending by time.
fn list_snapshots(object_dir: &Path) -> BackendResult<Vec<(SnapshotTime, PathBuf)>> {
    let dir = object_dir.join(SNAPSHOTS);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut snapshots = Vec::new();
    for entry in fs::read_dir(&dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if let Some(time) = file_name.to_str().and_then(parse_snapshot_file_name) {
            snapshots.push((time, entry.path()));
        }
    }
    snapshots.sort_by_key(|(time, _)| *time);
    Ok(snapshots)
}

fn file_len(path: &Path) -> BackendResult<u64> {
    Ok(fs::metadata(path)?.len())
}

/// Remove an object directory once it holds nothing but its name.
fn prune_object_dir(object_dir: &Path) -> BackendResult<()> {
    for sub in [SNAPSHOTS, BLOCKS] {
        let dir = object_dir.join(sub);
        if dir.is_dir() && fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
    }
    if !object_dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(object_dir)? {
        if entry?.file_name() != OBJECT_META {
            return Ok(());
        }
    }
    fs::remove_dir_all(object_dir)?;
    Ok(())
}

impl BlobBackend for LocalFsBackend {
    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    fn create_container_if_absent(
        &self,
        container: &str,
        access: ContainerAccess,
    ) -> BackendResult<bool> {
        let _guard = self.lock();
        let dir = self.root.join(container);
        if dir.join(CONTAINER_META).is_file() {
            return Ok(false);
        }
        let meta = serde_json::to_vec_pretty(&ContainerMeta { access }).map_err(|e| {
            BackendError::new(BackendErrorKind::Other, "cannot encode container metadata")
                .with_source(e)
        })?;
        write_atomic(&dir, CONTAINER_META, &mut meta.as_slice())?;
        debug!(container, ?access, "created container");
        Ok(true)
    }

    fn object_exists(&self, container: &str, name: &str) -> BackendResult<bool> {
        Ok(self.object_dir(container, name)?.join(CURRENT).is_file())
    }

    fn put_object(
        &self,
        container: &str,
        name: &str,
        content: &mut dyn Read,
    ) -> BackendResult<u64> {
        let _guard = self.lock();
        let dir = self.object_dir(container, name)?;
        bind_object_dir(&dir, name)?;
        let written = write_atomic(&dir, CURRENT, content)?;
        let blocks = dir.join(BLOCKS);
        if blocks.is_dir() {
            fs::remove_dir_all(&blocks)?;
        }
        Ok(written)
    }

    fn get_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
        sink: &mut dyn Write,
    ) -> BackendResult<u64> {
        let dir = self.object_dir(container, name)?;
        let path = match snapshot {
            None => dir.join(CURRENT),
            Some(time) => dir.join(SNAPSHOTS).join(snapshot_file_name(time)),
        };
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(missing_object(container, name));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(io::copy(&mut file, sink)?)
    }

    fn open_read(&self, container: &str, name: &str) -> BackendResult<Box<dyn Read + Send>> {
        let path = self.object_dir(container, name)?.join(CURRENT);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(missing_object(container, name)),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_object(
        &self,
        container: &str,
        name: &str,
        snapshot: Option<SnapshotTime>,
    ) -> BackendResult<bool> {
        let _guard = self.lock();
        let dir = self.object_dir(container, name)?;
        match snapshot {
            None => {
                let existed = dir.join(CURRENT).is_file();
                if dir.is_dir() {
                    fs::remove_dir_all(&dir)?;
                }
                Ok(existed)
            }
            Some(time) => {
                let path = dir.join(SNAPSHOTS).join(snapshot_file_name(time));
                let existed = match fs::remove_file(&path) {
                    Ok(()) => true,
                    Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                    Err(e) => return Err(e.into()),
                };
                prune_object_dir(&dir)?;
                Ok(existed)
            }
        }
    }

    fn create_snapshot(&self, container: &str, name: &str) -> BackendResult<SnapshotTime> {
        let _guard = self.lock();
        let dir = self.object_dir(container, name)?;
        let current = dir.join(CURRENT);
        let mut source = match File::open(&current) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(missing_object(container, name));
            }
            Err(e) => return Err(e.into()),
        };
        let previous = list_snapshots(&dir)?.last().map(|(time, _)| *time);
        let time = next_snapshot_time(previous);
        write_atomic(&dir.join(SNAPSHOTS), &snapshot_file_name(time), &mut source)?;
        Ok(time)
    }

    fn put_block(
        &self,
        container: &str,
        name: &str,
        block_id: &str,
        content: &mut dyn Read,
        content_md5: &str,
    ) -> BackendResult<()> {
        let mut data = Vec::new();
        content.read_to_end(&mut data)?;
        if !ContentDigest::compute(&data).matches_base64(content_md5) {
            return Err(BackendError::new(
                BackendErrorKind::IntegrityMismatch,
                format!("block {block_id} of {container}/{name} does not match {content_md5}"),
            ));
        }
        let _guard = self.lock();
        let dir = self.object_dir(container, name)?;
        bind_object_dir(&dir, name)?;
        write_atomic(&dir.join(BLOCKS), &hex::encode(block_id), &mut data.as_slice())?;
        Ok(())
    }

    fn list_uncommitted_blocks(&self, container: &str, name: &str) -> BackendResult<Vec<String>> {
        let dir = self.object_dir(container, name)?.join(BLOCKS);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let decoded = entry
                .file_name()
                .to_str()
                .and_then(|f| hex::decode(f).ok())
                .and_then(|raw| String::from_utf8(raw).ok());
            // Temp files left by an interrupted write are skipped.
            if let Some(id) = decoded {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn commit_block_list(
        &self,
        container: &str,
        name: &str,
        block_ids: &[String],
    ) -> BackendResult<()> {
        let _guard = self.lock();
        let dir = self.object_dir(container, name)?;
        let blocks = dir.join(BLOCKS);

        bind_object_dir(&dir, name)?;
        let mut assembled = NamedTempFile::new_in(&dir)?;
        for id in block_ids {
            let mut block = match File::open(blocks.join(hex::encode(id))) {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(BackendError::new(
                        BackendErrorKind::InvalidResponse,
                        format!("block {id} is not staged for {container}/{name}"),
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            io::copy(&mut block, &mut assembled)?;
        }
        assembled.as_file().sync_all()?;
        assembled.persist(dir.join(CURRENT)).map_err(|e| e.error)?;
        if blocks.is_dir() {
            fs::remove_dir_all(&blocks)?;
        }
        Ok(())
    }

    fn list_blobs(
        &self,
        container: &str,
        include_snapshots: bool,
    ) -> BackendResult<Vec<BlobListing>> {
        let container_dir = self.container_dir(container)?;
        let mut objects = Vec::new();
        for entry in fs::read_dir(&container_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();
            if let Some(meta) = read_object_meta(&dir)? {
                objects.push((meta.name, dir));
            }
        }
        objects.sort();

        let mut listing = Vec::new();
        for (name, dir) in objects {
            if include_snapshots {
                for (time, path) in list_snapshots(&dir)? {
                    listing.push(BlobListing {
                        name: name.clone(),
                        snapshot: Some(time),
                        size: file_len(&path)?,
                    });
                }
            }
            let current = dir.join(CURRENT);
            if current.is_file() {
                listing.push(BlobListing {
                    name,
                    snapshot: None,
                    size: file_len(&current)?,
                });
            }
        }
        Ok(listing)
    }
}
