//! Snapshot-backed object versions.
//!
//! Versions of an object are the backend's snapshots of it. Version numbers
//! are assigned 1..=N in the order the backend lists the snapshots and are
//! recomputed on every call; they are only as stable as that order.

use std::mem;
use std::sync::Arc;

use cirrus_store::{BaseStore, ConfigProvider, StoreError, StoreResult};
use cirrus_types::{
    BlobPayload, ObjectRef, RequestContext, SnapshotTime, VersionInfo, VersionPayload,
};
use tracing::debug;

use crate::request_span;

/// How [`VersionStore::put`] stored the content.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutOutcome {
    /// The object did not exist and was created.
    Created,
    /// The prior content was kept as a snapshot taken at this time.
    Versioned(SnapshotTime),
}

/// Blob store that keeps every overwritten state as a version.
#[derive(Clone)]
pub struct VersionStore {
    base: Arc<BaseStore>,
}

impl VersionStore {
    pub fn new(base: Arc<BaseStore>) -> Self {
        Self { base }
    }

    pub fn from_config(provider: &dyn ConfigProvider) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(BaseStore::from_config(provider)?)))
    }

    pub fn base(&self) -> &Arc<BaseStore> {
        &self.base
    }

    /// Store the content, snapshotting the current state first if the object
    /// already exists.
    ///
    /// The existence check and the write are separate backend calls. Two
    /// concurrent puts to the same object may both take the same branch, and
    /// the backend's last write wins. Callers needing a single writer must
    /// serialize externally.
    pub fn put(
        &self,
        ctx: &RequestContext,
        payload: &mut BlobPayload<'_>,
    ) -> StoreResult<PutOutcome> {
        let _span = request_span("version_put", ctx, &payload.object).entered();
        let outcome = match self.base.versions(&payload.object)? {
            Some(_) => PutOutcome::Versioned(self.base.put_version(payload)?),
            None => {
                self.base.put(payload)?;
                PutOutcome::Created
            }
        };
        debug!(?outcome, "stored version");
        Ok(outcome)
    }

    /// Read the object as it was at `payload.snapshot_time`.
    pub fn get(&self, ctx: &RequestContext, payload: &mut VersionPayload<'_>) -> StoreResult<u64> {
        let _span = request_span("version_get", ctx, &payload.blob.object).entered();
        self.base.get_version(payload)
    }

    /// Delete one version. Returns whether it existed.
    pub fn delete(
        &self,
        ctx: &RequestContext,
        object: &ObjectRef,
        snapshot: SnapshotTime,
    ) -> StoreResult<bool> {
        let _span = request_span("version_delete", ctx, object).entered();
        self.base.delete_version(object, snapshot)
    }

    /// The object's versions, numbered from 1 in listing order.
    ///
    /// Fails with [`StoreError::NotFound`] if the object does not exist. An
    /// object that was never overwritten has no versions.
    pub fn get_version_info(
        &self,
        ctx: &RequestContext,
        object: &ObjectRef,
    ) -> StoreResult<Vec<VersionInfo>> {
        let _span = request_span("version_info", ctx, object).entered();
        self.version_info(object)
    }

    /// Read version `version_number` (1-based) into the payload. Returns the
    /// version that was read.
    pub fn get_by_number(
        &self,
        ctx: &RequestContext,
        payload: &mut BlobPayload<'_>,
        version_number: u32,
    ) -> StoreResult<VersionInfo> {
        let _span = request_span("version_get_by_number", ctx, &payload.object).entered();
        let info = self.resolve(&payload.object, version_number)?;

        let blob = BlobPayload::new(payload.object.clone(), mem::take(&mut payload.content));
        let mut version = VersionPayload::new(blob, info.snapshot_time);
        let result = self.base.get_version(&mut version);
        payload.content = version.blob.content;
        result.map(|_| info)
    }

    /// Delete version `version_number` (1-based). Returns the deleted
    /// version.
    pub fn delete_by_number(
        &self,
        ctx: &RequestContext,
        object: &ObjectRef,
        version_number: u32,
    ) -> StoreResult<VersionInfo> {
        let _span = request_span("version_delete_by_number", ctx, object).entered();
        let info = self.resolve(object, version_number)?;
        if !self.base.delete_version(object, info.snapshot_time)? {
            return Err(StoreError::not_found(object));
        }
        Ok(info)
    }

    fn version_info(&self, object: &ObjectRef) -> StoreResult<Vec<VersionInfo>> {
        let snapshots = self
            .base
            .versions(object)?
            .ok_or_else(|| StoreError::not_found(object))?;
        Ok(VersionInfo::enumerate(snapshots))
    }

    fn resolve(&self, object: &ObjectRef, version_number: u32) -> StoreResult<VersionInfo> {
        self.version_info(object)?
            .into_iter()
            .find(|info| info.version_number == version_number)
            .ok_or_else(|| StoreError::not_found(object))
    }
}
