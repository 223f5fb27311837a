use std::sync::Arc;

use cirrus_store::{BaseStore, ConfigProvider, StoreResult};
use cirrus_types::{BlobPayload, ObjectRef, RequestContext};

use crate::request_span;

/// Whole-object blob store.
#[derive(Clone)]
pub struct BlobStore {
    base: Arc<BaseStore>,
}

impl BlobStore {
    pub fn new(base: Arc<BaseStore>) -> Self {
        Self { base }
    }

    pub fn from_config(provider: &dyn ConfigProvider) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(BaseStore::from_config(provider)?)))
    }

    pub fn base(&self) -> &Arc<BaseStore> {
        &self.base
    }

    /// Store the payload's content, replacing the object.
    pub fn put(&self, ctx: &RequestContext, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        let _span = request_span("put", ctx, &payload.object).entered();
        self.base.put(payload)
    }

    /// Read the object into the payload's content.
    pub fn get(&self, ctx: &RequestContext, payload: &mut BlobPayload<'_>) -> StoreResult<u64> {
        let _span = request_span("get", ctx, &payload.object).entered();
        self.base.get(payload)
    }

    /// Delete the object. Returns whether it existed.
    pub fn delete(&self, ctx: &RequestContext, object: &ObjectRef) -> StoreResult<bool> {
        let _span = request_span("delete", ctx, object).entered();
        self.base.delete(object)
    }
}
