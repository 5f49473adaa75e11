use crate::services::{
    memory_store::MemoryStore,
    object_store::{
        ETag, ObjectPage, ObjectStore, PutCondition, StoreError, StoreResult, StoredObject,
    },
};
use async_trait::async_trait;
use bytes::Bytes;

/// A store whose every call fails, standing in for an unreachable bucket.
pub struct FailingStore;

#[async_trait]
impl ObjectStore for FailingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        Err(StoreError::Get {
            key: key.to_string(),
            message: "connection refused".into(),
        })
    }

    async fn put(
        &self,
        key: &str,
        _body: Bytes,
        _content_type: &str,
        _condition: PutCondition,
    ) -> StoreResult<Option<ETag>> {
        Err(StoreError::Put {
            key: key.to_string(),
            message: "connection refused".into(),
        })
    }

    async fn list_page(
        &self,
        _prefix: Option<&str>,
        _continuation: Option<&str>,
        _max_keys: usize,
    ) -> StoreResult<ObjectPage> {
        Err(StoreError::List("connection refused".into()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Reads and writes succeed but listing fails the way S3 does when it reports a
/// truncated page without handing back a continuation token.
#[derive(Default)]
pub struct UnlistableStore {
    inner: MemoryStore,
}

#[async_trait]
impl ObjectStore for UnlistableStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        self.inner.get(key).await
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> StoreResult<Option<ETag>> {
        self.inner.put(key, body, content_type, condition).await
    }

    async fn list_page(
        &self,
        _prefix: Option<&str>,
        _continuation: Option<&str>,
        _max_keys: usize,
    ) -> StoreResult<ObjectPage> {
        Err(StoreError::List(
            "truncated listing without continuation token".into(),
        ))
    }

    fn name(&self) -> &'static str {
        "unlistable"
    }
}
