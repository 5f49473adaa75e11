//! Object store abstraction consumed by the listing, ratings and readiness code.
//!
//! The bucket is treated as a flat key/value blob store with three operations:
//! get-by-key, put-by-key (optionally guarded by a version token) and a
//! paginated key listing driven by an opaque continuation cursor.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Opaque version token handed out by the store for an object body.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object body together with the version it was read at.
#[derive(Clone, Debug)]
pub struct StoredObject {
    pub body: Bytes,
    pub etag: Option<ETag>,
}

/// Precondition attached to a put.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PutCondition {
    /// Replace whatever is stored.
    Overwrite,
    /// Only write if the stored object still carries this version.
    IfMatch(ETag),
    /// Only write if no object exists under the key.
    IfNoneMatch,
}

/// One page of a key listing.
#[derive(Clone, Debug, Default)]
pub struct ObjectPage {
    pub keys: Vec<String>,
    /// Cursor for the next page; `None` once the listing is exhausted.
    pub next_continuation: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("precondition failed writing `{key}`")]
    PreconditionFailed { key: String },
    #[error("get `{key}` failed: {message}")]
    Get { key: String, message: String },
    #[error("put `{key}` failed: {message}")]
    Put { key: String, message: String },
    #[error("list failed: {0}")]
    List(String),
    #[error("reading body of `{key}` failed: {message}")]
    Body { key: String, message: String },
    #[error("client error: {0}")]
    Client(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    /// Fetch an object. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return the version the store assigned to it.
    async fn put(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        condition: PutCondition,
    ) -> StoreResult<Option<ETag>>;

    /// List at most `max_keys` keys in lexicographic order, resuming after
    /// `continuation` when given.
    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ObjectPage>;

    fn name(&self) -> &'static str;
}
