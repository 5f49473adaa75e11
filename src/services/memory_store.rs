//! In-process bucket used by `--backend memory` and by the tests.
//!
//! Keys are kept in a `BTreeMap` so listings come back in lexicographic order,
//! the way ListObjectsV2 returns them. Continuation cursors are the base64
//! encoded last key of the previous page and ETags are MD5 digests of the body.

use crate::services::object_store::{
    ETag, ObjectPage, ObjectStore, PutCondition, StoreError, StoreResult, StoredObject,
};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use std::{collections::BTreeMap, ops::Bound};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone, Debug)]
struct Entry {
    body: Bytes,
    etag: ETag,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, Entry>>,
    /// Caps the page size regardless of what callers ask for.
    page_limit: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that never returns more than `page_limit` keys per page.
    #[cfg(test)]
    pub fn with_page_limit(page_limit: usize) -> Self {
        Self {
            objects: RwLock::default(),
            page_limit: Some(page_limit.max(1)),
        }
    }

    /// Seed an object directly, bypassing preconditions.
    pub async fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        let body = body.into();
        let etag = compute_etag(&body);
        self.objects
            .write()
            .await
            .insert(key.into(), Entry { body, etag });
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredObject>> {
        let objects = self.objects.read().await;
        Ok(objects.get(key).map(|entry| StoredObject {
            body: entry.body.clone(),
            etag: Some(entry.etag.clone()),
        }))
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
        condition: PutCondition,
    ) -> StoreResult<Option<ETag>> {
        let mut objects = self.objects.write().await;
        let current = objects.get(key).map(|entry| &entry.etag);

        let allowed = match (&condition, current) {
            (PutCondition::Overwrite, _) => true,
            (PutCondition::IfMatch(expected), Some(actual)) => expected == actual,
            (PutCondition::IfMatch(_), None) => false,
            (PutCondition::IfNoneMatch, existing) => existing.is_none(),
        };
        if !allowed {
            debug!(key, ?condition, "memory store rejected conditional put");
            return Err(StoreError::PreconditionFailed {
                key: key.to_string(),
            });
        }

        let etag = compute_etag(&body);
        objects.insert(
            key.to_string(),
            Entry {
                body,
                etag: etag.clone(),
            },
        );
        Ok(Some(etag))
    }

    async fn list_page(
        &self,
        prefix: Option<&str>,
        continuation: Option<&str>,
        max_keys: usize,
    ) -> StoreResult<ObjectPage> {
        let mut max_keys = max_keys.clamp(1, 1000);
        if let Some(limit) = self.page_limit {
            max_keys = max_keys.min(limit);
        }

        let start = match continuation {
            Some(token) => Bound::Excluded(decode_continuation_token(token)?),
            None => Bound::Unbounded,
        };

        let objects = self.objects.read().await;
        let mut matching = objects
            .range::<String, _>((start, Bound::Unbounded))
            .map(|(key, _)| key)
            .filter(|key| prefix.is_none_or(|p| key.starts_with(p)));

        let keys: Vec<String> = matching.by_ref().take(max_keys).cloned().collect();
        let is_truncated = matching.next().is_some();

        let next_continuation = match keys.last() {
            Some(last) if is_truncated => Some(encode_continuation_token(last)),
            _ => None,
        };

        Ok(ObjectPage {
            keys,
            next_continuation,
        })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn compute_etag(body: &[u8]) -> ETag {
    ETag::new(format!("{:x}", md5::compute(body)))
}

fn encode_continuation_token(key: &str) -> String {
    general_purpose::STANDARD.encode(key)
}

fn decode_continuation_token(token: &str) -> StoreResult<String> {
    general_purpose::STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| StoreError::List(format!("malformed continuation token `{token}`")))
}
