//! The ratings document: one JSON object in the bucket holding every rating.
//!
//! Reads and writes always cover the whole document. Appends go through a
//! read-modify-write loop whose write is conditional on the version that was
//! read, so two concurrent submissions cannot silently drop each other.

use crate::{
    models::rating::{RatingRecord, RatingValue, RatingsDocument},
    services::object_store::{ETag, ObjectStore, PutCondition, StoreError},
};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

pub const DEFAULT_RATINGS_KEY: &str = "ratings.json";
pub const DEFAULT_WRITE_ATTEMPTS: usize = 5;
const CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Debug)]
pub struct RatingsOptions {
    /// Object key of the ratings document.
    pub key: String,
    /// Read-modify-write attempts before giving up on a contended document.
    pub write_attempts: usize,
    /// Guard writes with the version that was read. Disable only for stores
    /// without conditional put support; concurrent appends can then be lost.
    pub conditional_writes: bool,
}

impl Default for RatingsOptions {
    fn default() -> Self {
        Self {
            key: DEFAULT_RATINGS_KEY.to_string(),
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
            conditional_writes: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum RatingsError {
    #[error("reading ratings document `{key}` failed: {source}")]
    Read {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("ratings document `{key}` is not valid JSON: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("encoding ratings document failed: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("writing ratings document `{key}` failed: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("ratings document `{key}` changed concurrently on each of {attempts} attempts")]
    Contention { key: String, attempts: usize },
}

/// Whether a ratings document existed when it was read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentState {
    /// Nothing stored yet; the document starts out empty.
    Absent,
    /// Stored at the given version (if the store reports one).
    Present { etag: Option<ETag> },
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    pub document: RatingsDocument,
    pub state: DocumentState,
}

#[derive(Clone)]
pub struct RatingsRepository {
    store: Arc<dyn ObjectStore>,
    options: RatingsOptions,
}

impl RatingsRepository {
    pub fn new(store: Arc<dyn ObjectStore>, options: RatingsOptions) -> Self {
        Self { store, options }
    }

    pub fn key(&self) -> &str {
        &self.options.key
    }

    /// Read the document, telling a missing document apart from a failed read.
    pub async fn fetch(&self) -> Result<Snapshot, RatingsError> {
        let key = &self.options.key;
        let stored = self.store.get(key).await.map_err(|source| RatingsError::Read {
            key: key.clone(),
            source,
        })?;

        let Some(object) = stored else {
            debug!(key = %key, "no ratings document yet");
            return Ok(Snapshot {
                document: RatingsDocument::default(),
                state: DocumentState::Absent,
            });
        };

        let document: RatingsDocument =
            serde_json::from_slice(&object.body).map_err(|source| RatingsError::Decode {
                key: key.clone(),
                source,
            })?;
        debug!(key = %key, images = document.len(), "loaded ratings document");

        Ok(Snapshot {
            document,
            state: DocumentState::Present { etag: object.etag },
        })
    }

    /// Read the document, treating any failure as an empty document.
    ///
    /// Request paths use the strict [`fetch`](Self::fetch); this lenient read
    /// is kept for callers that prefer a stale view over an error.
    #[allow(dead_code)]
    pub async fn get_all(&self) -> RatingsDocument {
        match self.fetch().await {
            Ok(snapshot) => snapshot.document,
            Err(err) => {
                warn!(key = %self.options.key, error = %err, "falling back to empty ratings");
                RatingsDocument::default()
            }
        }
    }

    /// Overwrite the stored document with `document`.
    ///
    /// No version check: `record_rating` is the concurrency-safe write path.
    #[allow(dead_code)]
    pub async fn save(&self, document: &RatingsDocument) -> Result<(), RatingsError> {
        self.write(document, PutCondition::Overwrite).await
    }

    /// Append `rating` to `image_id`'s record and persist the whole document.
    ///
    /// Returns the record as written.
    pub async fn record_rating(
        &self,
        image_id: &str,
        rating: RatingValue,
    ) -> Result<RatingRecord, RatingsError> {
        let attempts = self.options.write_attempts.max(1);

        for attempt in 1..=attempts {
            let Snapshot {
                mut document,
                state,
            } = self.fetch().await?;

            let record = document.append(image_id, rating.clone()).clone();
            let condition = self.condition_for(&state);

            match self.write(&document, condition).await {
                Ok(()) => {
                    info!(
                        image_id,
                        count = record.ratings.len(),
                        attempt,
                        "rating recorded"
                    );
                    return Ok(record);
                }
                Err(RatingsError::Write {
                    source: StoreError::PreconditionFailed { .. },
                    ..
                }) => {
                    debug!(image_id, attempt, "ratings document changed underneath us, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        warn!(image_id, attempts, "giving up on contended ratings document");
        Err(RatingsError::Contention {
            key: self.options.key.clone(),
            attempts,
        })
    }

    fn condition_for(&self, state: &DocumentState) -> PutCondition {
        if !self.options.conditional_writes {
            return PutCondition::Overwrite;
        }
        match state {
            DocumentState::Absent => PutCondition::IfNoneMatch,
            DocumentState::Present { etag: Some(etag) } => PutCondition::IfMatch(etag.clone()),
            DocumentState::Present { etag: None } => {
                warn!(key = %self.options.key, "store gave no version for ratings document; overwriting");
                PutCondition::Overwrite
            }
        }
    }

    async fn write(
        &self,
        document: &RatingsDocument,
        condition: PutCondition,
    ) -> Result<(), RatingsError> {
        let key = &self.options.key;
        let body = serde_json::to_vec_pretty(document).map_err(RatingsError::Encode)?;

        match self
            .store
            .put(key, Bytes::from(body), CONTENT_TYPE, condition)
            .await
        {
            Ok(_) => Ok(()),
            Err(source @ StoreError::PreconditionFailed { .. }) => Err(RatingsError::Write {
                key: key.clone(),
                source,
            }),
            Err(source) => {
                error!(key = %key, error = %source, "saving ratings document failed");
                Err(RatingsError::Write {
                    key: key.clone(),
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        memory_store::MemoryStore,
        object_store::{ObjectPage, StoreResult, StoredObject},
        test_support::FailingStore,
    };
    use async_trait::async_trait;
    use serde_json::{Number, json};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn repository(store: Arc<dyn ObjectStore>) -> RatingsRepository {
        RatingsRepository::new(store, RatingsOptions::default())
    }

    /// Lets a rival writer append to the document right before the first put
    /// goes through, as if another instance handled a request concurrently.
    struct RacingStore {
        inner: Arc<MemoryStore>,
        raced: AtomicBool,
    }

    impl RacingStore {
        fn new(inner: Arc<MemoryStore>) -> Self {
            Self {
                inner,
                raced: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for RacingStore {
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
            if !self.raced.swap(true, Ordering::SeqCst) {
                let rival = repository(self.inner.clone());
                rival
                    .record_rating("rival.jpg", Number::from(1))
                    .await
                    .expect("rival write");
            }
            self.inner.put(key, body, content_type, condition).await
        }

        async fn list_page(
            &self,
            prefix: Option<&str>,
            continuation: Option<&str>,
            max_keys: usize,
        ) -> StoreResult<ObjectPage> {
            self.inner.list_page(prefix, continuation, max_keys).await
        }

        fn name(&self) -> &'static str {
            "racing"
        }
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty() {
        let repo = repository(Arc::new(MemoryStore::new()));

        assert!(repo.get_all().await.images.is_empty());
        let snapshot = repo.fetch().await.unwrap();
        assert_eq!(snapshot.state, DocumentState::Absent);
    }

    #[tokio::test]
    async fn save_then_get_all_round_trips() {
        let repo = repository(Arc::new(MemoryStore::new()));
        let mut doc = RatingsDocument::default();
        doc.append("a.jpg", Number::from(3));
        doc.append("b.jpg", Number::from(0));

        repo.save(&doc).await.unwrap();
        assert_eq!(repo.get_all().await, doc);
    }

    #[tokio::test]
    async fn stored_document_is_pretty_printed() {
        let store = Arc::new(MemoryStore::new());
        let repo = repository(store.clone());
        repo.record_rating("a.jpg", Number::from(4)).await.unwrap();

        let stored = store.get(DEFAULT_RATINGS_KEY).await.unwrap().unwrap();
        let text = String::from_utf8(stored.body.to_vec()).unwrap();
        assert!(text.contains("\n  \"a.jpg\": {"));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({ "a.jpg": { "ratings": [4] } }));
    }

    #[tokio::test]
    async fn ratings_append_in_order() {
        let repo = repository(Arc::new(MemoryStore::new()));

        repo.record_rating("a.jpg", Number::from(4)).await.unwrap();
        let record = repo.record_rating("a.jpg", Number::from(2)).await.unwrap();

        assert_eq!(record.ratings, vec![Number::from(4), Number::from(2)]);
        assert_eq!(repo.get_all().await.images.get("a.jpg"), Some(&record));
    }

    #[tokio::test]
    async fn concurrent_writer_does_not_lose_ratings() {
        let inner = Arc::new(MemoryStore::new());
        let repo = repository(Arc::new(RacingStore::new(inner.clone())));

        repo.record_rating("mine.jpg", Number::from(5)).await.unwrap();

        let doc = repository(inner).get_all().await;
        assert!(doc.is_rated("mine.jpg"));
        assert!(doc.is_rated("rival.jpg"));
    }

    #[tokio::test]
    async fn unconditional_writes_can_lose_a_concurrent_rating() {
        let inner = Arc::new(MemoryStore::new());
        let options = RatingsOptions {
            conditional_writes: false,
            ..RatingsOptions::default()
        };
        let repo = RatingsRepository::new(Arc::new(RacingStore::new(inner.clone())), options);

        repo.record_rating("mine.jpg", Number::from(5)).await.unwrap();

        let doc = repository(inner).get_all().await;
        assert!(doc.is_rated("mine.jpg"));
        assert!(!doc.is_rated("rival.jpg"));
    }

    #[tokio::test]
    async fn exhausted_attempts_report_contention() {
        let inner = Arc::new(MemoryStore::new());
        let options = RatingsOptions {
            write_attempts: 1,
            ..RatingsOptions::default()
        };
        let repo = RatingsRepository::new(Arc::new(RacingStore::new(inner)), options);

        let err = repo
            .record_rating("mine.jpg", Number::from(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RatingsError::Contention { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn corrupt_document_is_not_overwritten() {
        let store = Arc::new(MemoryStore::new());
        store.insert(DEFAULT_RATINGS_KEY, "{ not json").await;
        let repo = repository(store.clone());

        assert!(repo.get_all().await.images.is_empty());
        let err = repo
            .record_rating("a.jpg", Number::from(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RatingsError::Decode { .. }));

        let stored = store.get(DEFAULT_RATINGS_KEY).await.unwrap().unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"{ not json"));
    }

    #[tokio::test]
    async fn storage_failures_are_surfaced() {
        let repo = repository(Arc::new(FailingStore));

        assert!(repo.get_all().await.images.is_empty());
        assert!(matches!(
            repo.fetch().await.unwrap_err(),
            RatingsError::Read { .. }
        ));
        assert!(matches!(
            repo.save(&RatingsDocument::default()).await.unwrap_err(),
            RatingsError::Write { .. }
        ));
    }
}
