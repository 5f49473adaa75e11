//! Enumerates every key in the bucket by following continuation cursors.
//!
//! `KeyLister::keys` is lazy: it requests the next page only once the previous
//! one has been consumed, so at most one page of the listing is in flight.

use crate::services::object_store::{ObjectStore, StoreError};
use futures::{Stream, StreamExt, TryStreamExt, future, stream};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PAGE_SIZE: usize = 1000;
pub const DEFAULT_MAX_PAGES: usize = 10_000;

#[derive(Clone, Debug)]
pub struct ListingOptions {
    pub prefix: Option<String>,
    /// Keys requested per page, clamped to 1..=1000.
    pub page_size: usize,
    /// Hard stop for stores that keep handing out cursors.
    pub max_pages: usize,
    /// Keys that live in the bucket but are never images (the ratings document).
    pub excluded_keys: Vec<String>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            prefix: None,
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            excluded_keys: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ListingError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("listing did not finish within {max_pages} pages")]
    PageLimitExceeded { max_pages: usize },
    #[error("store returned continuation cursor `{cursor}` twice (after {pages} pages)")]
    RepeatedCursor { cursor: String, pages: usize },
}

#[derive(Default)]
struct PageState {
    cursor: Option<String>,
    pages: usize,
    done: bool,
    seen_cursors: HashSet<String>,
}

#[derive(Clone)]
pub struct KeyLister {
    store: Arc<dyn ObjectStore>,
    options: ListingOptions,
}

impl KeyLister {
    pub fn new(store: Arc<dyn ObjectStore>, options: ListingOptions) -> Self {
        Self { store, options }
    }

    /// Raw pages as returned by the store, in order.
    pub fn pages(&self) -> impl Stream<Item = Result<Vec<String>, ListingError>> + Send + 'static {
        let store = self.store.clone();
        let prefix = self.options.prefix.clone();
        let page_size = self.options.page_size.clamp(1, 1000);
        let max_pages = self.options.max_pages.max(1);

        stream::try_unfold(PageState::default(), move |mut state| {
            let store = store.clone();
            let prefix = prefix.clone();
            async move {
                if state.done {
                    return Ok(None);
                }
                if state.pages >= max_pages {
                    return Err(ListingError::PageLimitExceeded { max_pages });
                }

                let page = store
                    .list_page(prefix.as_deref(), state.cursor.as_deref(), page_size)
                    .await?;
                state.pages += 1;
                debug!(
                    store = store.name(),
                    page = state.pages,
                    keys = page.keys.len(),
                    more = page.next_continuation.is_some(),
                    "listed page"
                );

                match page.next_continuation {
                    Some(next) => {
                        if !state.seen_cursors.insert(next.clone()) {
                            return Err(ListingError::RepeatedCursor {
                                cursor: next,
                                pages: state.pages,
                            });
                        }
                        state.cursor = Some(next);
                    }
                    None => state.done = true,
                }

                Ok(Some((page.keys, state)))
            }
        })
    }

    /// Every image key in listing order, with duplicates, directory markers and
    /// excluded keys removed.
    pub fn keys(&self) -> impl Stream<Item = Result<String, ListingError>> + Send + 'static {
        let excluded: HashSet<String> = self.options.excluded_keys.iter().cloned().collect();
        let mut seen = HashSet::new();

        self.pages()
            .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, ListingError>)))
            .try_flatten()
            .try_filter(move |key| {
                let keep = !key.ends_with('/') && !excluded.contains(key) && seen.insert(key.clone());
                future::ready(keep)
            })
            .boxed()
    }

    /// Materialize the complete listing.
    ///
    /// The selector streams [`keys`](Self::keys) instead, so this is only for
    /// callers that need the whole set at once.
    #[allow(dead_code)]
    pub async fn list_all_keys(&self) -> Result<Vec<String>, ListingError> {
        self.keys().try_collect().await
    }
}
