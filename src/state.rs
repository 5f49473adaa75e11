//! Shared state handed to every handler.

use crate::services::{
    listing::ListingOptions,
    object_store::ObjectStore,
    ratings_repository::{RatingsOptions, RatingsRepository},
    selector::ImageSelector,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ObjectStore>,
    pub ratings: RatingsRepository,
    pub selector: ImageSelector,
    /// Prefix listings are restricted to, reused by the readiness probe.
    pub prefix: Option<String>,
    pub public_base_url: Arc<str>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        listing: ListingOptions,
        ratings: RatingsOptions,
        public_base_url: impl Into<Arc<str>>,
    ) -> Self {
        let ratings = RatingsRepository::new(store.clone(), ratings);
        let prefix = listing.prefix.clone();
        let selector = ImageSelector::new(store.clone(), listing, ratings.clone());
        Self {
            store,
            ratings,
            selector,
            prefix,
            public_base_url: public_base_url.into(),
        }
    }

    /// Public URL of an image: the base URL plus the key, each path segment
    /// percent-encoded.
    pub fn image_url(&self, key: &str) -> String {
        let path = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/{}", self.public_base_url, path)
    }
}
