//! Picks one image nobody has rated yet.
//!
//! The listing is consumed as a stream and the pick is made with a single-slot
//! reservoir: the n-th unrated key replaces the current choice with probability
//! 1/n, which leaves every unrated key chosen with probability 1/|unrated|
//! without collecting the unrated set first.

use crate::{
    models::image::Selection,
    services::{
        listing::{KeyLister, ListingError, ListingOptions},
        object_store::ObjectStore,
        ratings_repository::{RatingsError, RatingsRepository},
    },
};
use futures::{TryStreamExt, pin_mut};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("listing images failed: {0}")]
    Listing(#[from] ListingError),
    #[error("loading ratings failed: {0}")]
    Ratings(#[from] RatingsError),
}

#[derive(Clone)]
pub struct ImageSelector {
    lister: KeyLister,
    ratings: RatingsRepository,
}

impl ImageSelector {
    /// The ratings document is always left out of the listing.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        mut listing: ListingOptions,
        ratings: RatingsRepository,
    ) -> Self {
        let ratings_key = ratings.key().to_string();
        if !listing.excluded_keys.contains(&ratings_key) {
            listing.excluded_keys.push(ratings_key);
        }
        Self {
            lister: KeyLister::new(store, listing),
            ratings,
        }
    }

    /// Pick an unrated image. `Ok(None)` means every listed image is rated.
    pub async fn select_unrated(&self) -> Result<Option<Selection>, SelectError> {
        let mut rng = StdRng::from_rng(&mut rand::rng());
        self.select_unrated_with(&mut rng).await
    }

    pub async fn select_unrated_with<R>(&self, rng: &mut R) -> Result<Option<Selection>, SelectError>
    where
        R: Rng + Send,
    {
        // Strict read: an unreadable ratings document must not look like "nothing rated".
        let rated = self.ratings.fetch().await?.document;

        let keys = self.lister.keys();
        pin_mut!(keys);

        let mut listed = 0usize;
        let mut unrated = 0usize;
        let mut chosen: Option<String> = None;
        while let Some(key) = keys.try_next().await? {
            listed += 1;
            if rated.is_rated(&key) {
                continue;
            }
            unrated += 1;
            if rng.random_range(0..unrated) == 0 {
                chosen = Some(key);
            }
        }

        debug!(listed, unrated, rated = rated.len(), "scanned bucket for unrated images");

        Ok(chosen.map(|key| Selection {
            key,
            remaining: unrated,
        }))
    }
}
