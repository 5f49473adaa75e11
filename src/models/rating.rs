//! The persisted ratings document.

use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;

/// A single rating exactly as submitted, so `4` is stored as `4` and not `4.0`.
pub type RatingValue = Number;

/// Every rating recorded for one image, oldest first.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct RatingRecord {
    pub ratings: Vec<RatingValue>,
}

/// Image key to ratings, serialized as `{ "<imageId>": { "ratings": [..] } }`.
///
/// The whole document is the unit of persistence; a key is only ever inserted
/// together with its first rating.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct RatingsDocument {
    pub images: BTreeMap<String, RatingRecord>,
}

impl RatingsDocument {
    pub fn is_rated(&self, key: &str) -> bool {
        self.images.contains_key(key)
    }

    /// Append `rating` to the record for `image_id`, creating it if needed, and
    /// return the updated record.
    pub fn append(&mut self, image_id: &str, rating: RatingValue) -> &RatingRecord {
        let record = self.images.entry(image_id.to_string()).or_default();
        record.ratings.push(rating);
        record
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }
}
