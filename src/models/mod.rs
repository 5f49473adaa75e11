//! Data carried between the ratings store, the selector and the HTTP layer.
//!
//! The ratings document is persisted as JSON via `serde`; the image types are
//! what the selector hands back to the handlers.

pub mod image;
pub mod rating;
