use serde::Serialize;

/// Outcome of a successful unrated-image pick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selection {
    pub key: String,
    /// Size of the unrated set the pick was drawn from, including `key`.
    pub remaining: usize,
}

/// Body of `GET /api/image`.
#[derive(Serialize, Clone, Debug)]
pub struct ImageResponse {
    pub id: String,
    pub url: String,
    pub remaining: usize,
}
