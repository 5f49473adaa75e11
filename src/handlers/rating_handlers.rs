//! `POST /api/rate` — append a rating to the ratings document.

use crate::{errors::AppError, models::rating::RatingRecord, state::AppState};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body. Both fields are optional here so a missing field becomes a
/// 400 with a JSON body instead of an extractor rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateRequest {
    pub image_id: Option<String>,
    pub rating: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RateResponse {
    pub message: &'static str,
    pub ratings: RatingRecord,
}

/// Append one rating. `rating` must be a JSON number: `null` counts as a
/// missing rating and is rejected with 400 rather than stored, so the
/// persisted lists only ever hold numbers.
pub async fn rate_image(
    State(state): State<AppState>,
    payload: Result<Json<RateRequest>, JsonRejection>,
) -> Result<Json<RateResponse>, AppError> {
    let Json(request) = payload?;

    let image_id = request
        .image_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request("Invalid request"))?;

    // `0` is a rating; only an absent (or null) value is missing.
    let rating = match request.rating {
        Some(Value::Number(rating)) => rating,
        Some(_) => return Err(AppError::bad_request("Invalid request: rating must be a number")),
        None => return Err(AppError::bad_request("Invalid request")),
    };

    let record = state.ratings.record_rating(&image_id, rating).await?;

    Ok(Json(RateResponse {
        message: "Rating saved",
        ratings: record,
    }))
}
