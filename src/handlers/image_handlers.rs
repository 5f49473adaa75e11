//! `GET /api/image` — hand out one image nobody has rated yet.

use crate::{errors::AppError, models::image::ImageResponse, state::AppState};
use axum::{Json, extract::State};
use tracing::info;

pub async fn get_image(State(state): State<AppState>) -> Result<Json<ImageResponse>, AppError> {
    let selection = state
        .selector
        .select_unrated()
        .await?
        .ok_or_else(|| AppError::not_found("No unrated images available"))?;

    info!(key = %selection.key, remaining = selection.remaining, "serving unrated image");

    Ok(Json(ImageResponse {
        url: state.image_url(&selection.key),
        id: selection.key,
        remaining: selection.remaining,
    }))
}
