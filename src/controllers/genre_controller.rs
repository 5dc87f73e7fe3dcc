use axum::{extract::rejection::JsonRejection, extract::Extension, http::StatusCode, Json};

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::models::genre_model::{Genre, GenrePayload};
use crate::state::AppState;

pub async fn load_genres(Extension(state): Extension<AppState>) -> Result<Json<Vec<Genre>>, AppError> {
    Ok(Json(state.store.list_genres().await?))
}

pub async fn add_genre(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    payload: Result<Json<GenrePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Genre>), AppError> {
    let Json(payload) = payload?;
    let name = payload.validate()?;
    let genre = state.store.create_genre(&name).await?;
    Ok((StatusCode::CREATED, Json(genre)))
}
