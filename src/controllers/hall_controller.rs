use crate::auth::AdminUser;
use crate::error::AppError;
use crate::models::hall_model::{HallPayload, HallResponse};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Json,
};
use tracing::info;

pub async fn load_halls(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<HallResponse>>, AppError> {
    let halls = state.store.list_halls().await?;
    Ok(Json(halls.into_iter().map(HallResponse::from).collect()))
}

pub async fn add_hall(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    payload: Result<Json<HallPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<HallResponse>), AppError> {
    let Json(payload) = payload?;
    let hall = state.store.create_hall(payload.validate()?).await?;
    info!(hall = %hall.id, capacity = hall.capacity(), "Created theatre hall");
    Ok((StatusCode::CREATED, Json(hall.into())))
}
