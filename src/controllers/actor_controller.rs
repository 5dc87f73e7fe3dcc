use axum::{extract::rejection::JsonRejection, extract::Extension, http::StatusCode, Json};

use crate::auth::AdminUser;
use crate::error::AppError;
use crate::models::actor_model::{ActorPayload, ActorResponse};
use crate::state::AppState;

pub async fn load_actors(
    Extension(state): Extension<AppState>,
) -> Result<Json<Vec<ActorResponse>>, AppError> {
    let actors = state.store.list_actors().await?;
    Ok(Json(actors.into_iter().map(ActorResponse::from).collect()))
}

pub async fn add_actor(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    payload: Result<Json<ActorPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ActorResponse>), AppError> {
    let Json(payload) = payload?;
    let actor = state.store.create_actor(payload.validate()?).await?;
    Ok((StatusCode::CREATED, Json(actor.into())))
}
