use std::collections::HashMap;

use axum::{
    extract::{rejection::JsonRejection, Extension, Multipart, Path, Query},
    http::StatusCode,
    response::Json,
};
use mongodb::bson::oid::ObjectId;
use tracing::info;

use crate::auth::AdminUser;
use crate::error::{AppError, FieldErrors};
use crate::media::{media_url, play_image_path, verify_image};
use crate::models::{
    actor_model::Actor,
    genre_model::Genre,
    play_model::{Play, PlayChanges, PlayDetail, PlayImageResponse, PlayListItem, PlayPayload, PlayQuery},
};
use crate::state::AppState;
use crate::store::by_id;
use crate::utils::parse_path_id;

/// Genre and actor lookups for rendering a batch of plays.
pub(crate) async fn related_maps(
    state: &AppState,
    plays: &[&Play],
) -> Result<(HashMap<ObjectId, Genre>, HashMap<ObjectId, Actor>), AppError> {
    let mut genre_ids: Vec<ObjectId> = plays.iter().flat_map(|p| p.genres.iter().copied()).collect();
    let mut actor_ids: Vec<ObjectId> = plays.iter().flat_map(|p| p.actors.iter().copied()).collect();
    genre_ids.sort();
    genre_ids.dedup();
    actor_ids.sort();
    actor_ids.dedup();

    let genres = state.store.find_genres(&genre_ids).await?;
    let actors = state.store.find_actors(&actor_ids).await?;
    Ok((by_id(genres, |g| g.id), by_id(actors, |a| a.id)))
}

/// Rejects ids in `genres`/`actors` that do not exist.
async fn check_references(state: &AppState, changes: &PlayChanges) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    if let Some(ids) = changes.genres.as_deref().filter(|ids| !ids.is_empty()) {
        let found = state.store.find_genres(ids).await?;
        for id in ids.iter().filter(|id| !found.iter().any(|g| g.id == **id)) {
            errors.add("genres", format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }
    if let Some(ids) = changes.actors.as_deref().filter(|ids| !ids.is_empty()) {
        let found = state.store.find_actors(ids).await?;
        for id in ids.iter().filter(|id| !found.iter().any(|a| a.id == **id)) {
            errors.add("actors", format!("Invalid pk \"{id}\" - object does not exist."));
        }
    }

    errors.into_result()
}

pub async fn load_plays(
    Extension(state): Extension<AppState>,
    Query(query): Query<PlayQuery>,
) -> Result<Json<Vec<PlayListItem>>, AppError> {
    let filter = query.into_filter()?;
    let plays = state.store.list_plays(&filter).await?;

    let refs: Vec<&Play> = plays.iter().collect();
    let (genres, actors) = related_maps(&state, &refs).await?;

    Ok(Json(
        plays
            .iter()
            .map(|play| PlayListItem::build(play, &genres, &actors))
            .collect(),
    ))
}

pub async fn load_play(
    Extension(state): Extension<AppState>,
    Path(id_str): Path<String>,
) -> Result<Json<PlayDetail>, AppError> {
    let play_id = parse_path_id(&id_str, "Play")?;
    let play = state
        .store
        .get_play(play_id)
        .await?
        .ok_or_else(|| AppError::not_found("Play"))?;

    let (mut genres, mut actors) = related_maps(&state, &[&play]).await?;
    let genres = play.genres.iter().filter_map(|id| genres.remove(id)).collect();
    let actors = play.actors.iter().filter_map(|id| actors.remove(id)).collect();

    Ok(Json(PlayDetail::build(play, genres, actors)))
}

pub async fn add_play(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    payload: Result<Json<PlayPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Play>), AppError> {
    let Json(payload) = payload?;
    let changes = payload.validate(false)?;
    check_references(&state, &changes).await?;

    let play = state.store.create_play(changes.into_new_play()).await?;
    info!(play = %play.id, title = %play.title, "Created play");
    Ok((StatusCode::CREATED, Json(play)))
}

async fn apply_update(
    state: AppState,
    id_str: String,
    payload: PlayPayload,
    partial: bool,
) -> Result<Json<Play>, AppError> {
    let play_id = parse_path_id(&id_str, "Play")?;
    let mut play = state
        .store
        .get_play(play_id)
        .await?
        .ok_or_else(|| AppError::not_found("Play"))?;

    let changes = payload.validate(partial)?;
    check_references(&state, &changes).await?;
    changes.apply(&mut play);

    if !state.store.replace_play(&play).await? {
        return Err(AppError::not_found("Play"));
    }
    Ok(Json(play))
}

pub async fn update_play(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    Path(id_str): Path<String>,
    payload: Result<Json<PlayPayload>, JsonRejection>,
) -> Result<Json<Play>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, id_str, payload, false).await
}

pub async fn patch_play(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    Path(id_str): Path<String>,
    payload: Result<Json<PlayPayload>, JsonRejection>,
) -> Result<Json<Play>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, id_str, payload, true).await
}

pub async fn upload_play_image(
    Extension(state): Extension<AppState>,
    AdminUser(admin): AdminUser,
    Path(id_str): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<PlayImageResponse>, AppError> {
    let play_id = parse_path_id(&id_str, "Play")?;
    let mut play = state
        .store
        .get_play(play_id)
        .await?
        .ok_or_else(|| AppError::not_found("Play"))?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let (filename, bytes) =
        upload.ok_or_else(|| AppError::validation("image", "No file was submitted."))?;
    if verify_image(bytes.clone()).await.is_none() {
        return Err(AppError::validation(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        ));
    }

    let path = play_image_path(&play.title, &filename);
    state.media.save(&path, &bytes).await?;

    play.image = Some(path);
    if !state.store.replace_play(&play).await? {
        return Err(AppError::not_found("Play"));
    }
    info!(play = %play.id, admin = %admin.email, "Uploaded play image");

    Ok(Json(PlayImageResponse {
        id: play.id,
        image: play.image.as_deref().map(media_url),
    }))
}
