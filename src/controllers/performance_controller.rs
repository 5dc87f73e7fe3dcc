use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use mongodb::bson::oid::ObjectId;
use tracing::info;

use crate::auth::AdminUser;
use crate::error::{AppError, FieldErrors};
use crate::media::media_url;
use crate::models::{
    hall_model::HallResponse,
    performance_model::{
        tickets_available, Performance, PerformanceChanges, PerformanceDetail,
        PerformanceListItem, PerformancePayload, PerformanceQuery,
    },
    play_model::PlayListItem,
};
use crate::state::AppState;
use crate::store::by_id;
use crate::utils::parse_path_id;

use super::play_controller::related_maps;

/// Sold tickets must stay addressable when a performance moves to another hall.
async fn check_sold_seats_fit(
    state: &AppState,
    performance: &Performance,
    hall_id: ObjectId,
) -> Result<(), AppError> {
    let Some(hall) = state.store.find_halls(&[hall_id]).await?.into_iter().next() else {
        return Ok(());
    };
    let taken = state.store.taken_seats(performance.id).await?;
    if let Some(seat) = taken
        .iter()
        .find(|seat| hall.check_seat(seat.row, seat.seat).is_err())
    {
        return Err(AppError::validation(
            "theatre_hall",
            format!(
                "Sold ticket (row {}, seat {}) does not fit in theatre hall \"{}\" ({} rows, {} seats in row).",
                seat.row, seat.seat, hall.name, hall.rows, hall.seats_in_row
            ),
        ));
    }
    Ok(())
}

async fn check_references(state: &AppState, changes: &PerformanceChanges) -> Result<(), AppError> {
    let mut errors = FieldErrors::new();

    if let Some(play_id) = changes.play_id {
        if state.store.get_play(play_id).await?.is_none() {
            errors.add("play", format!("Invalid pk \"{play_id}\" - object does not exist."));
        }
    }
    if let Some(hall_id) = changes.theatre_hall_id {
        if state.store.find_halls(&[hall_id]).await?.is_empty() {
            errors.add(
                "theatre_hall",
                format!("Invalid pk \"{hall_id}\" - object does not exist."),
            );
        }
    }

    errors.into_result()
}

pub async fn load_performances(
    Extension(state): Extension<AppState>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<Vec<PerformanceListItem>>, AppError> {
    let filter = query.into_filter()?;
    let performances = state.store.list_performances(&filter).await?;

    let mut play_ids: Vec<_> = performances.iter().map(|p| p.play_id).collect();
    let mut hall_ids: Vec<_> = performances.iter().map(|p| p.theatre_hall_id).collect();
    play_ids.sort();
    play_ids.dedup();
    hall_ids.sort();
    hall_ids.dedup();
    let performance_ids: Vec<_> = performances.iter().map(|p| p.id).collect();

    let plays = by_id(state.store.find_plays(&play_ids).await?, |p| p.id);
    let halls = by_id(state.store.find_halls(&hall_ids).await?, |h| h.id);
    let sold = state.store.count_tickets(&performance_ids).await?;

    let items = performances
        .iter()
        .filter_map(|performance| {
            let play = plays.get(&performance.play_id)?;
            let hall = halls.get(&performance.theatre_hall_id)?;
            let tickets_sold = sold.get(&performance.id).copied().unwrap_or(0);

            Some(PerformanceListItem {
                id: performance.id,
                show_time: performance.show_time,
                play_title: play.title.clone(),
                play_image: play.image.as_deref().map(media_url),
                theatre_hall_name: hall.name.clone(),
                theatre_hall_capacity: hall.capacity(),
                tickets_available: tickets_available(hall, tickets_sold),
            })
        })
        .collect();

    Ok(Json(items))
}

pub async fn load_performance(
    Extension(state): Extension<AppState>,
    Path(id_str): Path<String>,
) -> Result<Json<PerformanceDetail>, AppError> {
    let performance_id = parse_path_id(&id_str, "Performance")?;
    let performance = state
        .store
        .get_performance(performance_id)
        .await?
        .ok_or_else(|| AppError::not_found("Performance"))?;

    let play = state
        .store
        .get_play(performance.play_id)
        .await?
        .ok_or_else(|| AppError::not_found("Play"))?;
    let hall = state
        .store
        .find_halls(&[performance.theatre_hall_id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("Theatre hall"))?;

    let (genres, actors) = related_maps(&state, &[&play]).await?;
    let taken_places = state.store.taken_seats(performance.id).await?;
    let available = tickets_available(&hall, taken_places.len() as u64);

    Ok(Json(PerformanceDetail {
        id: performance.id,
        show_time: performance.show_time,
        play: PlayListItem::build(&play, &genres, &actors),
        theatre_hall: HallResponse::from(hall),
        tickets_available: available,
        taken_places,
    }))
}

pub async fn add_performance(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    payload: Result<Json<PerformancePayload>, JsonRejection>,
) -> Result<(StatusCode, Json<Performance>), AppError> {
    let Json(payload) = payload?;
    let changes = payload.validate(false)?;
    check_references(&state, &changes).await?;

    let new_performance = changes.into_new_performance().ok_or_else(|| {
        AppError::validation("non_field_errors", "Play, theatre hall and show time are required.")
    })?;
    let performance = state.store.create_performance(new_performance).await?;
    info!(performance = %performance.id, show_time = %performance.show_time, "Scheduled performance");
    Ok((StatusCode::CREATED, Json(performance)))
}

async fn apply_update(
    state: AppState,
    id_str: String,
    payload: PerformancePayload,
    partial: bool,
) -> Result<Json<Performance>, AppError> {
    let performance_id = parse_path_id(&id_str, "Performance")?;
    let mut performance = state
        .store
        .get_performance(performance_id)
        .await?
        .ok_or_else(|| AppError::not_found("Performance"))?;

    let changes = payload.validate(partial)?;
    check_references(&state, &changes).await?;
    if let Some(hall_id) = changes
        .theatre_hall_id
        .filter(|id| *id != performance.theatre_hall_id)
    {
        check_sold_seats_fit(&state, &performance, hall_id).await?;
    }
    changes.apply(&mut performance);

    if !state.store.replace_performance(&performance).await? {
        return Err(AppError::not_found("Performance"));
    }
    Ok(Json(performance))
}

pub async fn update_performance(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    Path(id_str): Path<String>,
    payload: Result<Json<PerformancePayload>, JsonRejection>,
) -> Result<Json<Performance>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, id_str, payload, false).await
}

pub async fn patch_performance(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    Path(id_str): Path<String>,
    payload: Result<Json<PerformancePayload>, JsonRejection>,
) -> Result<Json<Performance>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, id_str, payload, true).await
}

pub async fn delete_performance(
    Extension(state): Extension<AppState>,
    _admin: AdminUser,
    Path(id_str): Path<String>,
) -> Result<StatusCode, AppError> {
    let performance_id = parse_path_id(&id_str, "Performance")?;
    if !state.store.delete_performance(performance_id).await? {
        return Err(AppError::not_found("Performance"));
    }
    info!(performance = %performance_id, "Deleted performance and its tickets");
    Ok(StatusCode::NO_CONTENT)
}
