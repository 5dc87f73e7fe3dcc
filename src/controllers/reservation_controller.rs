use std::collections::{HashMap, HashSet};

use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    http::StatusCode,
    response::Json,
};
use mongodb::bson::oid::ObjectId;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{
    hall_model::TheatreHall,
    performance_model::Seat,
    reservation_model::{
        check_ticket_batch, Reservation, ReservationPayload, ReservationResponse, Ticket,
        TicketPerformanceSummary, TicketResponse,
    },
};
use crate::pagination::{resolve_page, Page, PageQuery};
use crate::state::AppState;
use crate::store::{by_id, StoreError};

const RESERVATIONS_PATH: &str = "/reservations";

fn unique(ids: impl Iterator<Item = ObjectId>) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = ids.collect();
    ids.sort();
    ids.dedup();
    ids
}

/// Nests each reservation's tickets with a summary of their performance.
async fn render(
    state: &AppState,
    reservations: Vec<Reservation>,
    tickets: Vec<Ticket>,
) -> Result<Vec<ReservationResponse>, AppError> {
    let performance_ids = unique(tickets.iter().map(|t| t.performance_id));
    let performances = state.store.find_performances(&performance_ids).await?;

    let plays = by_id(
        state
            .store
            .find_plays(&unique(performances.iter().map(|p| p.play_id)))
            .await?,
        |p| p.id,
    );
    let halls = by_id(
        state
            .store
            .find_halls(&unique(performances.iter().map(|p| p.theatre_hall_id)))
            .await?,
        |h| h.id,
    );

    let summaries: HashMap<ObjectId, TicketPerformanceSummary> = performances
        .iter()
        .filter_map(|performance| {
            let play = plays.get(&performance.play_id)?;
            let hall = halls.get(&performance.theatre_hall_id)?;
            Some((
                performance.id,
                TicketPerformanceSummary {
                    id: performance.id,
                    play_title: play.title.clone(),
                    theatre_hall_name: hall.name.clone(),
                    show_time: performance.show_time,
                },
            ))
        })
        .collect();

    let mut grouped: HashMap<ObjectId, Vec<TicketResponse>> = HashMap::new();
    for ticket in tickets {
        let Some(summary) = summaries.get(&ticket.performance_id) else {
            continue;
        };
        grouped
            .entry(ticket.reservation_id)
            .or_default()
            .push(TicketResponse {
                id: ticket.id,
                row: ticket.row,
                seat: ticket.seat,
                performance: summary.clone(),
            });
    }

    Ok(reservations
        .into_iter()
        .map(|reservation| ReservationResponse {
            id: reservation.id,
            created_at: reservation.created_at,
            tickets: grouped.remove(&reservation.id).unwrap_or_default(),
        })
        .collect())
}

pub async fn load_reservations(
    Extension(state): Extension<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<ReservationResponse>>, AppError> {
    let mut request = query.into_request()?;
    if request.is_last_marker() {
        let (_, count) = state.store.list_reservations(user.id, 0, 1).await?;
        request = resolve_page(request, count)?;
    }

    let (reservations, count) = state
        .store
        .list_reservations(user.id, request.offset(), request.size)
        .await?;
    let request = resolve_page(request, count)?;

    let reservation_ids: Vec<ObjectId> = reservations.iter().map(|r| r.id).collect();
    let tickets = state.store.find_tickets(&reservation_ids).await?;
    let results = render(&state, reservations, tickets).await?;

    Ok(Json(Page::new(RESERVATIONS_PATH, request, count, results)))
}

pub async fn add_reservation(
    Extension(state): Extension<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<ReservationPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<ReservationResponse>), AppError> {
    let Json(payload) = payload?;
    let tickets = payload.validate()?;

    let performance_ids = unique(tickets.iter().map(|t| t.performance_id));
    let performances = state.store.find_performances(&performance_ids).await?;
    let halls = by_id(
        state
            .store
            .find_halls(&unique(performances.iter().map(|p| p.theatre_hall_id)))
            .await?,
        |h| h.id,
    );

    let mut hall_by_performance: HashMap<ObjectId, TheatreHall> = HashMap::new();
    let mut taken: HashMap<ObjectId, HashSet<Seat>> = HashMap::new();
    for performance in &performances {
        if let Some(hall) = halls.get(&performance.theatre_hall_id) {
            hall_by_performance.insert(performance.id, hall.clone());
        }
        let seats = state.store.taken_seats(performance.id).await?;
        taken.insert(performance.id, seats.into_iter().collect());
    }

    check_ticket_batch(&tickets, &hall_by_performance, &taken).into_result()?;

    let (reservation, created) = state
        .store
        .create_reservation(user.id, &tickets)
        .await
        .map_err(|e| {
            if let StoreError::SeatTaken { performance, row, seat } = &e {
                warn!(user = %user.id, %performance, row, seat, "Reservation lost a seat race");
            }
            AppError::from(e)
        })?;
    info!(
        reservation = %reservation.id,
        user = %user.id,
        tickets = created.len(),
        "Created reservation"
    );

    let mut rendered = render(&state, vec![reservation], created).await?;
    let response = rendered
        .pop()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("reservation vanished after insert")))?;
    Ok((StatusCode::CREATED, Json(response)))
}
