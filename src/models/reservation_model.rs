use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::serialize_object_id;

use super::{hall_model::TheatreHall, performance_model::Seat};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Reservation {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    #[serde(deserialize_with = "chrono_datetime_as_bson_datetime::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "user", serialize_with = "serialize_object_id")]
    pub user_id: ObjectId,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Ticket {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub row: i32,
    pub seat: i32,
    #[serde(rename = "performance", serialize_with = "serialize_object_id")]
    pub performance_id: ObjectId,
    #[serde(rename = "reservation", serialize_with = "serialize_object_id")]
    pub reservation_id: ObjectId,
}

impl Ticket {
    pub fn seat(&self) -> Seat {
        Seat {
            row: self.row,
            seat: self.seat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NewTicket {
    pub performance_id: ObjectId,
    pub row: i32,
    pub seat: i32,
}

impl NewTicket {
    pub fn seat(&self) -> Seat {
        Seat {
            row: self.row,
            seat: self.seat,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct TicketPerformanceSummary {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub play_title: String,
    pub theatre_hall_name: String,
    pub show_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub row: i32,
    pub seat: i32,
    pub performance: TicketPerformanceSummary,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketResponse>,
}

#[derive(Debug, Deserialize)]
pub struct TicketPayload {
    pub performance: Option<String>,
    pub row: Option<i64>,
    pub seat: Option<i64>,
}

/// Any `user` sent by the client is not part of this shape and is dropped.
#[derive(Debug, Deserialize)]
pub struct ReservationPayload {
    pub tickets: Option<Vec<TicketPayload>>,
}

impl ReservationPayload {
    /// Structural checks only; hall bounds and collisions come later.
    pub fn validate(self) -> Result<Vec<NewTicket>, AppError> {
        let mut errors = FieldErrors::new();

        let raw_tickets = match self.tickets {
            None => return Err(AppError::validation("tickets", "This field is required.")),
            Some(tickets) if tickets.is_empty() => {
                return Err(AppError::validation(
                    "tickets",
                    "At least one ticket is required.",
                ))
            }
            Some(tickets) => tickets,
        };

        let mut tickets = Vec::with_capacity(raw_tickets.len());
        for (index, raw) in raw_tickets.into_iter().enumerate() {
            let prefix = format!("tickets[{index}]");

            let performance_id = match raw.performance.as_deref() {
                None => {
                    errors.add(format!("{prefix}.performance"), "This field is required.");
                    None
                }
                Some(value) => match ObjectId::parse_str(value.trim()) {
                    Ok(id) => Some(id),
                    Err(_) => {
                        errors.add(
                            format!("{prefix}.performance"),
                            format!("\"{value}\" is not a valid id."),
                        );
                        None
                    }
                },
            };

            let mut coordinate = |field: &str, value: Option<i64>| match value {
                None => {
                    errors.add(format!("{prefix}.{field}"), "This field is required.");
                    None
                }
                Some(v) => match i32::try_from(v) {
                    Ok(v) => Some(v),
                    Err(_) => {
                        errors.add(format!("{prefix}.{field}"), "A valid integer is required.");
                        None
                    }
                },
            };
            let row = coordinate("row", raw.row);
            let seat = coordinate("seat", raw.seat);

            if let (Some(performance_id), Some(row), Some(seat)) = (performance_id, row, seat) {
                tickets.push(NewTicket {
                    performance_id,
                    row,
                    seat,
                });
            }
        }

        errors.into_result()?;
        Ok(tickets)
    }
}

/// Checks a ticket batch against hall layouts, already-sold seats and itself.
///
/// `halls` maps each performance to its hall; `taken` holds the seats already
/// sold per performance. Performances missing from `halls` are reported as
/// unknown.
pub fn check_ticket_batch(
    tickets: &[NewTicket],
    halls: &HashMap<ObjectId, TheatreHall>,
    taken: &HashMap<ObjectId, HashSet<Seat>>,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    let mut requested: HashSet<(ObjectId, Seat)> = HashSet::new();

    for (index, ticket) in tickets.iter().enumerate() {
        let prefix = format!("tickets[{index}]");

        let Some(hall) = halls.get(&ticket.performance_id) else {
            errors.add(
                format!("{prefix}.performance"),
                format!(
                    "Invalid pk \"{}\" - object does not exist.",
                    ticket.performance_id
                ),
            );
            continue;
        };

        if let Err((field, message)) = hall.check_seat(ticket.row, ticket.seat) {
            errors.add(format!("{prefix}.{field}"), message);
            continue;
        }

        let seat = ticket.seat();
        let already_sold = taken
            .get(&ticket.performance_id)
            .is_some_and(|seats| seats.contains(&seat));
        if already_sold || !requested.insert((ticket.performance_id, seat)) {
            errors.add(
                prefix,
                format!(
                    "Seat already taken: row {}, seat {}.",
                    ticket.row, ticket.seat
                ),
            );
        }
    }

    errors
}
