//! Persistence traits.
//!
//! Handlers only see these traits, so the same routes run against MongoDB in
//! production and against the in-memory store in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use crate::models::{
    actor_model::{Actor, NewActor},
    genre_model::Genre,
    hall_model::{NewHall, TheatreHall},
    performance_model::{NewPerformance, Performance, PerformanceFilter, Seat},
    play_model::{NewPlay, Play, PlayFilter},
    reservation_model::{NewTicket, Reservation, Ticket},
    user_model::{NewUser, Token, User},
};

#[cfg(test)]
pub mod memory;
pub mod mongo;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{resource} with this {field} already exists")]
    Duplicate {
        resource: &'static str,
        field: &'static str,
    },

    #[error("seat (row {row}, seat {seat}) of performance {performance} is already taken")]
    SeatTaken {
        performance: ObjectId,
        row: i32,
        seat: i32,
    },

    #[error("{field} refers to {id}, which no longer exists")]
    Missing { field: &'static str, id: ObjectId },

    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Genres, actors and plays.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// All genres in insertion order.
    async fn list_genres(&self) -> StoreResult<Vec<Genre>>;

    /// Fails with `Duplicate` when the name is taken.
    async fn create_genre(&self, name: &str) -> StoreResult<Genre>;

    async fn find_genres(&self, ids: &[ObjectId]) -> StoreResult<Vec<Genre>>;

    async fn list_actors(&self) -> StoreResult<Vec<Actor>>;

    async fn create_actor(&self, actor: NewActor) -> StoreResult<Actor>;

    async fn find_actors(&self, ids: &[ObjectId]) -> StoreResult<Vec<Actor>>;

    /// Plays matching every filter dimension, ordered by title.
    async fn list_plays(&self, filter: &PlayFilter) -> StoreResult<Vec<Play>>;

    async fn get_play(&self, id: ObjectId) -> StoreResult<Option<Play>>;

    async fn find_plays(&self, ids: &[ObjectId]) -> StoreResult<Vec<Play>>;

    async fn create_play(&self, play: NewPlay) -> StoreResult<Play>;

    /// Overwrites the stored play; `false` when it no longer exists.
    async fn replace_play(&self, play: &Play) -> StoreResult<bool>;
}

/// Theatre halls. Halls are never updated once created.
#[async_trait]
pub trait VenueStore: Send + Sync {
    async fn list_halls(&self) -> StoreResult<Vec<TheatreHall>>;

    async fn create_hall(&self, hall: NewHall) -> StoreResult<TheatreHall>;

    async fn find_halls(&self, ids: &[ObjectId]) -> StoreResult<Vec<TheatreHall>>;
}

#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Performances matching the filter, most recent show time first.
    async fn list_performances(&self, filter: &PerformanceFilter)
        -> StoreResult<Vec<Performance>>;

    async fn get_performance(&self, id: ObjectId) -> StoreResult<Option<Performance>>;

    async fn find_performances(&self, ids: &[ObjectId]) -> StoreResult<Vec<Performance>>;

    async fn create_performance(&self, performance: NewPerformance) -> StoreResult<Performance>;

    async fn replace_performance(&self, performance: &Performance) -> StoreResult<bool>;

    /// Removes the performance together with its tickets.
    async fn delete_performance(&self, id: ObjectId) -> StoreResult<bool>;

    /// Sold tickets per performance; performances without tickets are absent.
    async fn count_tickets(&self, performance_ids: &[ObjectId])
        -> StoreResult<HashMap<ObjectId, u64>>;

    async fn taken_seats(&self, performance_id: ObjectId) -> StoreResult<Vec<Seat>>;
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// One page of the user's reservations, newest first, plus the total count.
    async fn list_reservations(
        &self,
        user_id: ObjectId,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Reservation>, u64)>;

    async fn find_tickets(&self, reservation_ids: &[ObjectId]) -> StoreResult<Vec<Ticket>>;

    /// Writes the reservation and all tickets, or nothing.
    ///
    /// A ticket whose `(performance, row, seat)` is already sold fails the whole
    /// call with `SeatTaken`; a ticket for a performance that is gone fails it
    /// with `Missing`.
    async fn create_reservation(
        &self,
        user_id: ObjectId,
        tickets: &[NewTicket],
    ) -> StoreResult<(Reservation, Vec<Ticket>)>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Duplicate` when the email is registered.
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn replace_user(&self, user: &User) -> StoreResult<bool>;

    /// Returns the user's token, storing `candidate` if none exists yet.
    async fn get_or_create_token(&self, user_id: ObjectId, candidate: Token)
        -> StoreResult<Token>;

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>>;
}

pub trait TheatreStore:
    CatalogStore + VenueStore + PerformanceStore + ReservationStore + UserStore
{
}

impl<T> TheatreStore for T where
    T: CatalogStore + VenueStore + PerformanceStore + ReservationStore + UserStore
{
}

/// Indexes a lookup result by id.
pub fn by_id<T, F>(items: Vec<T>, id: F) -> HashMap<ObjectId, T>
where
    F: Fn(&T) -> ObjectId,
{
    items.into_iter().map(|item| (id(&item), item)).collect()
}
