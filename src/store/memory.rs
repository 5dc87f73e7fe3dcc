use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use mongodb::bson::oid::ObjectId;

use crate::models::{
    actor_model::{Actor, NewActor},
    genre_model::Genre,
    hall_model::{NewHall, TheatreHall},
    performance_model::{NewPerformance, Performance, PerformanceFilter, Seat},
    play_model::{NewPlay, Play, PlayFilter},
    reservation_model::{NewTicket, Reservation, Ticket},
    user_model::{NewUser, Token, User},
};

use super::{
    CatalogStore, PerformanceStore, ReservationStore, StoreError, StoreResult, UserStore,
    VenueStore,
};

#[derive(Default)]
struct Data {
    genres: Vec<Genre>,
    actors: Vec<Actor>,
    plays: Vec<Play>,
    halls: Vec<TheatreHall>,
    performances: Vec<Performance>,
    reservations: Vec<Reservation>,
    tickets: Vec<Ticket>,
    users: Vec<User>,
    tokens: Vec<Token>,
}

/// Vec-backed store. Every operation runs under one lock, which plays the role
/// of the unique index and the transaction of the MongoDB backend.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<Data>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ticket_count(&self) -> usize {
        self.lock().tickets.len()
    }
}

fn pick<T: Clone>(items: &[T], ids: &[ObjectId], id: impl Fn(&T) -> ObjectId) -> Vec<T> {
    items.iter().filter(|item| ids.contains(&id(item))).cloned().collect()
}

fn replace<T>(items: &mut [T], updated: &T, id: impl Fn(&T) -> ObjectId) -> bool
where
    T: Clone,
{
    match items.iter_mut().find(|item| id(item) == id(updated)) {
        Some(slot) => {
            *slot = updated.clone();
            true
        }
        None => false,
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_genres(&self) -> StoreResult<Vec<Genre>> {
        Ok(self.lock().genres.clone())
    }

    async fn create_genre(&self, name: &str) -> StoreResult<Genre> {
        let mut data = self.lock();
        if data.genres.iter().any(|g| g.name == name) {
            return Err(StoreError::Duplicate {
                resource: "genre",
                field: "name",
            });
        }
        let genre = Genre {
            id: ObjectId::new(),
            name: name.to_string(),
        };
        data.genres.push(genre.clone());
        Ok(genre)
    }

    async fn find_genres(&self, ids: &[ObjectId]) -> StoreResult<Vec<Genre>> {
        Ok(pick(&self.lock().genres, ids, |g| g.id))
    }

    async fn list_actors(&self) -> StoreResult<Vec<Actor>> {
        Ok(self.lock().actors.clone())
    }

    async fn create_actor(&self, actor: NewActor) -> StoreResult<Actor> {
        let actor = Actor {
            id: ObjectId::new(),
            first_name: actor.first_name,
            last_name: actor.last_name,
        };
        self.lock().actors.push(actor.clone());
        Ok(actor)
    }

    async fn find_actors(&self, ids: &[ObjectId]) -> StoreResult<Vec<Actor>> {
        Ok(pick(&self.lock().actors, ids, |a| a.id))
    }

    async fn list_plays(&self, filter: &PlayFilter) -> StoreResult<Vec<Play>> {
        let mut plays: Vec<Play> = self
            .lock()
            .plays
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        plays.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(plays)
    }

    async fn get_play(&self, id: ObjectId) -> StoreResult<Option<Play>> {
        Ok(self.lock().plays.iter().find(|p| p.id == id).cloned())
    }

    async fn find_plays(&self, ids: &[ObjectId]) -> StoreResult<Vec<Play>> {
        Ok(pick(&self.lock().plays, ids, |p| p.id))
    }

    async fn create_play(&self, play: NewPlay) -> StoreResult<Play> {
        let play = Play {
            id: ObjectId::new(),
            title: play.title,
            description: play.description,
            genres: play.genres,
            actors: play.actors,
            image: None,
        };
        self.lock().plays.push(play.clone());
        Ok(play)
    }

    async fn replace_play(&self, play: &Play) -> StoreResult<bool> {
        Ok(replace(&mut self.lock().plays, play, |p| p.id))
    }
}

#[async_trait]
impl VenueStore for MemoryStore {
    async fn list_halls(&self) -> StoreResult<Vec<TheatreHall>> {
        Ok(self.lock().halls.clone())
    }

    async fn create_hall(&self, hall: NewHall) -> StoreResult<TheatreHall> {
        let hall = TheatreHall {
            id: ObjectId::new(),
            name: hall.name,
            rows: hall.rows,
            seats_in_row: hall.seats_in_row,
        };
        self.lock().halls.push(hall.clone());
        Ok(hall)
    }

    async fn find_halls(&self, ids: &[ObjectId]) -> StoreResult<Vec<TheatreHall>> {
        Ok(pick(&self.lock().halls, ids, |h| h.id))
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn list_performances(
        &self,
        filter: &PerformanceFilter,
    ) -> StoreResult<Vec<Performance>> {
        let mut performances: Vec<Performance> = self
            .lock()
            .performances
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        performances.sort_by(|a, b| b.show_time.cmp(&a.show_time).then(b.id.cmp(&a.id)));
        Ok(performances)
    }

    async fn get_performance(&self, id: ObjectId) -> StoreResult<Option<Performance>> {
        Ok(self.lock().performances.iter().find(|p| p.id == id).cloned())
    }

    async fn find_performances(&self, ids: &[ObjectId]) -> StoreResult<Vec<Performance>> {
        Ok(pick(&self.lock().performances, ids, |p| p.id))
    }

    async fn create_performance(&self, performance: NewPerformance) -> StoreResult<Performance> {
        let performance = Performance {
            id: ObjectId::new(),
            play_id: performance.play_id,
            theatre_hall_id: performance.theatre_hall_id,
            show_time: performance.show_time,
        };
        self.lock().performances.push(performance.clone());
        Ok(performance)
    }

    async fn replace_performance(&self, performance: &Performance) -> StoreResult<bool> {
        Ok(replace(&mut self.lock().performances, performance, |p| p.id))
    }

    async fn delete_performance(&self, id: ObjectId) -> StoreResult<bool> {
        let mut data = self.lock();
        let before = data.performances.len();
        data.performances.retain(|p| p.id != id);
        if data.performances.len() == before {
            return Ok(false);
        }
        data.tickets.retain(|t| t.performance_id != id);
        Ok(true)
    }

    async fn count_tickets(
        &self,
        performance_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        let mut counts = HashMap::new();
        for ticket in &self.lock().tickets {
            if performance_ids.contains(&ticket.performance_id) {
                *counts.entry(ticket.performance_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn taken_seats(&self, performance_id: ObjectId) -> StoreResult<Vec<Seat>> {
        let mut seats: Vec<Seat> = self
            .lock()
            .tickets
            .iter()
            .filter(|t| t.performance_id == performance_id)
            .map(Ticket::seat)
            .collect();
        seats.sort();
        Ok(seats)
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn list_reservations(
        &self,
        user_id: ObjectId,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Reservation>, u64)> {
        let data = self.lock();
        let mut owned: Vec<&Reservation> =
            data.reservations.iter().filter(|r| r.user_id == user_id).collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = owned.len() as u64;
        let page = owned
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn find_tickets(&self, reservation_ids: &[ObjectId]) -> StoreResult<Vec<Ticket>> {
        Ok(self
            .lock()
            .tickets
            .iter()
            .filter(|t| reservation_ids.contains(&t.reservation_id))
            .cloned()
            .collect())
    }

    async fn create_reservation(
        &self,
        user_id: ObjectId,
        tickets: &[NewTicket],
    ) -> StoreResult<(Reservation, Vec<Ticket>)> {
        let mut data = self.lock();

        for (index, ticket) in tickets.iter().enumerate() {
            if !data.performances.iter().any(|p| p.id == ticket.performance_id) {
                return Err(StoreError::Missing {
                    field: "tickets",
                    id: ticket.performance_id,
                });
            }
            let sold = data.tickets.iter().any(|t| {
                t.performance_id == ticket.performance_id
                    && t.row == ticket.row
                    && t.seat == ticket.seat
            });
            if sold || tickets[..index].contains(ticket) {
                return Err(StoreError::SeatTaken {
                    performance: ticket.performance_id,
                    row: ticket.row,
                    seat: ticket.seat,
                });
            }
        }

        let reservation = Reservation {
            id: ObjectId::new(),
            created_at: Utc::now(),
            user_id,
        };
        let created: Vec<Ticket> = tickets
            .iter()
            .map(|t| Ticket {
                id: ObjectId::new(),
                row: t.row,
                seat: t.seat,
                performance_id: t.performance_id,
                reservation_id: reservation.id,
            })
            .collect();

        data.reservations.push(reservation.clone());
        data.tickets.extend(created.iter().cloned());
        Ok((reservation, created))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut data = self.lock();
        if data.users.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Duplicate {
                resource: "user",
                field: "email",
            });
        }
        let user = User {
            id: ObjectId::new(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
        };
        data.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lock().users.iter().find(|u| u.email == email).cloned())
    }

    async fn replace_user(&self, user: &User) -> StoreResult<bool> {
        let mut data = self.lock();
        if data
            .users
            .iter()
            .any(|u| u.id != user.id && u.email == user.email)
        {
            return Err(StoreError::Duplicate {
                resource: "user",
                field: "email",
            });
        }
        Ok(replace(&mut data.users, user, |u| u.id))
    }

    async fn get_or_create_token(
        &self,
        user_id: ObjectId,
        candidate: Token,
    ) -> StoreResult<Token> {
        let mut data = self.lock();
        if let Some(existing) = data.tokens.iter().find(|t| t.user_id == user_id) {
            return Ok(existing.clone());
        }
        data.tokens.push(candidate.clone());
        Ok(candidate)
    }

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>> {
        let data = self.lock();
        let Some(token) = data.tokens.iter().find(|t| t.key == key) else {
            return Ok(None);
        };
        Ok(data.users.iter().find(|u| u.id == token.user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::TheatreStore;

    async fn hall_performance(store: &MemoryStore) -> Performance {
        let hall = store
            .create_hall(NewHall {
                name: "Main".into(),
                rows: 5,
                seats_in_row: 10,
            })
            .await
            .unwrap();
        let play = store
            .create_play(NewPlay {
                title: "Hamlet".into(),
                description: "Prince of Denmark".into(),
                genres: vec![],
                actors: vec![],
            })
            .await
            .unwrap();
        store
            .create_performance(NewPerformance {
                play_id: play.id,
                theatre_hall_id: hall.id,
                show_time: Utc::now(),
            })
            .await
            .unwrap()
    }

    fn seat(performance: &Performance, row: i32, seat: i32) -> NewTicket {
        NewTicket {
            performance_id: performance.id,
            row,
            seat,
        }
    }

    #[tokio::test]
    async fn second_booking_of_a_seat_fails() {
        let store = MemoryStore::new();
        let performance = hall_performance(&store).await;
        let user = ObjectId::new();

        store
            .create_reservation(user, &[seat(&performance, 1, 1)])
            .await
            .unwrap();
        let second = store
            .create_reservation(user, &[seat(&performance, 1, 1)])
            .await;

        assert!(matches!(second, Err(StoreError::SeatTaken { row: 1, seat: 1, .. })));
        assert_eq!(store.ticket_count(), 1);
    }

    #[tokio::test]
    async fn failed_reservation_writes_nothing() {
        let store = MemoryStore::new();
        let performance = hall_performance(&store).await;
        let user = ObjectId::new();

        store
            .create_reservation(user, &[seat(&performance, 2, 2)])
            .await
            .unwrap();
        let result = store
            .create_reservation(
                user,
                &[seat(&performance, 3, 3), seat(&performance, 2, 2)],
            )
            .await;

        assert!(result.is_err());
        assert_eq!(store.ticket_count(), 1);
        let (reservations, total) = store.list_reservations(user, 0, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(reservations.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_bookings_of_one_seat_have_a_single_winner() {
        let store: Arc<dyn TheatreStore> = Arc::new(MemoryStore::new());
        let performance = {
            let hall = store
                .create_hall(NewHall {
                    name: "Main".into(),
                    rows: 5,
                    seats_in_row: 10,
                })
                .await
                .unwrap();
            store
                .create_performance(NewPerformance {
                    play_id: ObjectId::new(),
                    theatre_hall_id: hall.id,
                    show_time: Utc::now(),
                })
                .await
                .unwrap()
        };

        let attempts = (0..8).map(|_| {
            let store = Arc::clone(&store);
            let ticket = seat(&performance, 1, 1);
            tokio::spawn(async move { store.create_reservation(ObjectId::new(), &[ticket]).await })
        });

        let mut winners = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);

        let counts = store.count_tickets(&[performance.id]).await.unwrap();
        assert_eq!(counts.get(&performance.id), Some(&1));
    }

    #[tokio::test]
    async fn deleting_a_performance_cascades_to_its_tickets() {
        let store = MemoryStore::new();
        let performance = hall_performance(&store).await;

        store
            .create_reservation(
                ObjectId::new(),
                &[seat(&performance, 1, 1), seat(&performance, 1, 2)],
            )
            .await
            .unwrap();
        assert_eq!(store.ticket_count(), 2);

        assert!(store.delete_performance(performance.id).await.unwrap());
        assert_eq!(store.ticket_count(), 0);
        assert!(!store.delete_performance(performance.id).await.unwrap());
    }

    #[tokio::test]
    async fn booking_a_deleted_performance_writes_nothing() {
        let store = MemoryStore::new();
        let kept = hall_performance(&store).await;
        let gone = hall_performance(&store).await;
        let user = ObjectId::new();
        assert!(store.delete_performance(gone.id).await.unwrap());

        let result = store
            .create_reservation(user, &[seat(&kept, 1, 1), seat(&gone, 1, 1)])
            .await;

        match result {
            Err(StoreError::Missing { field, id }) => {
                assert_eq!(field, "tickets");
                assert_eq!(id, gone.id);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.ticket_count(), 0);
        assert_eq!(store.list_reservations(user, 0, 10).await.unwrap().1, 0);
    }

    #[tokio::test]
    async fn token_is_created_once_per_user() {
        let store = MemoryStore::new();
        let user = ObjectId::new();
        let token = |key: &str| Token {
            key: key.into(),
            user_id: user,
            created: Utc::now(),
        };

        let first = store.get_or_create_token(user, token("a")).await.unwrap();
        let second = store.get_or_create_token(user, token("b")).await.unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(second.key, "a");
    }
}
