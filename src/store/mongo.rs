use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, from_document, oid::ObjectId, Document},
    error::{Error as MongoError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR},
    options::{ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument},
    Client, ClientSession, Collection, Database, IndexModel,
};
use serde::{de::DeserializeOwned, Deserialize};
use tracing::{info, warn};

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

const DUPLICATE_KEY: i32 = 11000;
const TRANSACTION_ATTEMPTS: u32 = 10;

const GENRES: &str = "genres";
const ACTORS: &str = "actors";
const PLAYS: &str = "plays";
const HALLS: &str = "theatre_halls";
const PERFORMANCES: &str = "performances";
const RESERVATIONS: &str = "reservations";
const TICKETS: &str = "tickets";
const USERS: &str = "users";
const TOKENS: &str = "tokens";

#[derive(Clone)]
pub struct MongoStore {
    client: Client,
    db: Database,
}

#[derive(Deserialize)]
struct TicketCount {
    #[serde(rename = "_id")]
    performance: ObjectId,
    count: i64,
}

/// Error code reported by a failed write, with the batch index when known.
fn write_error_code(err: &MongoError) -> Option<(i32, Option<usize>)> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some((e.code, None)),
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .and_then(|errors| errors.first())
            .map(|e| (e.code, Some(e.index))),
        ErrorKind::Command(e) => Some((e.code, None)),
        _ => None,
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(write_error_code(err), Some((DUPLICATE_KEY, _)))
}

/// Write conflicts inside a transaction carry this label; the whole
/// transaction can be run again.
fn is_transient(err: &MongoError) -> bool {
    err.contains_label(TRANSIENT_TRANSACTION_ERROR)
}

async fn back_off(attempt: u32) {
    tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
}

fn ids_filter(ids: &[ObjectId]) -> Document {
    doc! { "_id": { "$in": ids.to_vec() } }
}

/// Case-insensitive substring on the title, OR within genres and within
/// actors, AND across dimensions.
fn play_query(filter: &PlayFilter) -> Document {
    let mut query = Document::new();
    if let Some(title) = &filter.title {
        query.insert(
            "title",
            doc! { "$regex": regex::escape(title), "$options": "i" },
        );
    }
    if !filter.genres.is_empty() {
        query.insert("genres", doc! { "$in": filter.genres.clone() });
    }
    if !filter.actors.is_empty() {
        query.insert("actors", doc! { "$in": filter.actors.clone() });
    }
    query
}

fn performance_query(filter: &PerformanceFilter) -> Document {
    let mut query = Document::new();
    if let Some(play_id) = filter.play_id {
        query.insert("play", play_id);
    }
    if let Some((start, end)) = filter.day_bounds() {
        query.insert(
            "show_time",
            doc! {
                "$gte": bson::DateTime::from_chrono(start),
                "$lt": bson::DateTime::from_chrono(end),
            },
        );
    }
    query
}

/// Maps a duplicate ticket key to the seat it belongs to.
fn seat_conflict(err: MongoError, tickets: &[Ticket]) -> StoreError {
    match write_error_code(&err) {
        Some((DUPLICATE_KEY, index)) => {
            match index.and_then(|i| tickets.get(i)).or(tickets.first()) {
                Some(t) => StoreError::SeatTaken {
                    performance: t.performance_id,
                    row: t.row,
                    seat: t.seat,
                },
                None => err.into(),
            }
        }
        _ => err.into(),
    }
}

impl MongoStore {
    /// Connects and pings the deployment before handing out the store.
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(database);

        db.run_command(doc! {"ping": 1}, None).await?;
        info!(database, "Connected to MongoDB");

        Ok(MongoStore { client, db })
    }

    fn docs(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn typed<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }

    async fn find_all<T>(
        &self,
        name: &str,
        filter: Document,
        options: Option<FindOptions>,
    ) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let cursor = self.typed::<T>(name).find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_one<T>(&self, name: &str, filter: Document) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self.typed::<T>(name).find_one(filter, None).await?)
    }

    async fn replace_fields(&self, name: &str, id: ObjectId, fields: Document) -> StoreResult<bool> {
        let result = self
            .docs(name)
            .update_one(doc! {"_id": id}, doc! {"$set": fields}, None)
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Deletes the performance and its tickets inside the session's
    /// transaction. `None` when the performance does not exist.
    async fn delete_with_tickets(
        &self,
        session: &mut ClientSession,
        id: ObjectId,
    ) -> Result<Option<u64>, MongoError> {
        let deleted = self
            .docs(PERFORMANCES)
            .delete_one_with_session(doc! {"_id": id}, None, session)
            .await?;
        if deleted.deleted_count == 0 {
            return Ok(None);
        }
        let tickets = self
            .docs(TICKETS)
            .delete_many_with_session(doc! {"performance": id}, None, session)
            .await?;
        Ok(Some(tickets.deleted_count))
    }

    /// Inserts the reservation and its tickets, then stamps every booked
    /// performance. The stamp makes a concurrent deletion of the performance
    /// conflict with this transaction, and a missing performance aborts it.
    async fn write_reservation(
        &self,
        session: &mut ClientSession,
        reservation: &Document,
        tickets: &[Document],
        performance_ids: &[ObjectId],
    ) -> StoreResult<()> {
        self.docs(RESERVATIONS)
            .insert_one_with_session(reservation.clone(), None, session)
            .await?;
        self.docs(TICKETS)
            .insert_many_with_session(tickets.to_vec(), None, session)
            .await?;

        for &id in performance_ids {
            let stamped = self
                .docs(PERFORMANCES)
                .update_one_with_session(
                    doc! {"_id": id},
                    doc! {"$currentDate": {"last_booked_at": true}},
                    None,
                    session,
                )
                .await?;
            if stamped.matched_count == 0 {
                return Err(StoreError::Missing { field: "tickets", id });
            }
        }
        Ok(())
    }

    pub async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();

        let indexes: [(&str, Document, Option<IndexOptions>); 8] = [
            (GENRES, doc! {"name": 1}, Some(unique())),
            (PLAYS, doc! {"title": 1}, None),
            (PERFORMANCES, doc! {"show_time": -1}, None),
            (TICKETS, doc! {"performance": 1, "row": 1, "seat": 1}, Some(unique())),
            (TICKETS, doc! {"reservation": 1}, None),
            (RESERVATIONS, doc! {"user": 1, "created_at": -1}, None),
            (USERS, doc! {"email": 1}, Some(unique())),
            (TOKENS, doc! {"key": 1}, Some(unique())),
        ];

        for (collection, keys, options) in indexes {
            let model = IndexModel::builder().keys(keys).options(options).build();
            self.docs(collection).create_index(model, None).await?;
        }
        let one_token_per_user = IndexModel::builder()
            .keys(doc! {"user": 1})
            .options(unique())
            .build();
        self.docs(TOKENS).create_index(one_token_per_user, None).await?;

        info!("MongoDB indexes are in place");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MongoStore {
    async fn list_genres(&self) -> StoreResult<Vec<Genre>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        self.find_all(GENRES, doc! {}, Some(options)).await
    }

    async fn create_genre(&self, name: &str) -> StoreResult<Genre> {
        let genre = Genre {
            id: ObjectId::new(),
            name: name.to_string(),
        };
        match self
            .docs(GENRES)
            .insert_one(doc! {"_id": genre.id, "name": &genre.name}, None)
            .await
        {
            Ok(_) => Ok(genre),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate {
                resource: "genre",
                field: "name",
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_genres(&self, ids: &[ObjectId]) -> StoreResult<Vec<Genre>> {
        self.find_all(GENRES, ids_filter(ids), None).await
    }

    async fn list_actors(&self) -> StoreResult<Vec<Actor>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        self.find_all(ACTORS, doc! {}, Some(options)).await
    }

    async fn create_actor(&self, actor: NewActor) -> StoreResult<Actor> {
        let actor = Actor {
            id: ObjectId::new(),
            first_name: actor.first_name,
            last_name: actor.last_name,
        };
        self.docs(ACTORS)
            .insert_one(
                doc! {
                    "_id": actor.id,
                    "first_name": &actor.first_name,
                    "last_name": &actor.last_name,
                },
                None,
            )
            .await?;
        Ok(actor)
    }

    async fn find_actors(&self, ids: &[ObjectId]) -> StoreResult<Vec<Actor>> {
        self.find_all(ACTORS, ids_filter(ids), None).await
    }

    async fn list_plays(&self, filter: &PlayFilter) -> StoreResult<Vec<Play>> {
        let options = FindOptions::builder().sort(doc! {"title": 1, "_id": 1}).build();
        self.find_all(PLAYS, play_query(filter), Some(options)).await
    }

    async fn get_play(&self, id: ObjectId) -> StoreResult<Option<Play>> {
        self.find_one(PLAYS, doc! {"_id": id}).await
    }

    async fn find_plays(&self, ids: &[ObjectId]) -> StoreResult<Vec<Play>> {
        self.find_all(PLAYS, ids_filter(ids), None).await
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
        self.docs(PLAYS)
            .insert_one(
                doc! {
                    "_id": play.id,
                    "title": &play.title,
                    "description": &play.description,
                    "genres": play.genres.clone(),
                    "actors": play.actors.clone(),
                    "image": bson::Bson::Null,
                },
                None,
            )
            .await?;
        Ok(play)
    }

    async fn replace_play(&self, play: &Play) -> StoreResult<bool> {
        self.replace_fields(
            PLAYS,
            play.id,
            doc! {
                "title": &play.title,
                "description": &play.description,
                "genres": play.genres.clone(),
                "actors": play.actors.clone(),
                "image": play.image.clone(),
            },
        )
        .await
    }
}

#[async_trait]
impl VenueStore for MongoStore {
    async fn list_halls(&self) -> StoreResult<Vec<TheatreHall>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        self.find_all(HALLS, doc! {}, Some(options)).await
    }

    async fn create_hall(&self, hall: NewHall) -> StoreResult<TheatreHall> {
        let hall = TheatreHall {
            id: ObjectId::new(),
            name: hall.name,
            rows: hall.rows,
            seats_in_row: hall.seats_in_row,
        };
        self.docs(HALLS)
            .insert_one(
                doc! {
                    "_id": hall.id,
                    "name": &hall.name,
                    "rows": hall.rows,
                    "seats_in_row": hall.seats_in_row,
                },
                None,
            )
            .await?;
        Ok(hall)
    }

    async fn find_halls(&self, ids: &[ObjectId]) -> StoreResult<Vec<TheatreHall>> {
        self.find_all(HALLS, ids_filter(ids), None).await
    }
}

#[async_trait]
impl PerformanceStore for MongoStore {
    async fn list_performances(
        &self,
        filter: &PerformanceFilter,
    ) -> StoreResult<Vec<Performance>> {
        let options = FindOptions::builder()
            .sort(doc! {"show_time": -1, "_id": -1})
            .build();
        self.find_all(PERFORMANCES, performance_query(filter), Some(options))
            .await
    }

    async fn get_performance(&self, id: ObjectId) -> StoreResult<Option<Performance>> {
        self.find_one(PERFORMANCES, doc! {"_id": id}).await
    }

    async fn find_performances(&self, ids: &[ObjectId]) -> StoreResult<Vec<Performance>> {
        self.find_all(PERFORMANCES, ids_filter(ids), None).await
    }

    async fn create_performance(&self, performance: NewPerformance) -> StoreResult<Performance> {
        let show_time = bson::DateTime::from_chrono(performance.show_time);
        let performance = Performance {
            id: ObjectId::new(),
            play_id: performance.play_id,
            theatre_hall_id: performance.theatre_hall_id,
            show_time: show_time.to_chrono(),
        };
        self.docs(PERFORMANCES)
            .insert_one(
                doc! {
                    "_id": performance.id,
                    "play": performance.play_id,
                    "theatre_hall": performance.theatre_hall_id,
                    "show_time": show_time,
                },
                None,
            )
            .await?;
        Ok(performance)
    }

    async fn replace_performance(&self, performance: &Performance) -> StoreResult<bool> {
        self.replace_fields(
            PERFORMANCES,
            performance.id,
            doc! {
                "play": performance.play_id,
                "theatre_hall": performance.theatre_hall_id,
                "show_time": bson::DateTime::from_chrono(performance.show_time),
            },
        )
        .await
    }

    async fn delete_performance(&self, id: ObjectId) -> StoreResult<bool> {
        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let outcome = match self.delete_with_tickets(&mut session, id).await {
                Ok(deleted) => session.commit_transaction().await.map(|()| deleted),
                Err(err) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        warn!(error = ?abort_err, "Failed to abort performance deletion");
                    }
                    Err(err)
                }
            };

            match outcome {
                Ok(Some(tickets)) => {
                    info!(performance = %id, tickets, "Deleted performance");
                    return Ok(true);
                }
                Ok(None) => return Ok(false),
                Err(err) if is_transient(&err) && attempt < TRANSACTION_ATTEMPTS => {
                    warn!(performance = %id, attempt, error = %err, "Retrying performance deletion");
                    back_off(attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn count_tickets(
        &self,
        performance_ids: &[ObjectId],
    ) -> StoreResult<HashMap<ObjectId, u64>> {
        let pipeline = vec![
            doc! {
                "$match": { "performance": { "$in": performance_ids.to_vec() } }
            },
            doc! {
                "$group": { "_id": "$performance", "count": { "$sum": 1 } }
            },
        ];

        let mut cursor = self.docs(TICKETS).aggregate(pipeline, None).await?;
        let mut counts = HashMap::new();
        while let Some(doc) = cursor.try_next().await? {
            let row: TicketCount = from_document(doc).map_err(MongoError::from)?;
            counts.insert(row.performance, u64::try_from(row.count).unwrap_or_default());
        }
        Ok(counts)
    }

    async fn taken_seats(&self, performance_id: ObjectId) -> StoreResult<Vec<Seat>> {
        let options = FindOptions::builder()
            .projection(doc! {"_id": 0, "row": 1, "seat": 1})
            .sort(doc! {"row": 1, "seat": 1})
            .build();
        self.find_all(TICKETS, doc! {"performance": performance_id}, Some(options))
            .await
    }
}

#[async_trait]
impl ReservationStore for MongoStore {
    async fn list_reservations(
        &self,
        user_id: ObjectId,
        offset: u64,
        limit: u64,
    ) -> StoreResult<(Vec<Reservation>, u64)> {
        let filter = doc! {"user": user_id};
        let total = self
            .docs(RESERVATIONS)
            .count_documents(filter.clone(), None)
            .await?;

        let options = FindOptions::builder()
            .sort(doc! {"created_at": -1, "_id": -1})
            .skip(offset)
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        let reservations = self.find_all(RESERVATIONS, filter, Some(options)).await?;

        Ok((reservations, total))
    }

    async fn find_tickets(&self, reservation_ids: &[ObjectId]) -> StoreResult<Vec<Ticket>> {
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        self.find_all(
            TICKETS,
            doc! {"reservation": {"$in": reservation_ids.to_vec()}},
            Some(options),
        )
        .await
    }

    async fn create_reservation(
        &self,
        user_id: ObjectId,
        tickets: &[NewTicket],
    ) -> StoreResult<(Reservation, Vec<Ticket>)> {
        let created_at = bson::DateTime::from_chrono(Utc::now());
        let reservation = Reservation {
            id: ObjectId::new(),
            created_at: created_at.to_chrono(),
            user_id,
        };
        let tickets: Vec<Ticket> = tickets
            .iter()
            .map(|t| Ticket {
                id: ObjectId::new(),
                row: t.row,
                seat: t.seat,
                performance_id: t.performance_id,
                reservation_id: reservation.id,
            })
            .collect();
        let ticket_docs: Vec<Document> = tickets
            .iter()
            .map(|t| {
                doc! {
                    "_id": t.id,
                    "row": t.row,
                    "seat": t.seat,
                    "performance": t.performance_id,
                    "reservation": t.reservation_id,
                }
            })
            .collect();

        let reservation_doc = doc! {
            "_id": reservation.id,
            "created_at": created_at,
            "user": user_id,
        };
        let mut performance_ids: Vec<ObjectId> = Vec::new();
        for ticket in &tickets {
            if !performance_ids.contains(&ticket.performance_id) {
                performance_ids.push(ticket.performance_id);
            }
        }

        let mut session = self.client.start_session(None).await?;
        let mut attempt = 1;
        loop {
            session.start_transaction(None).await?;
            let written = self
                .write_reservation(&mut session, &reservation_doc, &ticket_docs, &performance_ids)
                .await;
            let outcome = match written {
                Ok(()) => session.commit_transaction().await.map_err(StoreError::from),
                Err(err) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        warn!(error = ?abort_err, "Failed to abort reservation transaction");
                    }
                    Err(err)
                }
            };

            match outcome {
                Ok(()) => return Ok((reservation, tickets)),
                Err(StoreError::Database(err))
                    if is_transient(&err) && attempt < TRANSACTION_ATTEMPTS =>
                {
                    warn!(reservation = %reservation.id, attempt, error = %err, "Retrying reservation transaction");
                    back_off(attempt).await;
                    attempt += 1;
                }
                Err(StoreError::Database(err)) => return Err(seat_conflict(err, &tickets)),
                Err(other) => return Err(other),
            }
        }
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let user = User {
            id: ObjectId::new(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            is_staff: user.is_staff,
        };
        let result = self
            .docs(USERS)
            .insert_one(
                doc! {
                    "_id": user.id,
                    "email": &user.email,
                    "password_hash": &user.password_hash,
                    "first_name": &user.first_name,
                    "last_name": &user.last_name,
                    "is_staff": user.is_staff,
                },
                None,
            )
            .await;

        match result {
            Ok(_) => Ok(user),
            Err(e) if is_duplicate_key(&e) => Err(StoreError::Duplicate {
                resource: "user",
                field: "email",
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, id: ObjectId) -> StoreResult<Option<User>> {
        self.find_one(USERS, doc! {"_id": id}).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.find_one(USERS, doc! {"email": email}).await
    }

    async fn replace_user(&self, user: &User) -> StoreResult<bool> {
        let fields = doc! {
            "email": &user.email,
            "password_hash": &user.password_hash,
            "first_name": &user.first_name,
            "last_name": &user.last_name,
            "is_staff": user.is_staff,
        };
        match self.replace_fields(USERS, user.id, fields).await {
            Err(StoreError::Database(e)) if is_duplicate_key(&e) => Err(StoreError::Duplicate {
                resource: "user",
                field: "email",
            }),
            other => other,
        }
    }

    async fn get_or_create_token(
        &self,
        user_id: ObjectId,
        candidate: Token,
    ) -> StoreResult<Token> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let token = self
            .typed::<Token>(TOKENS)
            .find_one_and_update(
                doc! {"user": user_id},
                doc! {
                    "$setOnInsert": {
                        "key": &candidate.key,
                        "created": bson::DateTime::from_chrono(candidate.created),
                    }
                },
                options,
            )
            .await?;

        Ok(token.unwrap_or(candidate))
    }

    async fn find_user_by_token(&self, key: &str) -> StoreResult<Option<User>> {
        let pipeline = vec![
            doc! {
                "$match": { "key": key }
            },
            doc! {
                "$lookup": {
                    "from": USERS,
                    "localField": "user",
                    "foreignField": "_id",
                    "as": "user"
                }
            },
            doc! {
                "$unwind": { "path": "$user" }
            },
            doc! {
                "$replaceRoot": { "newRoot": "$user" }
            },
        ];

        let mut cursor = self.docs(TOKENS).aggregate(pipeline, None).await?;
        match cursor.try_next().await? {
            Some(doc) => Ok(Some(from_document(doc).map_err(MongoError::from)?)),
            None => Ok(None),
        }
    }
}
