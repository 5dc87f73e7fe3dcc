use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use image::{ImageFormat, Rgb, RgbImage};
use mongodb::bson::oid::ObjectId;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth::new_token;
use crate::build_router;
use crate::media::MediaStorage;
use crate::models::{
    actor_model::NewActor,
    hall_model::NewHall,
    performance_model::{parse_show_time, NewPerformance},
    play_model::NewPlay,
    user_model::NewUser,
};
use crate::state::AppState;
use crate::store::{memory::MemoryStore, CatalogStore, PerformanceStore, UserStore, VenueStore};

/// A decodable 2x2 PNG.
pub(crate) fn png_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(2, 2, Rgb([200, 30, 30]))
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

const BOUNDARY: &str = "theatre-test-boundary";

/// The full router over an in-memory store, with a staff account and a
/// regular customer already holding tokens.
pub(crate) struct TestApp {
    router: Router,
    pub store: Arc<MemoryStore>,
    pub admin_token: String,
    pub user_token: String,
    media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let media = tempfile::tempdir().unwrap();
        let state = AppState::new(store.clone(), MediaStorage::new(media.path()));

        let mut app = TestApp {
            router: build_router(state),
            store,
            admin_token: String::new(),
            user_token: String::new(),
            media,
        };
        app.admin_token = app.account("admin@theatre.test", true).await;
        app.user_token = app.account("customer@theatre.test", false).await;
        app
    }

    /// Creates an account directly in the store and returns its token.
    pub async fn account(&self, email: &str, is_staff: bool) -> String {
        let user = self
            .store
            .create_user(NewUser {
                email: email.to_string(),
                password_hash: "!".to_string(),
                first_name: String::new(),
                last_name: String::new(),
                is_staff,
            })
            .await
            .unwrap();
        self.store
            .get_or_create_token(user.id, new_token(&user))
            .await
            .unwrap()
            .key
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn media_root(&self) -> &Path {
        self.media.path()
    }

    pub async fn genre(&self, name: &str) -> String {
        self.store.create_genre(name).await.unwrap().id.to_hex()
    }

    pub async fn actor(&self, first_name: &str, last_name: &str) -> String {
        self.store
            .create_actor(NewActor {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
            })
            .await
            .unwrap()
            .id
            .to_hex()
    }

    pub async fn hall(&self, name: &str, rows: i32, seats_in_row: i32) -> String {
        self.store
            .create_hall(NewHall {
                name: name.to_string(),
                rows,
                seats_in_row,
            })
            .await
            .unwrap()
            .id
            .to_hex()
    }

    pub async fn play(&self, title: &str, genres: &[&String], actors: &[&String]) -> String {
        let ids = |raw: &[&String]| -> Vec<ObjectId> {
            raw.iter().map(|id| ObjectId::parse_str(id).unwrap()).collect()
        };
        self.store
            .create_play(NewPlay {
                title: title.to_string(),
                description: "A play.".to_string(),
                genres: ids(genres),
                actors: ids(actors),
            })
            .await
            .unwrap()
            .id
            .to_hex()
    }

    pub async fn performance(&self, play: &str, hall: &str, show_time: &str) -> String {
        self.store
            .create_performance(NewPerformance {
                play_id: ObjectId::parse_str(play).unwrap(),
                theatre_hall_id: ObjectId::parse_str(hall).unwrap(),
                show_time: parse_show_time(show_time).unwrap(),
            })
            .await
            .unwrap()
            .id
            .to_hex()
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::GET, path, token, None).await
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, path, token, Some(body)).await
    }

    pub async fn put(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, path, token, Some(body)).await
    }

    pub async fn patch(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, path, token, Some(body)).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.send(Method::DELETE, path, token, None).await
    }

    /// Posts `bytes` as the `image` field of a multipart form.
    pub async fn upload(
        &self,
        path: &str,
        token: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        self.dispatch(builder.body(Body::from(body)).unwrap()).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Token {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        self.dispatch(builder.body(body).unwrap()).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }
}
