use std::sync::Arc;

use anyhow::{anyhow, Context};
use axum::{
    extract::Extension,
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use shuttle_secrets::{SecretStore, Secrets};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

mod auth;
mod config;
mod controllers;
mod error;
mod media;
pub mod models;
mod pagination;
mod state;
mod store;
mod utils;

use config::Config;
use controllers::{
    actor_controller::*, genre_controller::*, hall_controller::*, performance_controller::*,
    play_controller::*, reservation_controller::*, user_controller::*,
};
use media::{MediaStorage, MEDIA_URL};
use state::AppState;
use store::{mongo::MongoStore, TheatreStore};

pub(crate) fn build_router(state: AppState) -> Router {
    let media_root = state.media.root().to_path_buf();

    Router::new()
        .route("/genres", get(load_genres).post(add_genre))
        .route("/actors", get(load_actors).post(add_actor))
        .route("/theatre-halls", get(load_halls).post(add_hall))
        .route("/plays", get(load_plays).post(add_play))
        .route(
            "/plays/:id",
            get(load_play).put(update_play).patch(patch_play),
        )
        .route("/plays/:id/upload-image", post(upload_play_image))
        .route("/performances", get(load_performances).post(add_performance))
        .route(
            "/performances/:id",
            get(load_performance)
                .put(update_performance)
                .patch(patch_performance)
                .delete(delete_performance),
        )
        .route("/reservations", get(load_reservations).post(add_reservation))
        .route("/users", post(register))
        .route("/token", post(obtain_token))
        .route("/users/me", get(load_me).put(update_me).patch(patch_me))
        .nest_service(MEDIA_URL, ServeDir::new(media_root))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

fn cors_layer(app_url: &str) -> anyhow::Result<CorsLayer> {
    let origin = app_url
        .parse::<HeaderValue>()
        .map_err(|e| anyhow!("APP_URL is not a valid origin: {e}"))?;

    Ok(CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_origin(origin)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

#[shuttle_runtime::main]
async fn main(#[Secrets] secret_store: SecretStore) -> shuttle_axum::ShuttleAxum {
    // Secrets come from `Secrets.toml`.
    let config = Config::from_lookup(|key| secret_store.get(key))?;

    let store = MongoStore::connect(&config.database_url, &config.database_name)
        .await
        .context("failed to connect to MongoDB")?;
    store
        .ensure_indexes()
        .await
        .context("failed to create MongoDB indexes")?;
    info!(database = %config.database_name, "Connected to MongoDB");

    let store: Arc<dyn TheatreStore> = Arc::new(store);
    if let Some(admin) = &config.admin {
        auth::ensure_admin(store.as_ref(), admin)
            .await
            .context("failed to bootstrap the administrator account")?;
    }

    tokio::fs::create_dir_all(&config.media_root)
        .await
        .with_context(|| format!("cannot create media root {}", config.media_root.display()))?;

    let state = AppState::new(store, MediaStorage::new(&config.media_root));
    let app = build_router(state).layer(cors_layer(&config.app_url)?);

    Ok(app.into())
}
