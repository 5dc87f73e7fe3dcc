//! Token authentication.
//!
//! Clients send `Authorization: Token <key>`. Handlers ask for [`AuthUser`] or
//! [`AdminUser`] and get the resolved account, or the request is rejected
//! before the handler runs.

use anyhow::anyhow;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::Utc;
use rand::RngCore;
use tracing::info;

use crate::config::AdminCredentials;
use crate::error::AppError;
use crate::models::user_model::{normalize_email, NewUser, Token, User};
use crate::state::AppState;
use crate::store::TheatreStore;

const TOKEN_SCHEME: &str = "Token";
const TOKEN_BYTES: usize = 20;

/// Any authenticated user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

/// An authenticated staff user.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

fn token_from_header(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Authentication credentials were not provided.".into()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid token header.".into()))?;

    match value.split_once(' ') {
        Some((scheme, key)) if scheme.eq_ignore_ascii_case(TOKEN_SCHEME) && !key.trim().is_empty() => {
            Ok(key.trim())
        }
        _ => Err(AppError::Auth(
            "Invalid token header. Expected 'Token <key>'.".into(),
        )),
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let key = token_from_header(parts)?;
        let state = parts
            .extensions
            .get::<AppState>()
            .ok_or_else(|| AppError::Internal(anyhow!("application state is not installed")))?;

        let user = state
            .store
            .find_user_by_token(key)
            .await?
            .ok_or_else(|| AppError::Auth("Invalid token.".into()))?;

        Ok(AuthUser(user))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(AppError::Forbidden(
                "You do not have permission to perform this action.".into(),
            ));
        }
        Ok(AdminUser(user))
    }
}

pub async fn hash_password(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .map_err(|e| AppError::Internal(e.into()))
}

/// 40 lowercase hex characters.
pub fn generate_token_key() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn new_token(user: &User) -> Token {
    Token {
        key: generate_token_key(),
        user_id: user.id,
        created: Utc::now(),
    }
}

/// Makes sure the configured administrator exists and is staff.
pub async fn ensure_admin(
    store: &dyn TheatreStore,
    credentials: &AdminCredentials,
) -> Result<User, AppError> {
    let email = normalize_email(&credentials.email)
        .ok_or_else(|| AppError::validation("email", "Enter a valid email address."))?;

    if let Some(mut existing) = store.find_user_by_email(&email).await? {
        if !existing.is_staff {
            existing.is_staff = true;
            store.replace_user(&existing).await?;
            info!(%email, "Promoted existing user to staff");
        }
        return Ok(existing);
    }

    let password_hash = hash_password(credentials.password.clone()).await?;
    let admin = store
        .create_user(NewUser {
            email,
            password_hash,
            first_name: String::new(),
            last_name: String::new(),
            is_staff: true,
        })
        .await?;
    info!(email = %admin.email, "Created administrator account");
    Ok(admin)
}
