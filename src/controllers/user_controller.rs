use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Json,
};
use tracing::info;

use crate::auth::{hash_password, new_token, verify_password, AuthUser};
use crate::error::{AppError, FieldErrors};
use crate::models::user_model::{
    normalize_email, CredentialsPayload, NewUser, TokenResponse, User, UserPayload,
};
use crate::state::AppState;

const BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";

pub async fn register(
    Extension(state): Extension<AppState>,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let Json(payload) = payload?;
    let changes = payload.validate(false)?;

    let (Some(email), Some(password)) = (changes.email, changes.password) else {
        return Err(AppError::validation("non_field_errors", "Email and password are required."));
    };

    let user = state
        .store
        .create_user(NewUser {
            email,
            password_hash: hash_password(password).await?,
            first_name: changes.first_name.unwrap_or_default(),
            last_name: changes.last_name.unwrap_or_default(),
            is_staff: false,
        })
        .await?;
    info!(user = %user.id, email = %user.email, "Registered user");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn obtain_token(
    Extension(state): Extension<AppState>,
    payload: Result<Json<CredentialsPayload>, JsonRejection>,
) -> Result<Json<TokenResponse>, AppError> {
    let Json(payload) = payload?;

    let mut errors = FieldErrors::new();
    if payload.email.as_deref().map_or(true, |e| e.trim().is_empty()) {
        errors.add("email", "This field is required.");
    }
    if payload.password.as_deref().map_or(true, str::is_empty) {
        errors.add("password", "This field is required.");
    }
    errors.into_result()?;

    let email = payload.email.as_deref().and_then(normalize_email);
    let password = payload.password.unwrap_or_default();

    let user = match email {
        Some(email) => state.store.find_user_by_email(&email).await?,
        None => None,
    };
    let Some(user) = user else {
        return Err(AppError::validation("non_field_errors", BAD_CREDENTIALS));
    };
    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(AppError::validation("non_field_errors", BAD_CREDENTIALS));
    }

    let token = state
        .store
        .get_or_create_token(user.id, new_token(&user))
        .await?;
    Ok(Json(TokenResponse { token: token.key }))
}

pub async fn load_me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

async fn apply_update(
    state: AppState,
    mut user: User,
    payload: UserPayload,
    partial: bool,
) -> Result<Json<User>, AppError> {
    let changes = payload.validate(partial)?;

    if let Some(email) = changes.email {
        if email != user.email {
            if state.store.find_user_by_email(&email).await?.is_some() {
                return Err(AppError::validation(
                    "email",
                    "user with this email already exists.",
                ));
            }
            user.email = email;
        }
    }
    if let Some(password) = changes.password {
        user.password_hash = hash_password(password).await?;
    }
    if let Some(first_name) = changes.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = changes.last_name {
        user.last_name = last_name;
    }

    if !state.store.replace_user(&user).await? {
        return Err(AppError::not_found("User"));
    }
    info!(user = %user.id, "Updated profile");
    Ok(Json(user))
}

pub async fn update_me(
    Extension(state): Extension<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, user, payload, false).await
}

pub async fn patch_me(
    Extension(state): Extension<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UserPayload>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(payload) = payload?;
    apply_update(state, user, payload, true).await
}
