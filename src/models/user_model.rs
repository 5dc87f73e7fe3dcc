use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::serialize_object_id;

pub const PASSWORD_MIN_LEN: usize = 5;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub is_staff: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_staff: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Token {
    pub key: String,
    #[serde(rename = "user")]
    pub user_id: ObjectId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Validated profile fields; the password is still plain text here.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    pub email: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Lowercased address when it has a local part and a dotted domain.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let well_formed = !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace);
    well_formed.then_some(email)
}

impl UserPayload {
    pub fn validate(self, partial: bool) -> Result<UserChanges, AppError> {
        let mut errors = FieldErrors::new();
        let mut changes = UserChanges::default();

        match self.email.as_deref() {
            None if !partial => errors.add("email", "This field is required."),
            None => {}
            Some(raw) => match normalize_email(raw) {
                Some(email) => changes.email = Some(email),
                None => errors.add("email", "Enter a valid email address."),
            },
        }

        match self.password {
            None if !partial => errors.add("password", "This field is required."),
            None => {}
            Some(password) if password.chars().count() < PASSWORD_MIN_LEN => errors.add(
                "password",
                format!("Ensure this field has at least {PASSWORD_MIN_LEN} characters."),
            ),
            Some(password) => changes.password = Some(password),
        }

        changes.first_name = self.first_name.map(|s| s.trim().to_string());
        changes.last_name = self.last_name.map(|s| s.trim().to_string());

        errors.into_result()?;
        Ok(changes)
    }
}
