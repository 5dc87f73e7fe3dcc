use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::{required_text, serialize_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Genre {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct GenrePayload {
    pub name: Option<String>,
}

impl GenrePayload {
    /// Returns the trimmed genre name.
    pub fn validate(self) -> Result<String, AppError> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "name", self.name.as_deref(), 255);
        errors.into_result()?;
        Ok(name.unwrap_or_default())
    }
}
