use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::{required_text, serialize_object_id};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Actor {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub first_name: String,
    pub last_name: String,
}

impl Actor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Serialize)]
pub struct ActorResponse {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl From<Actor> for ActorResponse {
    fn from(actor: Actor) -> Self {
        let full_name = actor.full_name();
        ActorResponse {
            id: actor.id,
            first_name: actor.first_name,
            last_name: actor.last_name,
            full_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewActor {
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl ActorPayload {
    pub fn validate(self) -> Result<NewActor, AppError> {
        let mut errors = FieldErrors::new();
        let first_name = required_text(&mut errors, "first_name", self.first_name.as_deref(), 255);
        let last_name = required_text(&mut errors, "last_name", self.last_name.as_deref(), 255);
        errors.into_result()?;

        Ok(NewActor {
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
        })
    }
}
