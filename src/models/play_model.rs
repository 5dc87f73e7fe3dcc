use std::collections::HashMap;

use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::media::media_url;
use crate::utils::{parse_id_list, parse_object_ids, required_text, serialize_object_id, serialize_object_ids};

use super::{
    actor_model::{Actor, ActorResponse},
    genre_model::Genre,
};

const DESCRIPTION_MAX_LEN: usize = 10_000;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Play {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    #[serde(default, serialize_with = "serialize_object_ids")]
    pub genres: Vec<ObjectId>,
    #[serde(default, serialize_with = "serialize_object_ids")]
    pub actors: Vec<ObjectId>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PlayListItem {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub title: String,
    pub genres: Vec<String>,
    pub actors: Vec<String>,
    pub image: Option<String>,
}

impl PlayListItem {
    pub fn build(
        play: &Play,
        genres: &HashMap<ObjectId, Genre>,
        actors: &HashMap<ObjectId, Actor>,
    ) -> Self {
        PlayListItem {
            id: play.id,
            title: play.title.clone(),
            genres: play
                .genres
                .iter()
                .filter_map(|id| genres.get(id).map(|g| g.name.clone()))
                .collect(),
            actors: play
                .actors
                .iter()
                .filter_map(|id| actors.get(id).map(Actor::full_name))
                .collect(),
            image: play.image.as_deref().map(media_url),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayDetail {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub title: String,
    pub description: String,
    pub genres: Vec<Genre>,
    pub actors: Vec<ActorResponse>,
    pub image: Option<String>,
}

impl PlayDetail {
    pub fn build(play: Play, genres: Vec<Genre>, actors: Vec<Actor>) -> Self {
        PlayDetail {
            id: play.id,
            title: play.title,
            description: play.description,
            genres,
            actors: actors.into_iter().map(ActorResponse::from).collect(),
            image: play.image.as_deref().map(media_url),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlayImageResponse {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPlay {
    pub title: String,
    pub description: String,
    pub genres: Vec<ObjectId>,
    pub actors: Vec<ObjectId>,
}

/// Validated play fields; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct PlayChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genres: Option<Vec<ObjectId>>,
    pub actors: Option<Vec<ObjectId>>,
}

impl PlayChanges {
    pub fn apply(self, play: &mut Play) {
        if let Some(title) = self.title {
            play.title = title;
        }
        if let Some(description) = self.description {
            play.description = description;
        }
        if let Some(genres) = self.genres {
            play.genres = genres;
        }
        if let Some(actors) = self.actors {
            play.actors = actors;
        }
    }

    pub fn into_new_play(self) -> NewPlay {
        NewPlay {
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            genres: self.genres.unwrap_or_default(),
            actors: self.actors.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub genres: Option<Vec<String>>,
    pub actors: Option<Vec<String>>,
}

impl PlayPayload {
    /// Full validation requires every scalar field; partial only checks what was sent.
    pub fn validate(self, partial: bool) -> Result<PlayChanges, AppError> {
        let mut errors = FieldErrors::new();
        let mut changes = PlayChanges::default();

        if !partial || self.title.is_some() {
            changes.title = required_text(&mut errors, "title", self.title.as_deref(), 255);
        }
        if !partial || self.description.is_some() {
            changes.description = required_text(
                &mut errors,
                "description",
                self.description.as_deref(),
                DESCRIPTION_MAX_LEN,
            );
        }

        for (field, raw, target) in [
            ("genres", self.genres, &mut changes.genres),
            ("actors", self.actors, &mut changes.actors),
        ] {
            match raw {
                Some(raw) => match parse_object_ids(field, &raw) {
                    Ok(ids) => *target = Some(ids),
                    Err(AppError::Validation(field_errors)) => {
                        for message in field_errors.get(field).unwrap_or_default() {
                            errors.add(field, message.clone());
                        }
                    }
                    Err(other) => return Err(other),
                },
                None if !partial => *target = Some(Vec::new()),
                None => {}
            }
        }

        errors.into_result()?;
        Ok(changes)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlayFilter {
    pub title: Option<String>,
    pub genres: Vec<ObjectId>,
    pub actors: Vec<ObjectId>,
}

#[cfg(test)]
impl PlayFilter {
    /// Same predicate as the MongoDB play query, for the in-memory store.
    pub fn matches(&self, play: &Play) -> bool {
        let title_ok = self.title.as_ref().map_or(true, |needle| {
            play.title.to_lowercase().contains(&needle.to_lowercase())
        });
        let genres_ok =
            self.genres.is_empty() || play.genres.iter().any(|id| self.genres.contains(id));
        let actors_ok =
            self.actors.is_empty() || play.actors.iter().any(|id| self.actors.contains(id));

        title_ok && genres_ok && actors_ok
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PlayQuery {
    pub title: Option<String>,
    pub genres: Option<String>,
    pub actors: Option<String>,
}

impl PlayQuery {
    pub fn into_filter(self) -> Result<PlayFilter, AppError> {
        let genres = match self.genres.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_id_list("genres", raw)?,
            _ => Vec::new(),
        };
        let actors = match self.actors.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_id_list("actors", raw)?,
            _ => Vec::new(),
        };

        Ok(PlayFilter {
            title: self.title.filter(|t| !t.trim().is_empty()),
            genres,
            actors,
        })
    }
}
