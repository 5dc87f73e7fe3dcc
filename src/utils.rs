use mongodb::bson::oid::ObjectId;
use serde::ser::SerializeSeq;
use serde::Serializer;

use crate::error::{AppError, FieldErrors};

pub fn serialize_object_id<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&id.to_hex())
}

pub fn serialize_object_ids<S>(ids: &[ObjectId], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(ids.len()))?;
    for id in ids {
        seq.serialize_element(&id.to_hex())?;
    }
    seq.end()
}

/// Parses a path segment, treating anything that is not an ObjectId as a miss.
pub fn parse_path_id(id_str: &str, resource: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id_str).map_err(|_| AppError::not_found(resource))
}

/// Parses hex ids from a payload field, reporting every malformed one.
pub fn parse_object_ids<S: AsRef<str>>(field: &str, raw: &[S]) -> Result<Vec<ObjectId>, AppError> {
    let mut errors = FieldErrors::new();
    let mut ids = Vec::with_capacity(raw.len());

    for value in raw {
        let value = value.as_ref().trim();
        match ObjectId::parse_str(value) {
            Ok(id) if !ids.contains(&id) => ids.push(id),
            Ok(_) => {}
            Err(_) => errors.add(field, format!("\"{value}\" is not a valid id.")),
        }
    }

    errors.into_result()?;
    Ok(ids)
}

/// Parses query parameters such as `?genres=a,b`.
pub fn parse_id_list(field: &str, raw: &str) -> Result<Vec<ObjectId>, AppError> {
    let parts: Vec<&str> = raw.split(',').filter(|s| !s.trim().is_empty()).collect();
    parse_object_ids(field, &parts)
}

/// Lowercase ASCII slug: word characters kept, whitespace and dashes collapsed to `-`.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for ch in value.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else if ch.is_whitespace() || ch == '-' {
            pending_dash = true;
        }
    }

    slug
}

/// Trims a required text field, recording an error when it is blank.
pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&str>,
    max_len: usize,
) -> Option<String> {
    match value.map(str::trim) {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some("") => {
            errors.add(field, "This field may not be blank.");
            None
        }
        Some(text) if text.chars().count() > max_len => {
            errors.add(
                field,
                format!("Ensure this field has no more than {max_len} characters."),
            );
            None
        }
        Some(text) => Some(text.to_string()),
    }
}
