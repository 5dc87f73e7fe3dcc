use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::serialize_object_id;

use super::{hall_model::HallResponse, hall_model::TheatreHall, play_model::PlayListItem};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Performance {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    #[serde(rename = "play", serialize_with = "serialize_object_id")]
    pub play_id: ObjectId,
    #[serde(rename = "theatre_hall", serialize_with = "serialize_object_id")]
    pub theatre_hall_id: ObjectId,
    #[serde(deserialize_with = "chrono_datetime_as_bson_datetime::deserialize")]
    pub show_time: DateTime<Utc>,
}

/// A single seat coordinate inside a hall.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Seat {
    pub row: i32,
    pub seat: i32,
}

/// Seats left for sale; never negative while tickets stay within the hall layout.
pub fn tickets_available(hall: &TheatreHall, tickets_sold: u64) -> i64 {
    hall.capacity() - i64::try_from(tickets_sold).unwrap_or(i64::MAX)
}

#[derive(Debug, Serialize)]
pub struct PerformanceListItem {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub show_time: DateTime<Utc>,
    pub play_title: String,
    pub play_image: Option<String>,
    pub theatre_hall_name: String,
    pub theatre_hall_capacity: i64,
    pub tickets_available: i64,
}

#[derive(Debug, Serialize)]
pub struct PerformanceDetail {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub show_time: DateTime<Utc>,
    pub play: PlayListItem,
    pub theatre_hall: HallResponse,
    pub tickets_available: i64,
    pub taken_places: Vec<Seat>,
}

#[derive(Debug, Clone)]
pub struct NewPerformance {
    pub play_id: ObjectId,
    pub theatre_hall_id: ObjectId,
    pub show_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PerformanceChanges {
    pub play_id: Option<ObjectId>,
    pub theatre_hall_id: Option<ObjectId>,
    pub show_time: Option<DateTime<Utc>>,
}

impl PerformanceChanges {
    pub fn apply(self, performance: &mut Performance) {
        if let Some(play_id) = self.play_id {
            performance.play_id = play_id;
        }
        if let Some(hall_id) = self.theatre_hall_id {
            performance.theatre_hall_id = hall_id;
        }
        if let Some(show_time) = self.show_time {
            performance.show_time = show_time;
        }
    }

    /// Only valid after a full (non-partial) validation.
    pub fn into_new_performance(self) -> Option<NewPerformance> {
        Some(NewPerformance {
            play_id: self.play_id?,
            theatre_hall_id: self.theatre_hall_id?,
            show_time: self.show_time?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct PerformancePayload {
    pub play: Option<String>,
    pub theatre_hall: Option<String>,
    pub show_time: Option<String>,
}

/// Accepts RFC 3339 timestamps; naive ones are taken as UTC.
pub fn parse_show_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_reference(errors: &mut FieldErrors, field: &str, raw: Option<&str>) -> Option<ObjectId> {
    match raw {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(raw) => match ObjectId::parse_str(raw.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                errors.add(field, format!("\"{raw}\" is not a valid id."));
                None
            }
        },
    }
}

impl PerformancePayload {
    pub fn validate(self, partial: bool) -> Result<PerformanceChanges, AppError> {
        let mut errors = FieldErrors::new();
        let mut changes = PerformanceChanges::default();

        if !partial || self.play.is_some() {
            changes.play_id = parse_reference(&mut errors, "play", self.play.as_deref());
        }
        if !partial || self.theatre_hall.is_some() {
            changes.theatre_hall_id =
                parse_reference(&mut errors, "theatre_hall", self.theatre_hall.as_deref());
        }
        if !partial || self.show_time.is_some() {
            match self.show_time.as_deref() {
                None => errors.add("show_time", "This field is required."),
                Some(raw) => match parse_show_time(raw) {
                    Some(show_time) => changes.show_time = Some(show_time),
                    None => errors.add(
                        "show_time",
                        "Datetime has wrong format. Use one of these formats instead: YYYY-MM-DDThh:mm[:ss][+HH:MM|Z].",
                    ),
                },
            }
        }

        errors.into_result()?;
        Ok(changes)
    }
}

#[derive(Debug, Default, Clone)]
pub struct PerformanceFilter {
    pub play_id: Option<ObjectId>,
    pub date: Option<NaiveDate>,
}

impl PerformanceFilter {
    /// Half-open UTC range covering the requested calendar date.
    pub fn day_bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = Utc.from_utc_datetime(&self.date?.and_hms_opt(0, 0, 0)?);
        Some((start, start + Duration::days(1)))
    }

    #[cfg(test)]
    pub fn matches(&self, performance: &Performance) -> bool {
        let play_ok = self.play_id.map_or(true, |id| performance.play_id == id);
        let date_ok = self
            .date
            .map_or(true, |date| performance.show_time.date_naive() == date);
        play_ok && date_ok
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct PerformanceQuery {
    pub play: Option<String>,
    pub date: Option<String>,
}

impl PerformanceQuery {
    pub fn into_filter(self) -> Result<PerformanceFilter, AppError> {
        let mut errors = FieldErrors::new();
        let mut filter = PerformanceFilter::default();

        if let Some(raw) = self.play.as_deref().filter(|s| !s.trim().is_empty()) {
            match ObjectId::parse_str(raw.trim()) {
                Ok(id) => filter.play_id = Some(id),
                Err(_) => errors.add("play", format!("\"{raw}\" is not a valid id.")),
            }
        }
        if let Some(raw) = self.date.as_deref().filter(|s| !s.trim().is_empty()) {
            match NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") {
                Ok(date) => filter.date = Some(date),
                Err(_) => errors.add("date", "Date has wrong format. Use YYYY-MM-DD."),
            }
        }

        errors.into_result()?;
        Ok(filter)
    }
}
