use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, FieldErrors};
use crate::utils::{required_text, serialize_object_id};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TheatreHall {
    #[serde(
        rename(serialize = "id", deserialize = "_id"),
        serialize_with = "serialize_object_id"
    )]
    pub id: ObjectId,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

impl TheatreHall {
    pub fn capacity(&self) -> i64 {
        i64::from(self.rows) * i64::from(self.seats_in_row)
    }

    /// Checks a seat coordinate against the hall layout, keyed by ticket field.
    pub fn check_seat(&self, row: i32, seat: i32) -> Result<(), (&'static str, String)> {
        if !(1..=self.rows).contains(&row) {
            return Err((
                "row",
                format!(
                    "row number must be in available range: (1, rows): (1, {})",
                    self.rows
                ),
            ));
        }
        if !(1..=self.seats_in_row).contains(&seat) {
            return Err((
                "seat",
                format!(
                    "seat number must be in available range: (1, seats_in_row): (1, {})",
                    self.seats_in_row
                ),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Debug)]
pub struct HallResponse {
    #[serde(serialize_with = "serialize_object_id")]
    pub id: ObjectId,
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
    pub capacity: i64,
}

impl From<TheatreHall> for HallResponse {
    fn from(hall: TheatreHall) -> Self {
        let capacity = hall.capacity();
        HallResponse {
            id: hall.id,
            name: hall.name,
            rows: hall.rows,
            seats_in_row: hall.seats_in_row,
            capacity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewHall {
    pub name: String,
    pub rows: i32,
    pub seats_in_row: i32,
}

#[derive(Deserialize, Debug)]
pub struct HallPayload {
    pub name: Option<String>,
    pub rows: Option<i64>,
    pub seats_in_row: Option<i64>,
}

fn positive_dimension(errors: &mut FieldErrors, field: &str, value: Option<i64>) -> Option<i32> {
    match value {
        None => {
            errors.add(field, "This field is required.");
            None
        }
        Some(v) if v < 1 => {
            errors.add(field, "Ensure this value is greater than or equal to 1.");
            None
        }
        Some(v) => match i32::try_from(v) {
            Ok(v) => Some(v),
            Err(_) => {
                errors.add(field, "A valid integer is required.");
                None
            }
        },
    }
}

impl HallPayload {
    pub fn validate(self) -> Result<NewHall, AppError> {
        let mut errors = FieldErrors::new();
        let name = required_text(&mut errors, "name", self.name.as_deref(), 255);
        let rows = positive_dimension(&mut errors, "rows", self.rows);
        let seats_in_row = positive_dimension(&mut errors, "seats_in_row", self.seats_in_row);
        errors.into_result()?;

        Ok(NewHall {
            name: name.unwrap_or_default(),
            rows: rows.unwrap_or_default(),
            seats_in_row: seats_in_row.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hall(rows: i32, seats_in_row: i32) -> TheatreHall {
        TheatreHall {
            id: ObjectId::new(),
            name: "Main".into(),
            rows,
            seats_in_row,
        }
    }

    #[test]
    fn capacity_is_rows_times_seats() {
        for (rows, seats) in [(1, 1), (5, 10), (20, 33), (i32::MAX, 2)] {
            assert_eq!(
                hall(rows, seats).capacity(),
                i64::from(rows) * i64::from(seats)
            );
        }
    }

    #[test]
    fn seat_bounds_are_inclusive() {
        let hall = hall(5, 10);
        assert!(hall.check_seat(1, 1).is_ok());
        assert!(hall.check_seat(5, 10).is_ok());
        assert_eq!(hall.check_seat(6, 1).unwrap_err().0, "row");
        assert_eq!(hall.check_seat(0, 1).unwrap_err().0, "row");
        assert_eq!(hall.check_seat(1, 11).unwrap_err().0, "seat");
        assert_eq!(hall.check_seat(1, -3).unwrap_err().0, "seat");
    }

    #[test]
    fn payload_rejects_non_positive_dimensions() {
        let payload = HallPayload {
            name: Some("Blue".into()),
            rows: Some(0),
            seats_in_row: Some(-2),
        };
        match payload.validate() {
            Err(AppError::Validation(errors)) => {
                assert!(errors.get("rows").is_some());
                assert!(errors.get("seats_in_row").is_some());
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
