use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("The salon is closed on {0}")]
    ClosedDay(NaiveDate),

    #[error("{start} is not the start of a slot on {date}")]
    InvalidSlot { date: NaiveDate, start: NaiveTime },

    #[error("Appointment starting at {start} on {date} does not end before closing time")]
    OutsideOpeningHours { date: NaiveDate, start: NaiveTime },

    #[error("Slot {start} on {date} already passed")]
    SlotInPast { date: NaiveDate, start: NaiveTime },

    #[error("{0} is beyond the booking horizon")]
    BeyondHorizon(NaiveDate),

    #[error("Slot {start} on {date} is already taken")]
    SlotTaken { date: NaiveDate, start: NaiveTime },

    #[error("Booking {0} does not exist")]
    BookingNotFound(Uuid),

    #[error("Slot {start} on {date} is not blocked")]
    SlotNotBlocked { date: NaiveDate, start: NaiveTime },

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Slot storage is unavailable")]
    StoragePoisoned,
}

impl BookingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::UnknownService(_)
            | BookingError::ClosedDay(_)
            | BookingError::InvalidSlot { .. }
            | BookingError::OutsideOpeningHours { .. }
            | BookingError::SlotInPast { .. }
            | BookingError::BeyondHorizon(_) => StatusCode::BAD_REQUEST,
            BookingError::SlotTaken { .. } => StatusCode::CONFLICT,
            BookingError::BookingNotFound(_) | BookingError::SlotNotBlocked { .. } => {
                StatusCode::NOT_FOUND
            }
            BookingError::Database(_) | BookingError::StoragePoisoned => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
