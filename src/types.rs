use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+?[0-9 ()/-]{6,20}$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub available: bool,
}

/// All slots of one calendar date together with the revision of the data they were
/// derived from. Revisions of a date only ever grow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub last_updated: DateTime<Utc>,
}

impl Availability {
    pub fn slot(&self, start: NaiveTime) -> Option<&Slot> {
        self.slots.iter().find(|slot| slot.start == start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub service: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn covers(&self, start: NaiveTime) -> bool {
        self.start <= start && start < self.end
    }

    pub fn overlaps(&self, start: NaiveTime, end: NaiveTime) -> bool {
        self.start < end && start < self.end
    }
}

/// A booking that passed the allocation rules and is ready to be stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub service: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub notes: String,
}

impl NewBooking {
    pub fn into_booking(self) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            date: self.date,
            start: self.start,
            end: self.end,
            service: self.service,
            customer_name: self.customer_name,
            customer_phone: self.customer_phone,
            notes: self.notes,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequest {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub service: String,
    #[validate(length(min = 1, max = 100))]
    pub customer_name: String,
    #[validate(regex(path = *PHONE_REGEX))]
    pub customer_phone: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking: Booking,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub start: NaiveTime,
}

/// Stored state of one date, independent of the opening hours.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayState {
    pub bookings: Vec<Booking>,
    pub blocked: Vec<NaiveTime>,
    pub last_updated: DateTime<Utc>,
}

impl DayState {
    pub fn is_occupied(&self, start: NaiveTime) -> bool {
        self.blocked.contains(&start) || self.bookings.iter().any(|booking| booking.covers(start))
    }
}

/// Revision of a date that has never been touched.
pub fn initial_revision() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Next revision after `previous`: the current time in whole milliseconds, but always
/// strictly later than `previous`.
pub fn next_revision(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now().timestamp_millis();
    let millis = now.max(previous.timestamp_millis() + 1);
    DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(previous)
}
