use crate::error::BookingError;
use crate::types::{BookingConfirmation, DayState, NewBooking};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

/// Storage of bookings and blocked slots.
///
/// Implementations know nothing about opening hours; they only guarantee that a slot
/// start is never covered by more than one booking or block, and that every successful
/// mutation moves the revision of the affected date forward.
pub trait SlotBackend: Clone + Send + Sync + 'static {
    fn day(&self, date: NaiveDate) -> Result<DayState, BookingError>;
    fn insert_booking(&self, booking: NewBooking) -> Result<BookingConfirmation, BookingError>;
    fn cancel_booking(&self, id: Uuid) -> Result<BookingConfirmation, BookingError>;
    fn block_slot(&self, date: NaiveDate, start: NaiveTime)
        -> Result<DateTime<Utc>, BookingError>;
    fn unblock_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError>;
    /// Returns the dates that changed.
    fn remove_all(&self) -> Result<Vec<NaiveDate>, BookingError>;
    fn remove_before(&self, date: NaiveDate) -> Result<(), BookingError>;
}
