use crate::{
    backend::SlotBackend,
    error::BookingError,
    types::{next_revision, Booking, BookingConfirmation, DayState, NewBooking},
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::error;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Day {
    bookings: HashMap<Uuid, Booking>,
    blocked: BTreeSet<NaiveTime>,
    last_updated: DateTime<Utc>,
}

impl Day {
    fn is_empty(&self) -> bool {
        self.bookings.is_empty() && self.blocked.is_empty()
    }

    fn touch(&mut self) -> DateTime<Utc> {
        self.last_updated = next_revision(self.last_updated);
        self.last_updated
    }
}

#[derive(Debug, Default)]
struct Slots {
    days: BTreeMap<NaiveDate, Day>,
    booking_dates: HashMap<Uuid, NaiveDate>,
}

/// Impersistent backend, used when no database is configured.
#[derive(Debug, Clone, Default)]
pub struct LocalSlots {
    slots: Arc<Mutex<Slots>>,
}

impl LocalSlots {
    fn lock(&self) -> Result<MutexGuard<'_, Slots>, BookingError> {
        self.slots.lock().map_err(|err| {
            error!(%err, "Slot storage lock poisoned");
            BookingError::StoragePoisoned
        })
    }
}

impl SlotBackend for LocalSlots {
    fn day(&self, date: NaiveDate) -> Result<DayState, BookingError> {
        let slots = self.lock()?;
        let Some(day) = slots.days.get(&date) else {
            return Ok(DayState::default());
        };

        let mut bookings: Vec<Booking> = day.bookings.values().cloned().collect();
        bookings.sort_unstable_by_key(|booking| booking.start);
        Ok(DayState {
            bookings,
            blocked: day.blocked.iter().copied().collect(),
            last_updated: day.last_updated,
        })
    }

    fn insert_booking(&self, booking: NewBooking) -> Result<BookingConfirmation, BookingError> {
        let mut slots = self.lock()?;
        let day = slots.days.entry(booking.date).or_default();

        if let Some(taken) = day
            .bookings
            .values()
            .filter(|existing| existing.overlaps(booking.start, booking.end))
            .map(|existing| existing.start.max(booking.start))
            .min()
        {
            return Err(BookingError::SlotTaken {
                date: booking.date,
                start: taken,
            });
        }
        if let Some(blocked) = day.blocked.range(booking.start..booking.end).next() {
            return Err(BookingError::SlotTaken {
                date: booking.date,
                start: *blocked,
            });
        }

        let booking = booking.into_booking();
        day.bookings.insert(booking.id, booking.clone());
        let last_updated = day.touch();
        slots.booking_dates.insert(booking.id, booking.date);

        Ok(BookingConfirmation {
            booking,
            last_updated,
        })
    }

    fn cancel_booking(&self, id: Uuid) -> Result<BookingConfirmation, BookingError> {
        let mut slots = self.lock()?;
        let date = slots
            .booking_dates
            .remove(&id)
            .ok_or(BookingError::BookingNotFound(id))?;
        let day = slots
            .days
            .get_mut(&date)
            .ok_or(BookingError::BookingNotFound(id))?;
        let booking = day
            .bookings
            .remove(&id)
            .ok_or(BookingError::BookingNotFound(id))?;

        Ok(BookingConfirmation {
            booking,
            last_updated: day.touch(),
        })
    }

    fn block_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        let mut slots = self.lock()?;
        let day = slots.days.entry(date).or_default();

        let booked = day.bookings.values().any(|booking| booking.covers(start));
        if booked || !day.blocked.insert(start) {
            return Err(BookingError::SlotTaken { date, start });
        }
        Ok(day.touch())
    }

    fn unblock_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        let mut slots = self.lock()?;
        match slots.days.get_mut(&date) {
            Some(day) if day.blocked.contains(&start) => {
                day.blocked.remove(&start);
                Ok(day.touch())
            }
            _ => Err(BookingError::SlotNotBlocked { date, start }),
        }
    }

    fn remove_all(&self) -> Result<Vec<NaiveDate>, BookingError> {
        let mut slots = self.lock()?;
        slots.booking_dates.clear();

        let mut changed = vec![];
        for (date, day) in slots.days.iter_mut() {
            if day.is_empty() {
                continue;
            }
            day.bookings.clear();
            day.blocked.clear();
            day.touch();
            changed.push(*date);
        }
        Ok(changed)
    }

    fn remove_before(&self, date: NaiveDate) -> Result<(), BookingError> {
        let mut slots = self.lock()?;
        let kept = slots.days.split_off(&date);
        let outdated = std::mem::replace(&mut slots.days, kept);

        for day in outdated.into_values() {
            for id in day.bookings.keys() {
                slots.booking_dates.remove(id);
            }
        }
        Ok(())
    }
}
