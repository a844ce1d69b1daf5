use crate::{
    backend::SlotBackend,
    catalog::ServiceCatalog,
    configuration::Configuration,
    error::BookingError,
    schedule::Schedule,
    types::{Availability, Booking, BookingConfirmation, BookingRequest, NewBooking, Slot},
};
use chrono::{DateTime, Days, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Applies the salon's allocation rules on top of a [`SlotBackend`] and announces every
/// date whose availability changed.
#[derive(Clone)]
pub struct SlotManager<B: SlotBackend> {
    backend: B,
    schedule: Arc<Schedule>,
    catalog: Arc<ServiceCatalog>,
    booking_horizon: Days,
    changes: broadcast::Sender<NaiveDate>,
}

impl<B: SlotBackend> SlotManager<B> {
    pub fn new(
        backend: B,
        schedule: Schedule,
        catalog: ServiceCatalog,
        booking_horizon_days: u64,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            backend,
            schedule: Arc::new(schedule),
            catalog: Arc::new(catalog),
            booking_horizon: Days::new(booking_horizon_days),
            changes,
        }
    }

    pub fn from_configuration<C: Configuration>(backend: B, configuration: &C) -> Self {
        Self::new(
            backend,
            configuration.schedule(),
            configuration.catalog(),
            configuration.booking_horizon_days(),
        )
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NaiveDate> {
        self.changes.subscribe()
    }

    fn publish(&self, date: NaiveDate) {
        // No subscribers is not an error.
        if self.changes.send(date).is_err() {
            debug!(%date, "No availability subscribers");
        }
    }

    fn now() -> NaiveDateTime {
        Local::now().naive_local()
    }

    pub fn availability(&self, date: NaiveDate) -> Result<Availability, BookingError> {
        let day = self.backend.day(date)?;
        let now = Self::now();

        let slots = self
            .schedule
            .slot_starts(date)
            .into_iter()
            .map(|start| Slot {
                start,
                end: self.schedule.slot_end(start),
                available: !day.is_occupied(start) && date.and_time(start) > now,
            })
            .collect();

        Ok(Availability {
            date,
            slots,
            last_updated: day.last_updated,
        })
    }

    pub fn bookings(&self, date: NaiveDate) -> Result<Vec<Booking>, BookingError> {
        Ok(self.backend.day(date)?.bookings)
    }

    pub fn book(&self, request: BookingRequest) -> Result<BookingConfirmation, BookingError> {
        let (date, start) = (request.date, request.start);
        let service = self.catalog.get(&request.service)?;
        let slots_needed = self.schedule.slots_needed(service.duration_minutes);
        let starts = self.schedule.consecutive_slots(date, start, slots_needed)?;

        let now = Self::now();
        if date.and_time(start) <= now {
            warn!(%date, %start, "Rejected booking of passed slot");
            return Err(BookingError::SlotInPast { date, start });
        }
        if now.date().checked_add_days(self.booking_horizon) < Some(date) {
            warn!(%date, "Rejected booking beyond horizon");
            return Err(BookingError::BeyondHorizon(date));
        }

        let last_start = starts.last().copied().unwrap_or(start);
        let new_booking = NewBooking {
            date,
            start,
            end: self.schedule.slot_end(last_start),
            service: service.id.clone(),
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            notes: request.notes,
        };

        match self.backend.insert_booking(new_booking) {
            Ok(confirmation) => {
                info!(
                    id = %confirmation.booking.id,
                    %date,
                    %start,
                    service = %confirmation.booking.service,
                    "Booked appointment"
                );
                self.publish(date);
                Ok(confirmation)
            }
            Err(err) => {
                warn!(%date, %start, %err, "Booking rejected");
                Err(err)
            }
        }
    }

    pub fn cancel(&self, id: Uuid) -> Result<BookingConfirmation, BookingError> {
        let confirmation = self.backend.cancel_booking(id)?;
        info!(%id, date = %confirmation.booking.date, "Cancelled appointment");
        self.publish(confirmation.booking.date);
        Ok(confirmation)
    }

    pub fn block(&self, date: NaiveDate, start: NaiveTime) -> Result<DateTime<Utc>, BookingError> {
        self.schedule.consecutive_slots(date, start, 1)?;
        let last_updated = self.backend.block_slot(date, start)?;
        info!(%date, %start, "Blocked slot");
        self.publish(date);
        Ok(last_updated)
    }

    pub fn unblock(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        let last_updated = self.backend.unblock_slot(date, start)?;
        info!(%date, %start, "Unblocked slot");
        self.publish(date);
        Ok(last_updated)
    }

    pub fn remove_all(&self) -> Result<(), BookingError> {
        let changed = self.backend.remove_all()?;
        info!(dates = changed.len(), "Removed all bookings and blocked slots");
        for date in changed {
            self.publish(date);
        }
        Ok(())
    }

    /// Drops days that ended more than `retention_days` ago.
    pub fn cleanup(&self, retention_days: u64) -> Result<(), BookingError> {
        let today = Self::now().date();
        let Some(cutoff) = today.checked_sub_days(Days::new(retention_days)) else {
            return Ok(());
        };
        self.backend.remove_before(cutoff)?;
        debug!(%cutoff, "Removed outdated days");
        Ok(())
    }
}
