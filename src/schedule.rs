use crate::error::BookingError;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

/// Opening hours of the salon and the length of a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub opening: NaiveTime,
    pub closing: NaiveTime,
    pub slot_minutes: u32,
    pub closed_weekdays: Vec<Weekday>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            opening: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            closing: NaiveTime::from_hms_opt(19, 0, 0).unwrap_or_default(),
            slot_minutes: 30,
            closed_weekdays: vec![Weekday::Sun],
        }
    }
}

impl Schedule {
    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.slot_minutes.max(1)))
    }

    pub fn is_closed(&self, date: NaiveDate) -> bool {
        self.closed_weekdays.contains(&date.weekday())
    }

    pub fn slot_end(&self, start: NaiveTime) -> NaiveTime {
        start + self.slot_duration()
    }

    /// Start times of all slots on `date`, in order.
    pub fn slot_starts(&self, date: NaiveDate) -> Vec<NaiveTime> {
        if self.is_closed(date) {
            return vec![];
        }

        let step = self.slot_duration();
        let mut starts = vec![];
        let mut start = self.opening;
        // NaiveTime arithmetic wraps at midnight, so compare against the remaining time.
        while self.closing.signed_duration_since(start) >= step {
            starts.push(start);
            start += step;
        }
        starts
    }

    /// Number of slots an appointment of `minutes` occupies.
    pub fn slots_needed(&self, minutes: u32) -> usize {
        let slot_minutes = self.slot_minutes.max(1);
        minutes.div_ceil(slot_minutes).max(1) as usize
    }

    /// The `count` consecutive slot starts beginning at `start`.
    pub fn consecutive_slots(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        count: usize,
    ) -> Result<Vec<NaiveTime>, BookingError> {
        if self.is_closed(date) {
            return Err(BookingError::ClosedDay(date));
        }

        let starts = self.slot_starts(date);
        let Some(index) = starts.iter().position(|slot_start| *slot_start == start) else {
            return Err(BookingError::InvalidSlot { date, start });
        };

        starts
            .get(index..index + count.max(1))
            .map(<[NaiveTime]>::to_vec)
            .ok_or(BookingError::OutsideOpeningHours { date, start })
    }
}
