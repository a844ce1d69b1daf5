use crate::client::api::ClientError;
use crate::types::Availability;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Handle of an optimistic update that has not been reconciled yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingUpdate {
    date: NaiveDate,
    token: u64,
}

impl PendingUpdate {
    pub fn date(&self) -> NaiveDate {
        self.date
    }
}

#[derive(Debug)]
struct Overlay {
    starts: Vec<NaiveTime>,
    /// Revision of the server data that contains the confirmed booking.
    confirmed_at: Option<DateTime<Utc>>,
}

/// Availability maps keyed by date, as last seen from the server, plus the slots this
/// client has optimistically taken on top of them.
///
/// Server snapshots are only replaced by snapshots that are at least as new. An overlay
/// lives until it is rolled back, or, once confirmed, until a snapshot arrives whose
/// revision already contains the booking.
#[derive(Debug, Default)]
pub struct AvailabilityCache {
    snapshots: HashMap<NaiveDate, Availability>,
    overlays: HashMap<NaiveDate, HashMap<u64, Overlay>>,
    next_token: u64,
}

impl AvailabilityCache {
    pub fn snapshot(&self, date: NaiveDate) -> Option<&Availability> {
        self.snapshots.get(&date)
    }

    /// The server snapshot with all pending overlays applied.
    pub fn view(&self, date: NaiveDate) -> Option<Availability> {
        let mut availability = self.snapshots.get(&date)?.clone();
        if let Some(overlays) = self.overlays.get(&date) {
            for slot in &mut availability.slots {
                if overlays
                    .values()
                    .any(|overlay| overlay.starts.contains(&slot.start))
                {
                    slot.available = false;
                }
            }
        }
        Some(availability)
    }

    /// Returns false if `availability` is older than the cached snapshot.
    pub fn store(&mut self, availability: Availability) -> bool {
        let date = availability.date;
        if let Some(cached) = self.snapshots.get(&date) {
            if availability.last_updated < cached.last_updated {
                debug!(
                    %date,
                    stale = %availability.last_updated,
                    cached = %cached.last_updated,
                    "Ignoring stale availability"
                );
                return false;
            }
        }

        if let Some(overlays) = self.overlays.get_mut(&date) {
            overlays.retain(|_, overlay| {
                overlay
                    .confirmed_at
                    .map_or(true, |revision| availability.last_updated < revision)
            });
            if overlays.is_empty() {
                self.overlays.remove(&date);
            }
        }

        self.snapshots.insert(date, availability);
        true
    }

    /// Marks `starts` as taken until the update is confirmed or rolled back.
    ///
    /// Fails without changing anything if one of the slots is not available in the
    /// current view.
    pub fn apply_optimistic(
        &mut self,
        date: NaiveDate,
        starts: &[NaiveTime],
    ) -> Result<PendingUpdate, ClientError> {
        if let Some(view) = self.view(date) {
            for start in starts {
                if !view.slot(*start).is_some_and(|slot| slot.available) {
                    return Err(ClientError::SlotUnavailable {
                        date,
                        start: *start,
                    });
                }
            }
        }

        let token = self.next_token;
        self.next_token += 1;
        self.overlays.entry(date).or_default().insert(
            token,
            Overlay {
                starts: starts.to_vec(),
                confirmed_at: None,
            },
        );
        Ok(PendingUpdate { date, token })
    }

    pub fn rollback(&mut self, update: PendingUpdate) {
        self.remove_overlay(update);
    }

    /// The server accepted the update; its effect is part of revision `last_updated`.
    pub fn confirm(&mut self, update: PendingUpdate, last_updated: DateTime<Utc>) {
        let covered = self
            .snapshots
            .get(&update.date)
            .is_some_and(|snapshot| snapshot.last_updated >= last_updated);
        if covered {
            self.remove_overlay(update);
            return;
        }

        if let Some(overlay) = self
            .overlays
            .get_mut(&update.date)
            .and_then(|overlays| overlays.get_mut(&update.token))
        {
            overlay.confirmed_at = Some(last_updated);
        }
    }

    pub fn invalidate(&mut self, date: NaiveDate) {
        self.snapshots.remove(&date);
    }

    pub fn pending(&self, date: NaiveDate) -> usize {
        self.overlays.get(&date).map_or(0, HashMap::len)
    }

    fn remove_overlay(&mut self, update: PendingUpdate) {
        if let Some(overlays) = self.overlays.get_mut(&update.date) {
            overlays.remove(&update.token);
            if overlays.is_empty() {
                self.overlays.remove(&update.date);
            }
        }
    }
}
