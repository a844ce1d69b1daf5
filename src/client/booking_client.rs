use crate::catalog::Service;
use crate::client::api::{ClientError, SlotApi};
use crate::client::cache::{AvailabilityCache, PendingUpdate};
use crate::types::{Availability, BookingConfirmation, BookingRequest};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Books appointments with optimistic updates of the locally cached availability.
///
/// Every booking attempt ends with a fresh fetch of the affected date, whether the
/// server accepted it or not, so the cache converges to the server state even when
/// several clients race for the same slot.
pub struct BookingClient<A: SlotApi> {
    api: A,
    cache: Mutex<AvailabilityCache>,
    services: OnceCell<Vec<Service>>,
}

impl<A: SlotApi> BookingClient<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            cache: Mutex::default(),
            services: OnceCell::new(),
        }
    }

    fn cache(&self) -> MutexGuard<'_, AvailabilityCache> {
        lock(&self.cache)
    }

    /// Cached availability including this client's pending bookings.
    pub fn cached(&self, date: NaiveDate) -> Option<Availability> {
        self.cache().view(date)
    }

    pub async fn services(&self) -> Result<&[Service], ClientError> {
        self.services
            .get_or_try_init(|| self.api.services())
            .await
            .map(Vec::as_slice)
    }

    /// Fetches the availability of `date` from the server and updates the cache.
    pub async fn availability(&self, date: NaiveDate) -> Result<Availability, ClientError> {
        let fresh = self.api.availability(date).await?;
        let mut cache = self.cache();
        cache.store(fresh.clone());
        Ok(cache.view(date).unwrap_or(fresh))
    }

    async fn revalidate(&self, date: NaiveDate) {
        if let Err(err) = self.availability(date).await {
            warn!(%date, %err, "Failed to revalidate availability");
        }
    }

    pub async fn book(&self, request: BookingRequest) -> Result<BookingConfirmation, ClientError> {
        let date = request.date;
        let duration_minutes = self
            .services()
            .await?
            .iter()
            .find(|service| service.id == request.service)
            .map(|service| service.duration_minutes)
            .ok_or_else(|| ClientError::UnknownService(request.service.clone()))?;

        let cached = self.cache().snapshot(date).cloned();
        let availability = match cached {
            Some(availability) => availability,
            None => self.availability(date).await?,
        };
        let starts = targeted_slots(&availability, request.start, duration_minutes)?;

        let pending = self.cache().apply_optimistic(date, &starts);
        let pending = match pending {
            Ok(update) => OptimisticUpdate {
                cache: &self.cache,
                update: Some(update),
            },
            Err(err) => {
                debug!(%date, %err, "Slot unavailable in local view");
                self.revalidate(date).await;
                return Err(err);
            }
        };

        let result = self.api.book(&request).await;
        match &result {
            Ok(confirmation) => {
                info!(id = %confirmation.booking.id, %date, start = %request.start, "Booking confirmed");
                pending.confirm(confirmation.last_updated);
            }
            Err(err) => {
                warn!(%date, start = %request.start, %err, "Booking failed, rolling back");
                drop(pending);
            }
        }

        self.revalidate(date).await;
        result
    }

    pub async fn cancel(&self, id: Uuid) -> Result<BookingConfirmation, ClientError> {
        let confirmation = self.api.cancel(id).await?;
        info!(%id, date = %confirmation.booking.date, "Booking cancelled");
        self.revalidate(confirmation.booking.date).await;
        Ok(confirmation)
    }
}

fn lock(cache: &Mutex<AvailabilityCache>) -> MutexGuard<'_, AvailabilityCache> {
    // The cache is only ever mutated by single, non-panicking calls.
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An optimistic overlay that is rolled back when dropped unconfirmed, including when
/// the booking future is cancelled while waiting for the server.
struct OptimisticUpdate<'a> {
    cache: &'a Mutex<AvailabilityCache>,
    update: Option<PendingUpdate>,
}

impl OptimisticUpdate<'_> {
    fn confirm(mut self, last_updated: DateTime<Utc>) {
        if let Some(update) = self.update.take() {
            lock(self.cache).confirm(update, last_updated);
        }
    }
}

impl Drop for OptimisticUpdate<'_> {
    fn drop(&mut self) {
        if let Some(update) = self.update.take() {
            debug!(date = %update.date(), "Rolling back optimistic update");
            lock(self.cache).rollback(update);
        }
    }
}

/// Slot starts covered by an appointment of `duration_minutes` beginning at `start`.
fn targeted_slots(
    availability: &Availability,
    start: NaiveTime,
    duration_minutes: u32,
) -> Result<Vec<NaiveTime>, ClientError> {
    let invalid = || ClientError::InvalidSlot {
        date: availability.date,
        start,
    };

    let index = availability
        .slots
        .iter()
        .position(|slot| slot.start == start)
        .ok_or_else(invalid)?;
    let slot_minutes = (availability.slots[index].end - start).num_minutes().max(1);
    let count = (i64::from(duration_minutes) + slot_minutes - 1) / slot_minutes;
    let count = usize::try_from(count.max(1)).map_err(|_| invalid())?;

    availability
        .slots
        .get(index..index + count)
        .map(|slots| slots.iter().map(|slot| slot.start).collect())
        .ok_or_else(invalid)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ServiceCatalog;
    use crate::client::api::{HttpSlotApi, MockSlotApi};
    use crate::local_slots::LocalSlots;
    use crate::schedule::Schedule;
    use crate::slot_manager::SlotManager;
    use crate::testutils::{booking_request, spawn_app};
    use crate::types::{Booking, NewBooking, Slot};
    use async_trait::async_trait;
    use chrono::{Duration, Local};
    use mockall::Sequence;
    use tokio::time::timeout;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 5, 6).unwrap()
    }

    fn revision(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::default() + Duration::seconds(seconds)
    }

    fn availability(taken: &[NaiveTime], last_updated: DateTime<Utc>) -> Availability {
        let slots = (9..12)
            .flat_map(|hour| [at(hour, 0), at(hour, 30)])
            .map(|start| Slot {
                start,
                end: start + Duration::minutes(30),
                available: !taken.contains(&start),
            })
            .collect();
        Availability {
            date: date(),
            slots,
            last_updated,
        }
    }

    fn confirmation(start: NaiveTime, end: NaiveTime, last_updated: DateTime<Utc>) -> BookingConfirmation {
        let booking: Booking = NewBooking {
            date: date(),
            start,
            end,
            service: "gel-manicure".into(),
            customer_name: "Stefan".into(),
            customer_phone: "+43 660 1234567".into(),
            notes: String::new(),
        }
        .into_booking();
        BookingConfirmation {
            booking,
            last_updated,
        }
    }

    fn mock_api() -> MockSlotApi {
        let mut api = MockSlotApi::new();
        api.expect_services()
            .returning(|| Ok(ServiceCatalog::default().services().to_vec()));
        api
    }

    #[test]
    fn test_targeted_slots() {
        let availability = availability(&[], revision(1));
        assert_eq!(
            targeted_slots(&availability, at(10, 0), 30).unwrap(),
            vec![at(10, 0)]
        );
        assert_eq!(
            targeted_slots(&availability, at(10, 0), 90).unwrap(),
            vec![at(10, 0), at(10, 30), at(11, 0)]
        );
        assert!(matches!(
            targeted_slots(&availability, at(11, 30), 60),
            Err(ClientError::InvalidSlot { .. })
        ));
        assert!(matches!(
            targeted_slots(&availability, at(10, 10), 30),
            Err(ClientError::InvalidSlot { .. })
        ));
    }

    #[tokio::test]
    async fn test_successful_booking_is_confirmed_and_revalidated() {
        let mut api = mock_api();
        let mut sequence = Sequence::new();
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(availability(&[], revision(1))));
        api.expect_book()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(confirmation(at(10, 0), at(11, 0), revision(2))));
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(availability(&[at(10, 0), at(10, 30)], revision(2))));

        let client = BookingClient::new(api);
        let confirmation = client
            .book(booking_request(date(), at(10, 0), "gel-manicure"))
            .await
            .unwrap();
        assert_eq!(confirmation.last_updated, revision(2));

        let cached = client.cached(date()).unwrap();
        assert_eq!(cached.last_updated, revision(2));
        assert!(!cached.slot(at(10, 0)).unwrap().available);
        assert!(!cached.slot(at(10, 30)).unwrap().available);
        assert!(cached.slot(at(11, 0)).unwrap().available);
        assert_eq!(client.cache().pending(date()), 0);
    }

    #[tokio::test]
    async fn test_rejected_booking_is_rolled_back_and_revalidated() {
        let mut api = mock_api();
        let mut sequence = Sequence::new();
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(availability(&[], revision(1))));
        api.expect_book()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(ClientError::Conflict("Slot already taken".into())));
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(availability(&[at(9, 0)], revision(3))));

        let client = BookingClient::new(api);
        let err = client
            .book(booking_request(date(), at(9, 0), "classic-manicure"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let cached = client.cached(date()).unwrap();
        assert_eq!(cached.last_updated, revision(3));
        assert!(!cached.slot(at(9, 0)).unwrap().available);
        assert!(cached.slot(at(9, 30)).unwrap().available);
        assert_eq!(client.cache().pending(date()), 0);
    }

    #[tokio::test]
    async fn test_failed_revalidation_does_not_mask_booking_result() {
        let mut api = mock_api();
        let mut sequence = Sequence::new();
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(availability(&[], revision(1))));
        api.expect_book()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(confirmation(at(9, 0), at(9, 30), revision(2))));
        api.expect_availability()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| {
                Err(ClientError::Rejected {
                    status: 500,
                    message: "Slot storage is unavailable".into(),
                })
            });

        let client = BookingClient::new(api);
        client
            .book(booking_request(date(), at(9, 0), "classic-manicure"))
            .await
            .unwrap();

        // The confirmed booking stays visible until fresh data arrives.
        let cached = client.cached(date()).unwrap();
        assert_eq!(cached.last_updated, revision(1));
        assert!(!cached.slot(at(9, 0)).unwrap().available);
        assert_eq!(client.cache().pending(date()), 1);
    }

    /// Never answers booking requests.
    struct StalledBookingApi;

    #[async_trait]
    impl SlotApi for StalledBookingApi {
        async fn services(&self) -> Result<Vec<Service>, ClientError> {
            Ok(ServiceCatalog::default().services().to_vec())
        }

        async fn availability(&self, _date: NaiveDate) -> Result<Availability, ClientError> {
            Ok(availability(&[], revision(1)))
        }

        async fn book(&self, _request: &BookingRequest) -> Result<BookingConfirmation, ClientError> {
            std::future::pending().await
        }

        async fn cancel(&self, _id: Uuid) -> Result<BookingConfirmation, ClientError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_booking_is_rolled_back() {
        let client = BookingClient::new(StalledBookingApi);
        let result = timeout(
            std::time::Duration::from_millis(50),
            client.book(booking_request(date(), at(9, 0), "gel-manicure")),
        )
        .await;
        assert!(result.is_err());

        assert_eq!(client.cache().pending(date()), 0);
        let cached = client.cached(date()).unwrap();
        assert!(cached.slot(at(9, 0)).unwrap().available);
        assert!(cached.slot(at(9, 30)).unwrap().available);

        let result = timeout(
            std::time::Duration::from_millis(50),
            client.book(booking_request(date(), at(9, 0), "gel-manicure")),
        )
        .await;
        assert!(result.is_err(), "booking was rejected locally");
        assert_eq!(client.cache().pending(date()), 0);
    }

    #[tokio::test]
    async fn test_locally_unavailable_slot_is_not_submitted() {
        let mut api = mock_api();
        api.expect_availability()
            .times(2)
            .returning(|_| Ok(availability(&[at(11, 0)], revision(1))));
        api.expect_book().never();

        let client = BookingClient::new(api);
        let err = client
            .book(booking_request(date(), at(10, 30), "gel-manicure"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::SlotUnavailable { start, .. } if start == at(11, 0)));
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_submitted() {
        let mut api = mock_api();
        api.expect_availability().never();
        api.expect_book().never();

        let client = BookingClient::new(api);
        let err = client
            .book(booking_request(date(), at(10, 0), "haircut"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownService(_)));
    }

    #[tokio::test]
    async fn test_two_clients_race_for_one_slot() {
        let slot_manager = SlotManager::new(
            LocalSlots::default(),
            Schedule {
                closed_weekdays: vec![],
                ..Schedule::default()
            },
            ServiceCatalog::default(),
            60,
        );
        let (server, address) = spawn_app(slot_manager).await;
        let day = Local::now().date_naive() + Duration::days(7);

        let first = BookingClient::new(HttpSlotApi::new(address.clone()));
        let second = BookingClient::new(HttpSlotApi::new(format!("{address}/")));
        first.availability(day).await.unwrap();
        second.availability(day).await.unwrap();

        let confirmation = first
            .book(booking_request(day, at(10, 0), "gel-manicure"))
            .await
            .unwrap();

        // The second client still believes the slot is free.
        assert!(second.cached(day).unwrap().slot(at(10, 0)).unwrap().available);
        let err = second
            .book(booking_request(day, at(10, 30), "classic-manicure"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Conflict(_)));

        for client in [&first, &second] {
            let cached = client.cached(day).unwrap();
            assert_eq!(cached.last_updated, confirmation.last_updated);
            assert!(!cached.slot(at(10, 0)).unwrap().available);
            assert!(!cached.slot(at(10, 30)).unwrap().available);
            assert!(cached.slot(at(11, 0)).unwrap().available);
        }

        let cancelled = second.cancel(confirmation.booking.id).await.unwrap();
        assert_eq!(cancelled.booking.id, confirmation.booking.id);
        assert!(second.cached(day).unwrap().slot(at(10, 0)).unwrap().available);

        second
            .book(booking_request(day, at(10, 30), "classic-manicure"))
            .await
            .unwrap();

        server.abort();
    }
}
