use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    backend::SlotBackend,
    error::BookingError,
    http::create_app,
    slot_manager::SlotManager,
    types::{next_revision, BookingConfirmation, BookingRequest, DayState, NewBooking},
};

/// Serves the app on an ephemeral port and returns its base URL.
pub async fn spawn_app<T: SlotBackend>(slot_manager: SlotManager<T>) -> (JoinHandle<()>, String) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = format!("http://{}", listener.local_addr().unwrap());
    let app = create_app(slot_manager);
    let server = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (server, address)
}

pub fn booking_request(date: NaiveDate, start: NaiveTime, service: &str) -> BookingRequest {
    BookingRequest {
        date,
        start,
        service: service.into(),
        customer_name: "Stefan".into(),
        customer_phone: "+43 660 1234567".into(),
        notes: String::new(),
    }
}

pub struct MockSlotBackendInner {
    pub success: AtomicBool,
    pub calls_to_day: AtomicU64,
    pub calls_to_insert_booking: AtomicU64,
    pub calls_to_cancel_booking: AtomicU64,
    pub calls_to_block_slot: AtomicU64,
    pub calls_to_unblock_slot: AtomicU64,
    pub calls_to_remove_all: AtomicU64,
    pub day: Mutex<DayState>,
}

/// Counts calls and fails every mutation while `success` is false.
#[derive(Clone)]
pub struct MockSlotBackend(pub Arc<MockSlotBackendInner>);

impl MockSlotBackendInner {
    fn new() -> Self {
        Self {
            success: AtomicBool::new(true),
            calls_to_day: AtomicU64::default(),
            calls_to_insert_booking: AtomicU64::default(),
            calls_to_cancel_booking: AtomicU64::default(),
            calls_to_block_slot: AtomicU64::default(),
            calls_to_unblock_slot: AtomicU64::default(),
            calls_to_remove_all: AtomicU64::default(),
            day: Mutex::default(),
        }
    }
}

impl MockSlotBackend {
    pub fn new() -> Self {
        Self(Arc::new(MockSlotBackendInner::new()))
    }

    fn result(&self) -> Result<DateTime<Utc>, BookingError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(next_revision(Utc::now())),
            false => Err(BookingError::StoragePoisoned),
        }
    }
}

impl SlotBackend for MockSlotBackend {
    fn day(&self, _date: NaiveDate) -> Result<DayState, BookingError> {
        self.0.calls_to_day.fetch_add(1, Ordering::SeqCst);
        Ok(self.0.day.lock().unwrap().clone())
    }

    fn insert_booking(&self, booking: NewBooking) -> Result<BookingConfirmation, BookingError> {
        self.0.calls_to_insert_booking.fetch_add(1, Ordering::SeqCst);
        let last_updated = self.result()?;
        Ok(BookingConfirmation {
            booking: booking.into_booking(),
            last_updated,
        })
    }

    fn cancel_booking(&self, id: Uuid) -> Result<BookingConfirmation, BookingError> {
        self.0.calls_to_cancel_booking.fetch_add(1, Ordering::SeqCst);
        let last_updated = self.result()?;
        let mut booking = NewBooking {
            date: Utc::now().date_naive(),
            start: NaiveTime::default(),
            end: NaiveTime::default(),
            service: String::new(),
            customer_name: String::new(),
            customer_phone: String::new(),
            notes: String::new(),
        }
        .into_booking();
        booking.id = id;
        Ok(BookingConfirmation {
            booking,
            last_updated,
        })
    }

    fn block_slot(
        &self,
        _date: NaiveDate,
        _start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        self.0.calls_to_block_slot.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn unblock_slot(
        &self,
        _date: NaiveDate,
        _start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        self.0.calls_to_unblock_slot.fetch_add(1, Ordering::SeqCst);
        self.result()
    }

    fn remove_all(&self) -> Result<Vec<NaiveDate>, BookingError> {
        self.0.calls_to_remove_all.fetch_add(1, Ordering::SeqCst);
        self.result().map(|_| vec![])
    }

    fn remove_before(&self, _date: NaiveDate) -> Result<(), BookingError> {
        self.result().map(|_| ())
    }
}
