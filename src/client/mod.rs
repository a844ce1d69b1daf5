//! Client side of the booking flow: a per-date availability cache with optimistic
//! updates, and the HTTP binding to the booking server.

pub mod api;
pub mod booking_client;
pub mod cache;

pub use api::{ClientError, HttpSlotApi, SlotApi};
pub use booking_client::BookingClient;
pub use cache::{AvailabilityCache, PendingUpdate};
