use crate::{catalog::ServiceCatalog, schedule::Schedule};

pub trait Configuration: Clone + Send + Sync + 'static {
    fn port(&self) -> String;
    fn database_url(&self) -> Option<String>;
    fn schedule(&self) -> Schedule;
    fn catalog(&self) -> ServiceCatalog;
    fn booking_horizon_days(&self) -> u64;
    fn retention_days(&self) -> u64;
}
