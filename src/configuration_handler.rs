use crate::{catalog::ServiceCatalog, configuration::Configuration, schedule::Schedule};
use chrono::{NaiveDate, NaiveTime, Weekday};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "salon_booking", version, about = "Appointment slot booking for the salon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the booking server (default)
    Serve(ConfigurationHandler),
    /// Print the slots of one date
    Availability {
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        date: NaiveDate,
    },
    /// Book an appointment
    Book {
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long, value_parser = parse_time)]
        start: NaiveTime,
        #[arg(long)]
        service: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "")]
        notes: String,
    },
    /// Cancel an appointment
    Cancel {
        #[command(flatten)]
        server: ServerArgs,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Debug, Clone, Args)]
pub struct ServerArgs {
    /// Base URL of a running booking server
    #[arg(long, env = "BOOKING_SERVER", default_value = "http://localhost:3000")]
    pub server: String,
}

#[derive(Debug, Clone, Parser)]
pub struct ConfigurationHandler {
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// PostgreSQL URL; bookings are kept in memory when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[arg(long, env = "OPENING_TIME", default_value = "09:00", value_parser = parse_time)]
    opening: NaiveTime,

    #[arg(long, env = "CLOSING_TIME", default_value = "19:00", value_parser = parse_time)]
    closing: NaiveTime,

    #[arg(long, env = "SLOT_MINUTES", default_value_t = 30, value_parser = clap::value_parser!(u32).range(5..=240))]
    slot_minutes: u32,

    #[arg(long = "closed-day", env = "CLOSED_DAYS", value_delimiter = ',', default_value = "sun")]
    closed_days: Vec<Weekday>,

    #[arg(long, env = "BOOKING_HORIZON_DAYS", default_value_t = 60)]
    booking_horizon_days: u64,

    #[arg(long, env = "RETENTION_DAYS", default_value_t = 1)]
    retention_days: u64,

    /// JSON array of services replacing the built-in catalog
    #[arg(long = "services-file", env = "SERVICES_FILE", value_parser = parse_catalog)]
    services: Option<ServiceCatalog>,
}

fn parse_time(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|err| format!("expected HH:MM, got {value:?}: {err}"))
}

fn parse_catalog(value: &str) -> Result<ServiceCatalog, String> {
    ServiceCatalog::from_file(&PathBuf::from(value))
}

impl Cli {
    pub fn parse_arguments() -> Self {
        dotenvy::dotenv().ok();
        Self::parse()
    }
}

impl ConfigurationHandler {
    /// Configuration from environment variables and defaults only.
    pub fn from_env() -> Self {
        Self::parse_from(["salon_booking"])
    }
}

impl Configuration for ConfigurationHandler {
    fn port(&self) -> String {
        self.port.to_string()
    }

    fn database_url(&self) -> Option<String> {
        self.database_url.clone()
    }

    fn schedule(&self) -> Schedule {
        Schedule {
            opening: self.opening,
            closing: self.closing,
            slot_minutes: self.slot_minutes,
            closed_weekdays: self.closed_days.clone(),
        }
    }

    fn catalog(&self) -> ServiceCatalog {
        self.services.clone().unwrap_or_default()
    }

    fn booking_horizon_days(&self) -> u64 {
        self.booking_horizon_days
    }

    fn retention_days(&self) -> u64 {
        self.retention_days
    }
}
