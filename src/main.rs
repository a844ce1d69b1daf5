use std::time::Duration;

use salon_booking::{
    backend::SlotBackend,
    client::{BookingClient, HttpSlotApi},
    configuration::Configuration,
    configuration_handler::{Cli, Command, ConfigurationHandler},
    database_interface::DatabaseInterface,
    http::create_app,
    local_slots::LocalSlots,
    slot_manager::SlotManager,
    types::{Availability, BookingRequest},
};
use tokio::time::{interval, sleep};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse_arguments();
    let result = match cli.command {
        None => serve(ConfigurationHandler::from_env()).await,
        Some(Command::Serve(configuration)) => serve(configuration).await,
        Some(Command::Availability { server, date }) => {
            let client = BookingClient::new(HttpSlotApi::new(server.server));
            client
                .availability(date)
                .await
                .map(|availability| print_availability(&availability))
                .map_err(|err| err.to_string())
        }
        Some(Command::Book {
            server,
            date,
            start,
            service,
            name,
            phone,
            notes,
        }) => {
            let client = BookingClient::new(HttpSlotApi::new(server.server));
            let request = BookingRequest {
                date,
                start,
                service,
                customer_name: name,
                customer_phone: phone,
                notes,
            };
            match client.book(request).await {
                Ok(confirmation) => {
                    println!(
                        "Booked {} on {} from {} to {} (id {})",
                        confirmation.booking.service,
                        confirmation.booking.date,
                        confirmation.booking.start,
                        confirmation.booking.end,
                        confirmation.booking.id
                    );
                    if let Some(availability) = client.cached(date) {
                        print_availability(&availability);
                    }
                    Ok(())
                }
                Err(err) => Err(err.to_string()),
            }
        }
        Some(Command::Cancel { server, id }) => {
            let client = BookingClient::new(HttpSlotApi::new(server.server));
            client
                .cancel(id)
                .await
                .map(|confirmation| println!("Cancelled booking {}", confirmation.booking.id))
                .map_err(|err| err.to_string())
        }
    };

    if let Err(err) = result {
        error!(%err, "Exiting");
        std::process::exit(1);
    }
}

fn print_availability(availability: &Availability) {
    println!("{} (last updated {})", availability.date, availability.last_updated);
    if availability.slots.is_empty() {
        println!("  closed");
    }
    for slot in &availability.slots {
        let state = if slot.available { "free" } else { "taken" };
        println!("  {} - {}  {state}", slot.start, slot.end);
    }
}

async fn serve(configuration: ConfigurationHandler) -> Result<(), String> {
    println!("#################");
    println!("# Salon Booking #");
    println!("#################");

    let address = format!("0.0.0.0:{}", configuration.port());
    println!("Accessable at:\n{}", address.clone());
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|err| format!("Failed to bind {address}: {err}"))?;

    let app = if let Some(database_url) = configuration.database_url() {
        let backend = loop {
            match DatabaseInterface::new(&database_url) {
                Ok(backend) => {
                    info!("Successfully connected to database");
                    break backend;
                }
                Err(err) => {
                    error!(?err, "Failed to establish database connection: {database_url}. Retry in 1 sec. You may want to restart it with database disabled (impersistent bookings).");
                    sleep(Duration::from_secs(1)).await;
                }
            }
        };
        start(backend, &configuration)
    } else {
        start(LocalSlots::default(), &configuration)
    };

    axum::serve(listener, app)
        .await
        .map_err(|err| format!("Server error: {err}"))
}

fn start<B: SlotBackend>(backend: B, configuration: &ConfigurationHandler) -> axum::Router {
    let slot_manager = SlotManager::from_configuration(backend, configuration);
    spawn_cleanup(slot_manager.clone(), configuration.retention_days());
    create_app(slot_manager)
}

fn spawn_cleanup<B: SlotBackend>(slot_manager: SlotManager<B>, retention_days: u64) {
    tokio::spawn(async move {
        let mut ticker = interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            let slot_manager = slot_manager.clone();
            let result =
                tokio::task::spawn_blocking(move || slot_manager.cleanup(retention_days)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => error!(%err, "Cleanup of outdated days failed"),
                Err(err) => error!(%err, "Cleanup task panicked"),
            }
        }
    });
}
