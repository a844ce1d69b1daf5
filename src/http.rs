use crate::backend::SlotBackend;
use crate::catalog::Service;
use crate::error::BookingError;
use crate::slot_manager::SlotManager;
use crate::types::{Availability, Booking, BookingConfirmation, BookingRequest, SlotRequest};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{delete, get, post},
    Router,
};
use axum_valid::Valid;
use chrono::NaiveDate;
use futures::Stream;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState<T: SlotBackend> {
    pub slot_manager: SlotManager<T>,
}

pub fn create_app<T: SlotBackend>(slot_manager: SlotManager<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public = Router::new()
        .route("/services", get(get_services::<T>))
        .route("/availability/{date}", get(get_availability::<T>))
        .route("/availability/{date}/events", get(availability_events::<T>))
        .route("/bookings", post(book::<T>))
        .route("/bookings/{id}", delete(cancel_booking::<T>));

    let admin = Router::new()
        .route("/admin/bookings/{date}", get(get_bookings::<T>))
        .route("/admin/block", post(block_slot::<T>))
        .route("/admin/unblock", post(unblock_slot::<T>))
        .route("/admin/remove_all", post(remove_all::<T>));

    Router::new()
        .merge(public)
        .merge(admin)
        .with_state(AppState { slot_manager })
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn get_services<T: SlotBackend>(State(state): State<AppState<T>>) -> Json<Vec<Service>> {
    Json(state.slot_manager.catalog().services().to_vec())
}

async fn get_availability<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Availability>, BookingError> {
    state.slot_manager.availability(date).map(Json)
}

fn availability_event(availability: Result<Availability, BookingError>) -> Result<Event, axum::Error> {
    match availability {
        Ok(availability) => Event::default().event("availability").json_data(availability),
        Err(err) => Ok(Event::default().event("error").data(err.to_string())),
    }
}

/// Sends the current availability of `date`, then again after every change to it.
async fn availability_events<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Path(date): Path<NaiveDate>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let slot_manager = state.slot_manager;
    let changes = BroadcastStream::new(slot_manager.subscribe());
    let initial = availability_event(slot_manager.availability(date));

    let updates = changes.filter_map(move |change| match change {
        Ok(changed) if changed != date => None,
        // A lagging receiver may have missed a change of this date.
        _ => Some(availability_event(slot_manager.availability(date))),
    });

    Sse::new(tokio_stream::once(initial).chain(updates)).keep_alive(KeepAlive::default())
}

async fn book<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Valid(Json(request)): Valid<Json<BookingRequest>>,
) -> Result<(StatusCode, Json<BookingConfirmation>), BookingError> {
    let confirmation = state.slot_manager.book(request)?;
    Ok((StatusCode::CREATED, Json(confirmation)))
}

async fn cancel_booking<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingConfirmation>, BookingError> {
    state.slot_manager.cancel(id).map(Json)
}

async fn get_bookings<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Path(date): Path<NaiveDate>,
) -> Result<Json<Vec<Booking>>, BookingError> {
    state.slot_manager.bookings(date).map(Json)
}

async fn block_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Json(slot): Json<SlotRequest>,
) -> Result<impl IntoResponse, BookingError> {
    state.slot_manager.block(slot.date, slot.start)?;
    Ok((StatusCode::OK, "Slot blocked successfully".to_string()))
}

async fn unblock_slot<T: SlotBackend>(
    State(state): State<AppState<T>>,
    Json(slot): Json<SlotRequest>,
) -> Result<impl IntoResponse, BookingError> {
    state.slot_manager.unblock(slot.date, slot.start)?;
    Ok((StatusCode::OK, "Slot unblocked successfully".to_string()))
}

async fn remove_all<T: SlotBackend>(
    State(state): State<AppState<T>>,
) -> Result<impl IntoResponse, BookingError> {
    state.slot_manager.remove_all()?;
    Ok((
        StatusCode::OK,
        "All bookings and blocked slots removed successfully".to_string(),
    ))
}
