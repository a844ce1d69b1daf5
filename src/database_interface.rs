use crate::schema::{blocked_slots, bookings, slot_revisions};
use crate::{
    backend::SlotBackend,
    error::BookingError,
    types::{
        initial_revision, next_revision, Booking, BookingConfirmation, DayState, NewBooking,
    },
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::ConnectionError;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{error, warn};
use uuid::Uuid;

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookingRow {
    id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    service: String,
    customer_name: String,
    customer_phone: String,
    notes: String,
    created_at: DateTime<Utc>,
}

impl From<BookingRow> for Booking {
    fn from(row: BookingRow) -> Self {
        Booking {
            id: row.id,
            date: row.date,
            start: row.start_time,
            end: row.end_time,
            service: row.service,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            notes: row.notes,
            created_at: row.created_at,
        }
    }
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        BookingRow {
            id: booking.id,
            date: booking.date,
            start_time: booking.start,
            end_time: booking.end,
            service: booking.service.clone(),
            customer_name: booking.customer_name.clone(),
            customer_phone: booking.customer_phone.clone(),
            notes: booking.notes.clone(),
            created_at: booking.created_at,
        }
    }
}

fn revision(connection: &mut PgConnection, day: NaiveDate) -> QueryResult<DateTime<Utc>> {
    let last_updated = slot_revisions::table
        .find(day)
        .select(slot_revisions::last_updated)
        .first::<DateTime<Utc>>(connection)
        .optional()?;
    Ok(last_updated.unwrap_or_else(initial_revision))
}

fn bump_revision(connection: &mut PgConnection, day: NaiveDate) -> QueryResult<DateTime<Utc>> {
    let last_updated = next_revision(revision(connection, day)?);
    diesel::insert_into(slot_revisions::table)
        .values((
            slot_revisions::date.eq(day),
            slot_revisions::last_updated.eq(last_updated),
        ))
        .on_conflict(slot_revisions::date)
        .do_update()
        .set(slot_revisions::last_updated.eq(last_updated))
        .execute(connection)?;
    Ok(last_updated)
}

/// PostgreSQL backend. Run the migrations in `migrations/` before first use.
#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    fn lock(&self) -> Result<MutexGuard<'_, PgConnection>, BookingError> {
        self.connection.lock().map_err(|err| {
            error!(%err, "Database connection lock poisoned");
            BookingError::StoragePoisoned
        })
    }

    /// Concurrent writers touching the same slot are serialized by PostgreSQL; the loser
    /// of such a race sees the slot as taken.
    fn run_serializable<T, F>(
        &self,
        date: NaiveDate,
        start: NaiveTime,
        operation: F,
    ) -> Result<T, BookingError>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, BookingError>,
    {
        let mut connection = self.lock()?;
        connection
            .build_transaction()
            .serializable()
            .run(operation)
            .map_err(|err| match err {
                BookingError::Database(DieselError::DatabaseError(
                    DatabaseErrorKind::SerializationFailure,
                    _,
                )) => {
                    warn!(%date, %start, "Concurrent write on slot, rejecting");
                    BookingError::SlotTaken { date, start }
                }
                err => err,
            })
    }
}

impl SlotBackend for DatabaseInterface {
    fn day(&self, date: NaiveDate) -> Result<DayState, BookingError> {
        let mut connection = self.lock()?;
        connection
            .build_transaction()
            .repeatable_read()
            .read_only()
            .run(|connection| -> Result<DayState, BookingError> {
                let rows = bookings::table
                    .filter(bookings::date.eq(date))
                    .order(bookings::start_time.asc())
                    .select(BookingRow::as_select())
                    .load(connection)?;
                let blocked = blocked_slots::table
                    .filter(blocked_slots::date.eq(date))
                    .order(blocked_slots::start_time.asc())
                    .select(blocked_slots::start_time)
                    .load::<NaiveTime>(connection)?;

                Ok(DayState {
                    bookings: rows.into_iter().map(Booking::from).collect(),
                    blocked,
                    last_updated: revision(connection, date)?,
                })
            })
    }

    fn insert_booking(&self, booking: NewBooking) -> Result<BookingConfirmation, BookingError> {
        let (date, start) = (booking.date, booking.start);
        self.run_serializable(date, start, |connection| {
            let overlapping = bookings::table
                .filter(bookings::date.eq(booking.date))
                .filter(bookings::start_time.lt(booking.end))
                .filter(bookings::end_time.gt(booking.start))
                .order(bookings::start_time.asc())
                .select(bookings::start_time)
                .first::<NaiveTime>(connection)
                .optional()?;
            if let Some(existing) = overlapping {
                return Err(BookingError::SlotTaken {
                    date,
                    start: existing.max(start),
                });
            }

            let blocked = blocked_slots::table
                .filter(blocked_slots::date.eq(booking.date))
                .filter(blocked_slots::start_time.ge(booking.start))
                .filter(blocked_slots::start_time.lt(booking.end))
                .order(blocked_slots::start_time.asc())
                .select(blocked_slots::start_time)
                .first::<NaiveTime>(connection)
                .optional()?;
            if let Some(blocked) = blocked {
                return Err(BookingError::SlotTaken {
                    date,
                    start: blocked,
                });
            }

            let booking = booking.into_booking();
            diesel::insert_into(bookings::table)
                .values(BookingRow::from(&booking))
                .execute(connection)?;
            let last_updated = bump_revision(connection, date)?;

            Ok(BookingConfirmation {
                booking,
                last_updated,
            })
        })
    }

    fn cancel_booking(&self, id: Uuid) -> Result<BookingConfirmation, BookingError> {
        let mut connection = self.lock()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            let row = diesel::delete(bookings::table.find(id))
                .returning(BookingRow::as_returning())
                .get_result(connection)
                .optional()?
                .ok_or(BookingError::BookingNotFound(id))?;
            let last_updated = bump_revision(connection, row.date)?;

            Ok(BookingConfirmation {
                booking: row.into(),
                last_updated,
            })
        })
    }

    fn block_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        self.run_serializable(date, start, |connection| {
            let booked: i64 = bookings::table
                .filter(bookings::date.eq(date))
                .filter(bookings::start_time.le(start))
                .filter(bookings::end_time.gt(start))
                .count()
                .get_result(connection)?;
            if booked > 0 {
                return Err(BookingError::SlotTaken { date, start });
            }

            let inserted = diesel::insert_into(blocked_slots::table)
                .values((
                    blocked_slots::date.eq(date),
                    blocked_slots::start_time.eq(start),
                ))
                .on_conflict_do_nothing()
                .execute(connection)?;
            if inserted == 0 {
                return Err(BookingError::SlotTaken { date, start });
            }

            Ok(bump_revision(connection, date)?)
        })
    }

    fn unblock_slot(
        &self,
        date: NaiveDate,
        start: NaiveTime,
    ) -> Result<DateTime<Utc>, BookingError> {
        let mut connection = self.lock()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            let removed = diesel::delete(blocked_slots::table.find((date, start)))
                .execute(connection)?;
            if removed == 0 {
                return Err(BookingError::SlotNotBlocked { date, start });
            }
            Ok(bump_revision(connection, date)?)
        })
    }

    fn remove_all(&self) -> Result<Vec<NaiveDate>, BookingError> {
        let mut connection = self.lock()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            let mut dates: Vec<NaiveDate> = bookings::table
                .select(bookings::date)
                .distinct()
                .load(connection)?;
            dates.extend(
                blocked_slots::table
                    .select(blocked_slots::date)
                    .distinct()
                    .load::<NaiveDate>(connection)?,
            );
            dates.sort_unstable();
            dates.dedup();

            diesel::delete(bookings::table).execute(connection)?;
            diesel::delete(blocked_slots::table).execute(connection)?;
            for date in &dates {
                bump_revision(connection, *date)?;
            }
            Ok(dates)
        })
    }

    fn remove_before(&self, date: NaiveDate) -> Result<(), BookingError> {
        let mut connection = self.lock()?;
        connection.transaction::<_, BookingError, _>(|connection| {
            diesel::delete(bookings::table.filter(bookings::date.lt(date))).execute(connection)?;
            diesel::delete(blocked_slots::table.filter(blocked_slots::date.lt(date)))
                .execute(connection)?;
            diesel::delete(slot_revisions::table.filter(slot_revisions::date.lt(date)))
                .execute(connection)?;
            Ok(())
        })
    }
}
