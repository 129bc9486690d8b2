use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::{BookingStore, CascadeReport, CommitOutcome, ShowtimeQuery};
use crate::error::{BookingError, BookingResult};
use crate::models::{
    Cinema, Movie, PricingPolicy, ReservedSeat, SeatId, SeatMap, Showtime, Theater, Ticket,
};

#[derive(sqlx::FromRow)]
struct TheaterRow {
    id: Uuid,
    cinema_id: Uuid,
    number: i32,
    last_row: String,
    seat_columns: i32,
    pricing: Option<Json<PricingPolicy>>,
}

impl From<TheaterRow> for Theater {
    fn from(row: TheaterRow) -> Self {
        Theater {
            id: row.id,
            cinema_id: row.cinema_id,
            number: row.number,
            seat_map: SeatMap {
                last_row: row.last_row,
                columns: row.seat_columns.max(0) as u32,
            },
            pricing: row.pricing.map(|Json(policy)| policy),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: Uuid,
    movie_id: Uuid,
    theater_id: Uuid,
    start_time: DateTime<Utc>,
    is_release: bool,
}

#[derive(sqlx::FromRow)]
struct ReservedSeatRow {
    showtime_id: Uuid,
    seat_row: String,
    seat_number: i32,
    user_id: String,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    showtime_id: Uuid,
    user_id: String,
    seats: Vec<String>,
    seat_total: i32,
    service_fee: i32,
    total_price: i32,
    payment_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Ticket {
            id: row.id,
            showtime_id: row.showtime_id,
            user_id: row.user_id,
            // labels are written by this store, so anything unparsable is skipped
            seats: row.seats.iter().filter_map(|s| s.parse().ok()).collect(),
            seat_total: row.seat_total.max(0) as u32,
            service_fee: row.service_fee.max(0) as u32,
            total_price: row.total_price.max(0) as u32,
            payment_id: row.payment_id,
            created_at: row.created_at,
        }
    }
}

const SHOWTIME_COLUMNS: &str = "id, movie_id, theater_id, start_time, is_release";
const TICKET_COLUMNS: &str =
    "id, showtime_id, user_id, seats, seat_total, service_fee, total_price, payment_id, created_at";

/// Postgres-backed store.
///
/// Reservations lock the showtime row (`FOR UPDATE`) for the check and insert, and
/// the `reserved_seats` primary key rejects any seat sold twice even if two
/// processes race past their checks.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, pool_size: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    async fn attach_seats(&self, rows: Vec<ShowtimeRow>) -> BookingResult<Vec<Showtime>> {
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let seat_rows: Vec<ReservedSeatRow> = sqlx::query_as(
            "SELECT showtime_id, seat_row, seat_number, user_id
             FROM reserved_seats
             WHERE showtime_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_showtime: HashMap<Uuid, Vec<ReservedSeat>> = HashMap::new();
        for seat in seat_rows {
            by_showtime.entry(seat.showtime_id).or_default().push(ReservedSeat {
                seat: SeatId::new(seat.seat_row, seat.seat_number.max(0) as u32),
                user_id: seat.user_id,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| Showtime {
                id: row.id,
                movie_id: row.movie_id,
                theater_id: row.theater_id,
                start_time: row.start_time,
                is_release: row.is_release,
                reserved_seats: by_showtime.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }

    async fn count_tickets_for(
        tx: &mut Transaction<'_, Postgres>,
        showtime_ids: &[Uuid],
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tickets WHERE showtime_id = ANY($1)")
            .bind(showtime_ids)
            .fetch_one(&mut **tx)
            .await
    }

    /// Deletes showtimes (tickets and seats follow by FK cascade) inside `tx`.
    async fn delete_showtimes_in(
        tx: &mut Transaction<'_, Postgres>,
        showtime_ids: &[Uuid],
        report: &mut CascadeReport,
    ) -> Result<(), sqlx::Error> {
        report.tickets += Self::count_tickets_for(tx, showtime_ids).await?.max(0) as u64;
        let deleted = sqlx::query("DELETE FROM showtimes WHERE id = ANY($1)")
            .bind(showtime_ids)
            .execute(&mut **tx)
            .await?;
        report.showtimes += deleted.rows_affected();
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn amount(value: u32) -> BookingResult<i32> {
    i32::try_from(value).map_err(|_| BookingError::PricingConfigInvalid(format!("amount {} is too large", value)))
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_cinema(&self, cinema: &Cinema) -> BookingResult<()> {
        sqlx::query("INSERT INTO cinemas (id, name) VALUES ($1, $2)")
            .bind(cinema.id)
            .bind(&cinema.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cinema(&self, id: Uuid) -> BookingResult<Option<Cinema>> {
        Ok(sqlx::query_as::<_, Cinema>("SELECT id, name FROM cinemas WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_cinemas(&self) -> BookingResult<Vec<Cinema>> {
        Ok(sqlx::query_as::<_, Cinema>("SELECT id, name FROM cinemas ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn insert_theater(&self, theater: &Theater) -> BookingResult<()> {
        let result = sqlx::query(
            "INSERT INTO theaters (id, cinema_id, number, last_row, seat_columns, pricing)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(theater.id)
        .bind(theater.cinema_id)
        .bind(theater.number)
        .bind(&theater.seat_map.last_row)
        .bind(theater.seat_map.columns as i32)
        .bind(theater.pricing.as_ref().map(Json))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(BookingError::CinemaNotFound(theater.cinema_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn theater(&self, id: Uuid) -> BookingResult<Option<Theater>> {
        let row: Option<TheaterRow> = sqlx::query_as(
            "SELECT id, cinema_id, number, last_row, seat_columns, pricing FROM theaters WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Theater::from))
    }

    async fn insert_movie(&self, movie: &Movie) -> BookingResult<()> {
        sqlx::query("INSERT INTO movies (id, name, length_minutes) VALUES ($1, $2, $3)")
            .bind(movie.id)
            .bind(&movie.name)
            .bind(movie.length_minutes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn movie(&self, id: Uuid) -> BookingResult<Option<Movie>> {
        Ok(sqlx::query_as::<_, Movie>("SELECT id, name, length_minutes FROM movies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_movies(&self) -> BookingResult<Vec<Movie>> {
        Ok(sqlx::query_as::<_, Movie>("SELECT id, name, length_minutes FROM movies ORDER BY name, id")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_movie(&self, movie: &Movie) -> BookingResult<bool> {
        let result = sqlx::query("UPDATE movies SET name = $2, length_minutes = $3 WHERE id = $1")
            .bind(movie.id)
            .bind(&movie.name)
            .bind(movie.length_minutes)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn insert_showtimes(&self, showtimes: &[Showtime]) -> BookingResult<()> {
        let mut tx = self.pool.begin().await?;
        for showtime in showtimes {
            sqlx::query(
                "INSERT INTO showtimes (id, movie_id, theater_id, start_time, is_release)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(showtime.id)
            .bind(showtime.movie_id)
            .bind(showtime.theater_id)
            .bind(showtime.start_time)
            .bind(showtime.is_release)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn showtime(&self, id: Uuid) -> BookingResult<Option<Showtime>> {
        let row: Option<ShowtimeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM showtimes WHERE id = $1",
            SHOWTIME_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_seats(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_showtimes(&self, query: &ShowtimeQuery) -> BookingResult<Vec<Showtime>> {
        let rows: Vec<ShowtimeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM showtimes
             WHERE ($1::uuid IS NULL OR movie_id = $1)
               AND ($2::uuid IS NULL OR theater_id = $2)
               AND ($3::timestamptz IS NULL OR start_time >= $3)
               AND ($4::timestamptz IS NULL OR start_time < $4)
               AND (NOT $5 OR is_release)
             ORDER BY start_time, id",
            SHOWTIME_COLUMNS
        ))
        .bind(query.movie_id)
        .bind(query.theater_id)
        .bind(query.starts_from)
        .bind(query.starts_before)
        .bind(query.released_only)
        .fetch_all(&self.pool)
        .await?;

        self.attach_seats(rows).await
    }

    async fn set_release(&self, id: Uuid, is_release: bool) -> BookingResult<Option<Showtime>> {
        let updated = sqlx::query("UPDATE showtimes SET is_release = $2 WHERE id = $1")
            .bind(id)
            .bind(is_release)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(None);
        }
        self.showtime(id).await
    }

    async fn commit_reservation(&self, ticket: &Ticket) -> BookingResult<CommitOutcome> {
        let rows: Vec<String> = ticket.seats.iter().map(|s| s.row.clone()).collect();
        let numbers: Vec<i32> = ticket.seats.iter().map(|s| s.number as i32).collect();

        let mut tx = self.pool.begin().await?;

        // 1) Serialize writers on this showtime
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM showtimes WHERE id = $1 FOR UPDATE")
                .bind(ticket.showtime_id)
                .fetch_optional(&mut *tx)
                .await?;
        if locked.is_none() {
            tx.rollback().await?;
            return Err(BookingError::ShowtimeNotFound(ticket.showtime_id));
        }

        // 2) Check
        let taken: Vec<(String, i32)> = sqlx::query_as(
            "SELECT r.seat_row, r.seat_number
             FROM reserved_seats r
             JOIN UNNEST($2::text[], $3::int4[]) AS wanted (seat_row, seat_number)
               ON r.seat_row = wanted.seat_row AND r.seat_number = wanted.seat_number
             WHERE r.showtime_id = $1",
        )
        .bind(ticket.showtime_id)
        .bind(&rows)
        .bind(&numbers)
        .fetch_all(&mut *tx)
        .await?;

        if !taken.is_empty() {
            tx.rollback().await?;
            let mut conflicts: Vec<SeatId> = taken
                .into_iter()
                .map(|(row, number)| SeatId::new(row, number.max(0) as u32))
                .collect();
            conflicts.sort();
            return Ok(CommitOutcome::Conflict(conflicts));
        }

        // 3) Commit ticket and seats together
        let labels: Vec<String> = ticket.seats.iter().map(ToString::to_string).collect();
        sqlx::query(
            "INSERT INTO tickets (id, showtime_id, user_id, seats, seat_total, service_fee, total_price, payment_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(ticket.id)
        .bind(ticket.showtime_id)
        .bind(&ticket.user_id)
        .bind(&labels)
        .bind(amount(ticket.seat_total)?)
        .bind(amount(ticket.service_fee)?)
        .bind(amount(ticket.total_price)?)
        .bind(&ticket.payment_id)
        .bind(ticket.created_at)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            "INSERT INTO reserved_seats (showtime_id, seat_row, seat_number, user_id, ticket_id)
             SELECT $1, seat_row, seat_number, $4, $5
             FROM UNNEST($2::text[], $3::int4[]) AS wanted (seat_row, seat_number)",
        )
        .bind(ticket.showtime_id)
        .bind(&rows)
        .bind(&numbers)
        .bind(&ticket.user_id)
        .bind(ticket.id)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                warn!(showtime_id = %ticket.showtime_id, "seat insert raced with another writer");
                tx.rollback().await?;
                return Err(BookingError::VersionConflict(ticket.showtime_id));
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }

    async fn tickets_for_user(&self, user_id: &str) -> BookingResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE user_id = $1 ORDER BY created_at DESC",
            TICKET_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn tickets_for_showtime(&self, showtime_id: Uuid) -> BookingResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE showtime_id = $1 ORDER BY created_at",
            TICKET_COLUMNS
        ))
        .bind(showtime_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Ticket::from).collect())
    }

    async fn delete_showtime(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tx = self.pool.begin().await?;
        let mut report = CascadeReport::default();
        Self::delete_showtimes_in(&mut tx, &[id], &mut report).await?;

        if report.showtimes == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(report))
    }

    async fn delete_movie(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tx = self.pool.begin().await?;
        let showtime_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM showtimes WHERE movie_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let mut report = CascadeReport::default();
        Self::delete_showtimes_in(&mut tx, &showtime_ids, &mut report).await?;

        report.movies = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if report.movies == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(report))
    }

    async fn delete_theater(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tx = self.pool.begin().await?;
        let showtime_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM showtimes WHERE theater_id = $1 FOR UPDATE")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?;

        let mut report = CascadeReport::default();
        Self::delete_showtimes_in(&mut tx, &showtime_ids, &mut report).await?;

        report.theaters = sqlx::query("DELETE FROM theaters WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if report.theaters == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(report))
    }

    async fn delete_cinema(&self, id: Uuid) -> BookingResult<Option<CascadeReport>> {
        let mut tx = self.pool.begin().await?;
        let showtime_ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT s.id FROM showtimes s
             JOIN theaters t ON t.id = s.theater_id
             WHERE t.cinema_id = $1
             FOR UPDATE OF s",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let mut report = CascadeReport::default();
        Self::delete_showtimes_in(&mut tx, &showtime_ids, &mut report).await?;

        report.theaters = sqlx::query("DELETE FROM theaters WHERE cinema_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        report.cinemas = sqlx::query("DELETE FROM cinemas WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if report.cinemas == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(report))
    }
}
