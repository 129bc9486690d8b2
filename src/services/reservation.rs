//! Seat reservation.
//!
//! A reservation commits in one step: either every requested seat is added to
//! the showtime and a ticket is written, or nothing changes. Two layers keep a
//! seat from being sold twice: a per-showtime mutex serializes commits inside
//! this process, and the store's conditional write covers other processes.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{HoldOutcome, SeatHolds};
use crate::clock::Clock;
use crate::config::BookingConfig;
use crate::error::{BookingError, BookingResult};
use crate::models::{Caller, SeatId, SeatMap, Showtime, Theater, Ticket};
use crate::services::payment::{PaymentConfirmation, PaymentVerifier};
use crate::services::pricing::{PriceQuote, PricingEngine};
use crate::store::{BookingStore, CommitOutcome};

/// Parses seat labels from a request. Rejects an empty list, malformed labels
/// and labels that name the same seat twice.
pub fn parse_seats(labels: &[String]) -> BookingResult<Vec<SeatId>> {
    if labels.is_empty() {
        return Err(BookingError::InvalidSeat(vec!["no seats requested".to_string()]));
    }

    let mut seats = Vec::with_capacity(labels.len());
    let mut seen = HashSet::new();
    let mut invalid = Vec::new();
    for label in labels {
        match label.parse::<SeatId>() {
            Ok(seat) if seen.insert(seat.clone()) => seats.push(seat),
            Ok(seat) => invalid.push(format!("{} (duplicate)", seat)),
            Err(_) => invalid.push(label.clone()),
        }
    }

    if invalid.is_empty() {
        Ok(seats)
    } else {
        Err(BookingError::InvalidSeat(invalid))
    }
}

fn check_bounds(seats: &[SeatId], seat_map: &SeatMap) -> BookingResult<()> {
    let outside: Vec<String> = seats
        .iter()
        .filter(|seat| !seat_map.contains(seat))
        .map(ToString::to_string)
        .collect();
    if outside.is_empty() {
        Ok(())
    } else {
        Err(BookingError::InvalidSeat(outside))
    }
}

/// One async mutex per showtime. Entries nobody is waiting on are pruned as the
/// map grows.
#[derive(Default)]
pub struct ShowtimeLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

const PRUNE_THRESHOLD: usize = 1024;

impl ShowtimeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_for(&self, showtime_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if locks.len() >= PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks.entry(showtime_id).or_default().clone()
    }

    pub fn forget(&self, showtime_id: Uuid) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(&showtime_id);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct ReserveRequest {
    pub showtime_id: Uuid,
    pub seats: Vec<String>,
    pub payment: Option<PaymentConfirmation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SeatStatus {
    Available,
    Held,
    HeldByYou,
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatView {
    pub seat: SeatId,
    pub price: u32,
    pub status: SeatStatus,
}

/// Everything a seat-selection screen needs for one showtime.
#[derive(Debug, Clone, Serialize)]
pub struct SeatPlan {
    pub showtime_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub last_row: String,
    pub columns: u32,
    pub service_fee: u32,
    pub seats: Vec<SeatView>,
}

impl SeatPlan {
    pub fn available(&self) -> usize {
        self.seats
            .iter()
            .filter(|s| s.status == SeatStatus::Available)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HoldReceipt {
    pub showtime_id: Uuid,
    pub seats: Vec<SeatId>,
    pub expires_at: DateTime<Utc>,
}

pub struct ReservationService {
    store: Arc<dyn BookingStore>,
    holds: Arc<dyn SeatHolds>,
    locks: Arc<ShowtimeLocks>,
    clock: Arc<dyn Clock>,
    pricing: PricingEngine,
    payments: PaymentVerifier,
    hold_ttl: Duration,
    max_commit_attempts: u32,
}

impl ReservationService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        holds: Arc<dyn SeatHolds>,
        locks: Arc<ShowtimeLocks>,
        clock: Arc<dyn Clock>,
        payments: PaymentVerifier,
        config: &BookingConfig,
    ) -> Self {
        Self {
            store,
            holds,
            locks,
            clock,
            pricing: PricingEngine::new(config.service_fee),
            payments,
            hold_ttl: Duration::seconds(config.hold_ttl_seconds as i64),
            max_commit_attempts: config.max_commit_attempts.max(1),
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    /// The showtime and its theater, as far as the caller may see them.
    /// Unreleased showtimes do not exist for non-admins.
    async fn visible_showtime(&self, showtime_id: Uuid, caller: &Caller) -> BookingResult<(Showtime, Theater)> {
        let showtime = self
            .store
            .showtime(showtime_id)
            .await?
            .filter(|s| s.is_release || caller.is_admin())
            .ok_or(BookingError::ShowtimeNotFound(showtime_id))?;
        let theater = self
            .store
            .theater(showtime.theater_id)
            .await?
            .ok_or(BookingError::TheaterNotFound(showtime.theater_id))?;
        Ok((showtime, theater))
    }

    fn ensure_not_past(&self, showtime: &Showtime, caller: &Caller) -> BookingResult<()> {
        if !caller.is_admin() && showtime.is_past(self.clock.now()) {
            return Err(BookingError::ShowtimePast(showtime.id));
        }
        Ok(())
    }

    async fn held_by_others(&self, showtime_id: Uuid, seats: &[SeatId], user_id: &str) -> BookingResult<Vec<SeatId>> {
        let holders = self.holds.holders(showtime_id, self.clock.now()).await?;
        Ok(seats
            .iter()
            .filter(|seat| holders.get(*seat).is_some_and(|holder| holder != user_id))
            .cloned()
            .collect())
    }

    /// Books every requested seat for the caller, or none of them.
    pub async fn reserve(&self, request: ReserveRequest, caller: &Caller) -> BookingResult<Ticket> {
        let user_id = caller.user_id()?.to_string();
        let mut seats = parse_seats(&request.seats)?;

        let (showtime, theater) = self.visible_showtime(request.showtime_id, caller).await?;
        self.ensure_not_past(&showtime, caller)?;
        check_bounds(&seats, &theater.seat_map)?;

        seats.sort();
        let quote = self.pricing.quote(&seats, theater.pricing.as_ref(), &theater.seat_map)?;
        let payment_id = self.payments.verify(request.payment.as_ref(), quote.total_price)?;

        let ticket = Ticket {
            id: Uuid::new_v4(),
            showtime_id: showtime.id,
            user_id,
            seats,
            seat_total: quote.seat_total,
            service_fee: quote.service_fee,
            total_price: quote.total_price,
            payment_id,
            created_at: self.clock.now(),
        };

        {
            let lock = self.locks.lock_for(showtime.id);
            let _guard = lock.lock().await;

            let held = self.held_by_others(showtime.id, &ticket.seats, &ticket.user_id).await?;
            if !held.is_empty() {
                info!(showtime_id = %showtime.id, user_id = %ticket.user_id, held = held.len(), "reservation blocked by holds");
                return Err(BookingError::SeatUnavailable(held));
            }

            self.commit_with_retry(&ticket).await?;
        }

        if let Err(e) = self.holds.release(showtime.id, &ticket.seats, &ticket.user_id).await {
            warn!(showtime_id = %showtime.id, "failed to release holds after reservation: {:?}", e);
        }

        info!(
            showtime_id = %ticket.showtime_id,
            ticket_id = %ticket.id,
            user_id = %ticket.user_id,
            seats = ticket.seats.len(),
            total_price = ticket.total_price,
            "seats reserved"
        );
        Ok(ticket)
    }

    async fn commit_with_retry(&self, ticket: &Ticket) -> BookingResult<()> {
        let mut attempt = 1;
        loop {
            match self.store.commit_reservation(ticket).await {
                Ok(CommitOutcome::Committed) => return Ok(()),
                Ok(CommitOutcome::Conflict(taken)) => {
                    info!(showtime_id = %ticket.showtime_id, conflicts = taken.len(), "reservation conflict");
                    return Err(BookingError::SeatUnavailable(taken));
                }
                Err(BookingError::VersionConflict(id)) if attempt < self.max_commit_attempts => {
                    debug!(showtime_id = %id, attempt, "commit raced a concurrent writer, retrying");
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                Err(BookingError::VersionConflict(id)) => {
                    warn!(showtime_id = %id, attempts = attempt, "giving up after repeated commit conflicts");
                    return Err(BookingError::SeatUnavailable(ticket.seats.clone()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Price breakdown for the seats, without touching anything.
    pub async fn quote(&self, showtime_id: Uuid, labels: &[String], caller: &Caller) -> BookingResult<PriceQuote> {
        let mut seats = parse_seats(labels)?;
        let (_, theater) = self.visible_showtime(showtime_id, caller).await?;
        check_bounds(&seats, &theater.seat_map)?;
        seats.sort();
        self.pricing.quote(&seats, theater.pricing.as_ref(), &theater.seat_map)
    }

    pub async fn seat_plan(&self, showtime_id: Uuid, caller: &Caller) -> BookingResult<SeatPlan> {
        let (showtime, theater) = self.visible_showtime(showtime_id, caller).await?;
        let holders = self.holds.holders(showtime_id, self.clock.now()).await?;
        let me = caller.user_id.as_deref();
        let reserved: HashSet<&SeatId> = showtime.reserved_seats.iter().map(|r| &r.seat).collect();

        let seats = theater
            .seat_map
            .seats()
            .map(|seat| {
                let status = if reserved.contains(&seat) {
                    SeatStatus::Reserved
                } else {
                    match holders.get(&seat) {
                        Some(holder) if Some(holder.as_str()) == me => SeatStatus::HeldByYou,
                        Some(_) => SeatStatus::Held,
                        None => SeatStatus::Available,
                    }
                };
                let price = self.pricing.price_of(&seat, theater.pricing.as_ref(), &theater.seat_map);
                SeatView { seat, price, status }
            })
            .collect();

        Ok(SeatPlan {
            showtime_id,
            start_time: showtime.start_time,
            last_row: theater.seat_map.last_row.clone(),
            columns: theater.seat_map.columns,
            service_fee: self.pricing.service_fee(),
            seats,
        })
    }

    /// Holds the seats for the caller, all or none. Holding seats one already
    /// holds pushes their expiry out.
    pub async fn hold(&self, showtime_id: Uuid, labels: &[String], caller: &Caller) -> BookingResult<HoldReceipt> {
        let user_id = caller.user_id()?;
        let mut seats = parse_seats(labels)?;
        seats.sort();

        let lock = self.locks.lock_for(showtime_id);
        let _guard = lock.lock().await;

        let (showtime, theater) = self.visible_showtime(showtime_id, caller).await?;
        self.ensure_not_past(&showtime, caller)?;
        check_bounds(&seats, &theater.seat_map)?;

        let reserved: Vec<SeatId> = showtime.conflicts(&seats).into_iter().cloned().collect();
        if !reserved.is_empty() {
            return Err(BookingError::SeatUnavailable(reserved));
        }

        match self
            .holds
            .try_hold(showtime_id, &seats, user_id, self.hold_ttl, self.clock.now())
            .await?
        {
            HoldOutcome::Held { expires_at } => {
                debug!(%showtime_id, %user_id, seats = seats.len(), %expires_at, "seats held");
                Ok(HoldReceipt {
                    showtime_id,
                    seats,
                    expires_at,
                })
            }
            HoldOutcome::Conflict(taken) => Err(BookingError::SeatUnavailable(taken)),
        }
    }

    pub async fn release_hold(&self, showtime_id: Uuid, labels: &[String], caller: &Caller) -> BookingResult<usize> {
        let user_id = caller.user_id()?;
        let seats = parse_seats(labels)?;
        let released = self.holds.release(showtime_id, &seats, user_id).await?;
        debug!(%showtime_id, %user_id, released, "holds released");
        Ok(released)
    }

    pub async fn tickets_for_user(&self, caller: &Caller) -> BookingResult<Vec<Ticket>> {
        let user_id = caller.user_id()?;
        self.store.tickets_for_user(user_id).await
    }
}
