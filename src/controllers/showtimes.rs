use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiResult;
use crate::models::Caller;
use crate::services::catalog::{NewShowtimes, ShowtimeFilter};
use crate::services::payment::PaymentConfirmation;
use crate::services::reservation::ReserveRequest;
use crate::services::scheduler::MAX_REPEAT_DAYS;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes", get(list_showtimes).post(create_showtimes))
        .route("/showtimes/{id}", get(get_showtime).delete(delete_showtime))
        .route("/showtimes/{id}/release", patch(set_release))
        .route("/showtimes/{id}/seats", get(seat_plan))
        .route("/showtimes/{id}/quote", post(quote))
        .route("/showtimes/{id}/holds", post(hold_seats).delete(release_holds))
        .route("/showtimes/{id}/reservations", post(reserve))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateShowtimesRequest {
    pub movie_id: Uuid,
    pub theater_id: Uuid,
    pub start_time: DateTime<FixedOffset>,
    #[validate(range(min = 1, max = MAX_REPEAT_DAYS))]
    pub repeat_days: Option<u32>,
    #[serde(default)]
    pub is_release: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseRequest {
    pub is_release: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SeatsRequest {
    #[validate(length(max = 100))]
    pub seats: Vec<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReserveBody {
    #[validate(length(max = 100))]
    pub seats: Vec<String>,
    pub payment: Option<PaymentConfirmation>,
}

// GET /api/showtimes
async fn list_showtimes(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(filter): Query<ShowtimeFilter>,
) -> ApiResult<impl IntoResponse> {
    let showtimes = state.catalog.list_showtimes(&filter, &caller).await?;
    Ok(Json(showtimes))
}

// POST /api/showtimes
async fn create_showtimes(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateShowtimesRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let created = state
        .catalog
        .create_showtimes(
            NewShowtimes {
                movie_id: req.movie_id,
                theater_id: req.theater_id,
                start_time: req.start_time,
                repeat_days: req.repeat_days.unwrap_or(1),
                is_release: req.is_release,
            },
            &caller,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

// GET /api/showtimes/{id}
async fn get_showtime(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.showtime(id, &caller).await?))
}

// PATCH /api/showtimes/{id}/release
async fn set_release(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.set_release(id, req.is_release, &caller).await?))
}

// DELETE /api/showtimes/{id}
async fn delete_showtime(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.delete_showtime(id, &caller).await?))
}

// GET /api/showtimes/{id}/seats
async fn seat_plan(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.reservations.seat_plan(id, &caller).await?))
}

// POST /api/showtimes/{id}/quote
async fn quote(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SeatsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    Ok(Json(state.reservations.quote(id, &req.seats, &caller).await?))
}

// POST /api/showtimes/{id}/holds
async fn hold_seats(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SeatsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let receipt = state.reservations.hold(id, &req.seats, &caller).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

// DELETE /api/showtimes/{id}/holds
async fn release_holds(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<SeatsRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let released = state.reservations.release_hold(id, &req.seats, &caller).await?;
    Ok(Json(serde_json::json!({ "success": true, "released": released })))
}

// POST /api/showtimes/{id}/reservations
async fn reserve(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<ReserveBody>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let ticket = state
        .reservations
        .reserve(
            ReserveRequest {
                showtime_id: id,
                seats: req.seats,
                payment: req.payment,
            },
            &caller,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}
