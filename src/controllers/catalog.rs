use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiResult;
use crate::models::{Caller, PricingPolicy};
use crate::services::catalog::NewTheater;
use crate::services::scheduler::Rounding;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cinemas", get(list_cinemas).post(create_cinema))
        .route("/cinemas/{id}", delete(delete_cinema))
        .route("/theaters", post(create_theater))
        .route("/theaters/{id}", get(get_theater).delete(delete_theater))
        .route("/movies", get(list_movies).post(create_movie))
        .route("/movies/showing", get(showing_movies))
        .route("/movies/{id}", get(get_movie).put(update_movie).delete(delete_movie))
        .route("/schedule/next-slot", post(next_slot))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCinemaRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTheaterRequest {
    pub cinema_id: Uuid,
    #[validate(range(min = 1))]
    pub number: i32,
    #[validate(length(min = 1, max = 2))]
    pub last_row: String,
    pub columns: u32,
    pub pricing: Option<PricingPolicy>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMovieRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1, max = 1440))]
    pub length_minutes: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMovieRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(range(min = 1, max = 1440))]
    pub length_minutes: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct NextSlotRequest {
    pub current_start: NaiveDateTime,
    pub movie_id: Uuid,
    /// "HH:MM"; ten minutes when absent.
    pub gap: Option<String>,
    #[serde(default)]
    pub rounding: Rounding,
}

#[derive(Debug, Serialize)]
pub struct NextSlotResponse {
    pub next_start: NaiveDateTime,
}

// GET /api/cinemas
async fn list_cinemas(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.list_cinemas().await?))
}

// POST /api/cinemas
async fn create_cinema(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateCinemaRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let cinema = state.catalog.create_cinema(&req.name, &caller).await?;
    Ok((StatusCode::CREATED, Json(cinema)))
}

// DELETE /api/cinemas/{id}
async fn delete_cinema(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.delete_cinema(id, &caller).await?))
}

// POST /api/theaters
async fn create_theater(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateTheaterRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let theater = state
        .catalog
        .create_theater(
            NewTheater {
                cinema_id: req.cinema_id,
                number: req.number,
                last_row: req.last_row,
                columns: req.columns,
                pricing: req.pricing,
            },
            &caller,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(theater)))
}

// GET /api/theaters/{id}
async fn get_theater(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.theater(id).await?))
}

// DELETE /api/theaters/{id}
async fn delete_theater(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.delete_theater(id, &caller).await?))
}

// GET /api/movies
async fn list_movies(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.list_movies().await?))
}

// GET /api/movies/showing
async fn showing_movies(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.showing_movies(&caller).await?))
}

// GET /api/movies/{id}
async fn get_movie(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.movie(id).await?))
}

// PUT /api/movies/{id}
async fn update_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMovieRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let movie = state
        .catalog
        .update_movie(id, req.name.as_deref(), req.length_minutes, &caller)
        .await?;
    Ok(Json(movie))
}

// POST /api/movies
async fn create_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateMovieRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;
    let movie = state
        .catalog
        .create_movie(&req.name, req.length_minutes, &caller)
        .await?;
    Ok((StatusCode::CREATED, Json(movie)))
}

// DELETE /api/movies/{id}
async fn delete_movie(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.catalog.delete_movie(id, &caller).await?))
}

// POST /api/schedule/next-slot
async fn next_slot(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<NextSlotRequest>,
) -> ApiResult<impl IntoResponse> {
    let next_start = state
        .catalog
        .next_slot(req.current_start, req.movie_id, req.gap.as_deref(), req.rounding, &caller)
        .await?;
    Ok(Json(NextSlotResponse { next_start }))
}
