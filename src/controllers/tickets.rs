use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use std::sync::Arc;

use super::ApiResult;
use crate::models::Caller;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tickets", get(my_tickets))
}

// GET /api/tickets
async fn my_tickets(State(state): State<Arc<AppState>>, caller: Caller) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.reservations.tickets_for_user(&caller).await?))
}
