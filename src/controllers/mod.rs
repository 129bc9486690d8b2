pub mod catalog;
pub mod showtimes;
pub mod tickets;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::error::BookingError;
use crate::models::SeatId;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(showtimes::routes())
        .merge(catalog::routes())
        .merge(tickets::routes())
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    seats: Option<Vec<SeatId>>,
}

/// Error returned by every handler: a status plus the `{success: false, ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    seats: Option<Vec<SeatId>>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            seats: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        let status = match &err {
            BookingError::InvalidSeat(_)
            | BookingError::InvalidSeatMap(_)
            | BookingError::InvalidSchedule(_)
            | BookingError::PricingConfigInvalid(_) => StatusCode::BAD_REQUEST,
            BookingError::ShowtimeNotFound(_)
            | BookingError::MovieNotFound(_)
            | BookingError::TheaterNotFound(_)
            | BookingError::CinemaNotFound(_) => StatusCode::NOT_FOUND,
            BookingError::SeatUnavailable(_) | BookingError::VersionConflict(_) => StatusCode::CONFLICT,
            BookingError::ShowtimePast(_) => StatusCode::GONE,
            BookingError::PaymentRejected(_) => StatusCode::PAYMENT_REQUIRED,
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::Forbidden => StatusCode::FORBIDDEN,
            BookingError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match err {
            BookingError::Storage(detail) => {
                error!("storage failure: {}", detail);
                ApiError::new(status, "Internal server error")
            }
            BookingError::SeatUnavailable(seats) => ApiError {
                status,
                message: format!("{} seat(s) are no longer available", seats.len()),
                seats: Some(seats),
            },
            other => ApiError::new(status, other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, errors.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            message: self.message,
            seats: self.seats,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let conflict = ApiError::from(BookingError::SeatUnavailable(vec![SeatId::new("A", 1)]));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);
        assert_eq!(conflict.seats.as_deref(), Some(&[SeatId::new("A", 1)][..]));

        assert_eq!(
            ApiError::from(BookingError::ShowtimePast(uuid::Uuid::nil())).status(),
            StatusCode::GONE
        );
        assert_eq!(
            ApiError::from(BookingError::PaymentRejected("bad token".into())).status(),
            StatusCode::PAYMENT_REQUIRED
        );
        let storage = ApiError::from(BookingError::Storage("pool timed out".into()));
        assert_eq!(storage.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!storage.message.contains("pool"));
    }
}
