use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::models::{Caller, Role};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Caller identity from the headers set by the authenticating gateway.
///
/// A request without `X-User-Id` is anonymous; handlers that need a user
/// reject it with 401. Any role other than `admin` is a plain user.
impl FromRequestParts<Arc<crate::AppState>> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = header_value(&parts.headers, USER_ID_HEADER).map(str::to_string);
        let role = match header_value(&parts.headers, USER_ROLE_HEADER) {
            Some(role) if role.eq_ignore_ascii_case("admin") => Role::Admin,
            _ => Role::User,
        };

        Ok(Caller { user_id, role })
    }
}
