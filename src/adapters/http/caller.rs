//! Caller identity extractors.
//!
//! Authentication happens upstream; the gateway in front of this service
//! forwards the verified identity as headers:
//!
//! - `X-User-Id` - the caller's user id (required)
//! - `X-User-Role` - `admin` for finance staff, anything else otherwise

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::domain::foundation::UserId;

use super::settlement::dto::ErrorResponse;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

const ADMIN_ROLE: &str = "admin";

/// Identity of the caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl AuthenticatedUser {
    /// Whether the caller may act on a resource owned by `owner`.
    pub fn can_access(&self, owner: &UserId) -> bool {
        self.is_admin || &self.user_id == owner
    }
}

/// Caller that must hold the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

/// Rejection for the extractors above.
#[derive(Debug)]
pub enum CallerRejection {
    AuthenticationRequired,
    AdminRequired,
}

impl IntoResponse for CallerRejection {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            CallerRejection::AuthenticationRequired => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required"),
            ),
            CallerRejection::AdminRequired => (
                StatusCode::FORBIDDEN,
                ErrorResponse::new("FORBIDDEN", "Administrator role required"),
            ),
        };
        (status, Json(body)).into_response()
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts.headers.get(name).and_then(|v| v.to_str().ok())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = CallerRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)
            .map(str::trim)
            .and_then(|s| UserId::new(s).ok())
            .ok_or(CallerRejection::AuthenticationRequired)?;

        let is_admin = header(parts, USER_ROLE_HEADER)
            .map(|role| role.trim().eq_ignore_ascii_case(ADMIN_ROLE))
            .unwrap_or(false);

        Ok(AuthenticatedUser { user_id, is_admin })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = CallerRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.user_id, "Admin route refused");
            return Err(CallerRejection::AdminRequired);
        }
        Ok(AdminUser(user))
    }
}
