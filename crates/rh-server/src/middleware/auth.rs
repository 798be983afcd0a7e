//! Authentication middleware.
//!
//! Resolves `Authorization: Bearer <token>` through the `auth_tokens` table
//! to the calling user and device. When auth is disabled every request acts
//! as the anonymous user and device seeded by the migrations. The resolved
//! [`Caller`] is inserted into request extensions.

use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use rh_core::config::AuthConfig;
use rh_core::{DeviceId, Error, Result, UserId};
use rh_db::pool::{get_conn, DbPool};

use crate::context::AppContext;
use crate::error::AppError;

/// The authenticated user and, if the token is bound to one, their device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: UserId,
    pub device_id: Option<DeviceId>,
}

impl Caller {
    /// The well-known anonymous identity (nil UUIDs).
    pub fn anonymous() -> Self {
        Self {
            user_id: UserId::nil(),
            device_id: Some(DeviceId::nil()),
        }
    }
}

/// Resolve the caller from a raw `Authorization` header value.
///
/// `Ok(None)` means the request is unauthenticated.
pub fn resolve_caller(
    auth: &AuthConfig,
    db: &DbPool,
    authorization: Option<&str>,
) -> Result<Option<Caller>> {
    if !auth.enabled {
        return Ok(Some(Caller::anonymous()));
    }

    let Some(token) = authorization
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    else {
        return Ok(None);
    };

    let conn = get_conn(db)?;
    let Some(row) = rh_db::queries::auth::get_token(&conn, token)? else {
        return Ok(None);
    };

    let live = DateTime::parse_from_rfc3339(&row.expires_at)
        .map(|exp| exp.with_timezone(&Utc) > Utc::now())
        .unwrap_or(false);
    if !live {
        tracing::debug!(user_id = %row.user_id, "Rejected expired auth token");
        return Ok(None);
    }

    Ok(Some(Caller {
        user_id: row.user_id,
        device_id: row.device_id,
    }))
}

/// Authentication middleware. Applied to `/api` routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match resolve_caller(&ctx.config.auth, &ctx.db, authorization)? {
        Some(caller) => {
            request.extensions_mut().insert(caller);
            Ok(next.run(request).await)
        }
        None => Err(Error::Unauthorized("authentication required".into()).into()),
    }
}
