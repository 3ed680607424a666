//! Bearer authentication middleware.
//!
//! Two verification tiers, composed in sequence and never collapsed:
//! 1. stateless - the token signature and expiry (identity snapshot);
//! 2. stateful - the referenced session is re-validated against storage,
//!    which enforces the idle timeout, touches `last_activity`, and makes
//!    revocation take effect immediately even for tokens whose signature
//!    still verifies.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{services::Claims, AppState};

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::AuthError(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    // Tier 1: stateless claim verification.
    let claims = state.tokens.verify(token).map_err(AppError::from)?;

    // Tier 2: server-side session liveness. Signature validity alone never
    // grants access when the token carries a session reference.
    if let Some(session_id) = claims.session_id {
        state
            .sessions
            .validate(session_id)
            .await
            .map_err(AppError::from)?;
    }

    req.extensions_mut().insert(CurrentUser(claims));

    Ok(next.run(req).await)
}

/// Extractor handing handlers the validated claims.
#[derive(Clone)]
pub struct CurrentUser(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "Auth claims missing from request extensions"
                ))
            })
    }
}
