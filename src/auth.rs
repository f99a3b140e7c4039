//! Shared-secret check run on every mutating and enumerating request.
//! Health (`/`) is wired up outside this middleware and needs no auth.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{ApiV1Error, AppError};
use crate::server::AppState;

pub const API_KEY_HEADER: &str = "X-API-Key";

fn check(state: &AppState, req: &Request) -> Result<(), AppError> {
    let Some(configured) = state.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(());
    };

    let Some(header) = req.headers().get(API_KEY_HEADER) else {
        return Err(AppError::MissingApiKey);
    };

    let provided = header.to_str().unwrap_or_default();
    if provided.as_bytes() != configured.as_bytes() {
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

/// Legacy surface: failures render through `AppError`'s plain-text response.
pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    check(&state, &req)?;
    Ok(next.run(req).await)
}

/// `/api/v1` surface: failures render through the structured JSON envelope.
pub async fn require_api_key_v1(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiV1Error> {
    check(&state, &req).map_err(ApiV1Error)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_secret_disables_auth() {
        assert!(Some("").filter(|k: &&str| !k.is_empty()).is_none());
    }
}
