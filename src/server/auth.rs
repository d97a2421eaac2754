//! Bearer authentication and the shared ownership check.
//!
//! Every protected route goes through [`AuthedUser`] and [`authorize_lp`]
//! instead of hand-rolling the fetch-resource/compare-owner pattern.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::SharedState;
use crate::error::{ApiError, ApiResult};
use crate::storage::{LandingPage, Storage, User};

/// The authenticated caller, resolved from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthedUser(pub User);

impl FromRequestParts<SharedState> for AuthedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Unauthorized)?;

        let user = state
            .storage
            .get_user_by_token(token)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(AuthedUser(user))
    }
}

/// Central ownership check: Allowed (the page), Forbidden, or NotFound.
pub async fn authorize_lp(
    storage: &dyn Storage,
    lp_id: &str,
    user: &User,
) -> ApiResult<LandingPage> {
    let lp = storage
        .get_landing_page(lp_id)
        .await?
        .ok_or_else(|| ApiError::not_found("landing page", lp_id))?;

    if lp.owner_id != user.id {
        return Err(ApiError::Forbidden);
    }

    Ok(lp)
}
