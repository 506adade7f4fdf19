//! Request extractors.

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use rr_core::ProfileId;

use crate::error::ApiError;
use crate::AppState;

/// The profile behind `Authorization: Bearer <token>`, if the token verifies.
///
/// A missing, malformed or expired token yields `Caster(None)`; endpoints that
/// need a caster call [`Caster::required`].
#[derive(Debug, Clone, Copy)]
pub struct Caster(pub Option<ProfileId>);

impl Caster {
    pub fn required(self) -> Result<ProfileId, ApiError> {
        self.0
            .ok_or_else(|| ApiError::new(StatusCode::FORBIDDEN, "You need to log in."))
    }
}

impl FromRequestParts<AppState> for Caster {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let caster = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .and_then(|token| state.forum.authenticate(token.trim()));
        Ok(Caster(caster))
    }
}
