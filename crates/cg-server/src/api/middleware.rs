//! Handler-side extractors for data the pipeline attached to a request.
//!
//! The pipeline has already verified credentials and decoded the body by
//! the time a handler runs; these just read the results back out.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use super::auth::{Principal, MISSING_TOKEN};
use super::body::DecodedBody;
use cg_common::AppError;

/// Authenticated principal extractor.
///
/// Use as a handler parameter on protected routes:
/// ```ignore
/// async fn protected(user: AuthUser) -> impl IntoResponse { ... }
/// ```
pub struct AuthUser(pub Principal);

impl AuthUser {
    pub fn id(&self) -> &str {
        &self.0.id
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Only absent when a public route asks for a principal.
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(MISSING_TOKEN.into()))
    }
}

/// Typed view of the body decoded by the pipeline (JSON or form).
pub struct Payload<T>(pub T);

impl<S, T> FromRequestParts<S> for Payload<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let decoded = parts
            .extensions
            .get::<DecodedBody>()
            .ok_or_else(|| AppError::BadRequest("is missing".into()))?;

        T::deserialize(&decoded.0)
            .map(Payload)
            .map_err(|e| AppError::BadRequest(format!("has an unexpected shape: {e}")))
    }
}
