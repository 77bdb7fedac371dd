//! Bearer-token authentication: the credential verifier seam, its JWT
//! implementation, the pipeline stage and the `/me` endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::Request, routing::get, Json, Router};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Serialize;

use super::middleware::AuthUser;
use super::pipeline::Outcome;
use super::PublicRoutes;
use crate::AppState;
use cg_common::config::AuthConfig;
use cg_common::token::Claims;
use cg_common::AppError;

pub const MISSING_TOKEN: &str = "is missing";
pub const INVALID_TOKEN: &str = "is invalid or expired";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/me", get(get_me))
}

/// Identity attached to a request once its token checks out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub id: String,
    pub name: Option<String>,
}

/// Resolves a bearer token to a principal.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Principal, AppError>;
}

/// HS256 verifier keyed by `auth.jwt_secret`.
pub struct JwtVerifier {
    decoding: DecodingKey,
}

impl JwtVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        }
    }
}

#[async_trait]
impl CredentialVerifier for JwtVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                AppError::Unauthorized(INVALID_TOKEN.into())
            })?;

        Ok(Principal {
            id: token_data.claims.sub,
            name: token_data.claims.name,
        })
    }
}

/// Pipeline stage 2. Routes the dispatcher marked public pass untouched.
pub async fn stage(
    verifier: &dyn CredentialVerifier,
    public: &PublicRoutes,
    mut request: Request,
) -> Outcome {
    if public.contains(request.uri().path()) {
        return Outcome::Continue(request);
    }

    let token = match request.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(bearer)) => bearer.token().to_string(),
        None => return Outcome::ShortCircuit(AppError::Unauthorized(MISSING_TOKEN.into())),
    };

    match verifier.verify(&token).await {
        Ok(principal) => {
            tracing::debug!(principal = %principal.id, "Request authenticated");
            request.extensions_mut().insert(principal);
            Outcome::Continue(request)
        }
        Err(err) => Outcome::ShortCircuit(err),
    }
}

async fn get_me(auth: AuthUser) -> Json<Principal> {
    Json(auth.0)
}
