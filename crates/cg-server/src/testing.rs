//! Shared fixtures for in-crate tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;

use crate::api::auth::{CredentialVerifier, Principal, INVALID_TOKEN};
use crate::AppState;
use cg_common::{AppConfig, AppError};

pub const ORIGIN: &str = "http://localhost:7165";
pub const VALID_TOKEN: &str = "valid-token";

/// Accepts exactly [`VALID_TOKEN`].
pub struct StaticVerifier;

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, AppError> {
        if token == VALID_TOKEN {
            Ok(Principal {
                id: "user-1".into(),
                name: Some("Ada".into()),
            })
        } else {
            Err(AppError::Unauthorized(INVALID_TOKEN.into()))
        }
    }
}

pub fn config() -> AppConfig {
    let vars = HashMap::from([
        ("CG__AUTH__JWT_SECRET".to_string(), "test-secret".to_string()),
        ("CLIENT_ORIGIN".to_string(), ORIGIN.to_string()),
    ]);
    AppConfig::from_vars(vars).unwrap()
}

/// State with a lazy pool; nothing here touches the database.
/// Must be called from within a Tokio runtime.
pub fn state() -> Arc<AppState> {
    state_with(Arc::new(StaticVerifier))
}

pub fn state_with(verifier: Arc<dyn CredentialVerifier>) -> Arc<AppState> {
    let db = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/chatgate_test")
        .unwrap();
    Arc::new(AppState::with_verifier(config(), db, verifier).unwrap())
}

/// Full router on an ephemeral port.
pub async fn serve() -> (SocketAddr, Arc<AppState>) {
    let state = state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let app = crate::build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}
