//! Live connection statistics.

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::api::middleware::AuthUser;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/connections", get(get_connections))
}

#[derive(Debug, Serialize)]
struct ConnectionStats {
    count: usize,
}

async fn get_connections(
    _auth: AuthUser,
    State(state): State<Arc<AppState>>,
) -> Json<ConnectionStats> {
    Json(ConnectionStats {
        count: state.registry.len(),
    })
}
