//! Health check endpoint.

use std::sync::Arc;

use axum::{extract::State, routing::get, routing::MethodRouter, Json};
use serde_json::{json, Value};

use crate::AppState;

pub fn route() -> MethodRouter<Arc<AppState>> {
    get(health_check)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = if state.db.is_closed() { "closed" } else { "open" };

    Json(json!({
        "status": "healthy",
        "service": "cg-server",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.registry.len(),
        "database": database,
    }))
}
