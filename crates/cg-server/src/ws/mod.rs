//! WebSocket gateway for real-time chat broadcast.

pub mod events;
mod handler;
pub mod registry;
pub mod relay;

use crate::api::origin;
use crate::AppState;
use axum::{middleware, Router};
use std::sync::Arc;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/chat", axum::routing::get(handler::chat_ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            origin::gate_upgrade,
        ))
        .with_state(state)
}
