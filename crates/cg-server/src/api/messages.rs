//! HTTP entry into the broadcast relay.

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{AuthUser, Payload};
use crate::ws::events::ChatMessage;
use crate::AppState;
use cg_common::{AppError, AppResult, FieldErrors};

const BLANK: &str = "can't be blank";

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/messages", post(post_message))
}

#[derive(Debug, Deserialize)]
struct MessageForm {
    name: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Serialize)]
struct Delivery {
    delivered: usize,
}

impl MessageForm {
    fn validate(self) -> AppResult<ChatMessage> {
        let mut errors = FieldErrors::new();
        let name = required(&mut errors, "name", self.name);
        let message = required(&mut errors, "message", self.message);

        match (name, message) {
            (Some(name), Some(message)) if errors.is_empty() => Ok(ChatMessage { name, message }),
            _ => Err(AppError::Validation(errors)),
        }
    }
}

fn required(errors: &mut FieldErrors, field: &str, value: Option<String>) -> Option<String> {
    match value {
        Some(value) if !value.trim().is_empty() => Some(value),
        _ => {
            errors.insert(field.to_string(), vec![BLANK.to_string()]);
            None
        }
    }
}

async fn post_message(
    auth: AuthUser,
    State(state): State<Arc<AppState>>,
    Payload(form): Payload<MessageForm>,
) -> AppResult<Json<Delivery>> {
    let message = form.validate()?;
    tracing::debug!(principal = %auth.id(), "Relaying message posted over HTTP");

    let delivered = state.relay.relay(&message, None);
    Ok(Json(Delivery { delivered }))
}
