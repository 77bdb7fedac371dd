//! Pipeline stage 3: body decoding.
//!
//! JSON and URL-encoded form bodies are decoded into a `serde_json::Value`
//! and attached as [`DecodedBody`]. The raw bytes are put back so the
//! request stays intact. Other content types pass through undecoded.

use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderMap},
};
use serde_json::{Map, Value};

use super::pipeline::Outcome;
use cg_common::AppError;

/// Body as decoded by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody(pub Value);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFormat {
    Json,
    Form,
}

impl BodyFormat {
    fn of(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence == "application/json" || essence.ends_with("+json") {
            Some(Self::Json)
        } else if essence == "application/x-www-form-urlencoded" {
            Some(Self::Form)
        } else {
            None
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<Value, String> {
        match self {
            Self::Json => {
                serde_json::from_slice(bytes).map_err(|e| format!("is not valid JSON: {e}"))
            }
            Self::Form => serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
                .map(|pairs| {
                    // Repeated keys: last one wins.
                    let map: Map<String, Value> = pairs
                        .into_iter()
                        .map(|(k, v)| (k, Value::String(v)))
                        .collect();
                    Value::Object(map)
                })
                .map_err(|e| format!("is not valid form data: {e}")),
        }
    }
}

pub async fn stage(limit: usize, request: Request) -> Outcome {
    let Some(format) = BodyFormat::of(request.headers()) else {
        return Outcome::Continue(request);
    };

    let (mut parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit, "Request body could not be read");
            return Outcome::ShortCircuit(AppError::BadRequest(format!(
                "could not be read (limit {limit} bytes)"
            )));
        }
    };

    // An empty body under a JSON/form content type means "no body".
    if !bytes.is_empty() {
        match format.decode(&bytes) {
            Ok(value) => {
                parts.extensions.insert(DecodedBody(value));
            }
            Err(message) => {
                tracing::debug!(path = %parts.uri.path(), %message, "Malformed request body");
                return Outcome::ShortCircuit(AppError::BadRequest(message));
            }
        }
    }

    Outcome::Continue(Request::from_parts(parts, Body::from(bytes)))
}
