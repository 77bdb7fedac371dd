//! The HTTP request pipeline.
//!
//! Every API request runs through a fixed sequence of stages:
//!
//! ```text
//! origin → authenticate → decode body → log → dispatch → normalize errors
//! ```
//!
//! Each stage returns an [`Outcome`]: continue with a (possibly transformed)
//! request, short-circuit with an error, or respond directly. The driver
//! stops at the first non-`Continue` outcome; whatever comes out is then
//! normalized, so every error, from any stage or handler, leaves through
//! [`normalize`] with the same wire shape.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use futures_util::FutureExt;

use super::origin::{self, CorsGrant};
use super::{auth, body, PublicRoutes};
use crate::AppState;
use cg_common::{AppError, ErrorKind, ErrorReport};

// ─── Stages ──────────────────────────────────────────────────

/// Result of running one stage.
pub enum Outcome {
    Continue(Request),
    ShortCircuit(AppError),
    Respond(Response),
}

/// Per-request state the driver carries between stages.
#[derive(Debug, Default)]
pub struct Exchange {
    /// Set by the origin stage; stamped on whatever response goes out.
    pub cors: Option<CorsGrant>,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Origin,
    Authenticate,
    DecodeBody,
    Log,
}

/// Order is significant: a failure at any stage skips everything after
/// it up to normalization.
const STAGES: [Stage; 4] = [
    Stage::Origin,
    Stage::Authenticate,
    Stage::DecodeBody,
    Stage::Log,
];

/// Middleware state: the app plus the dispatcher's public-route declaration.
#[derive(Clone)]
pub struct Pipeline {
    state: Arc<AppState>,
    public: Arc<PublicRoutes>,
}

impl Pipeline {
    pub fn new(state: Arc<AppState>, public: PublicRoutes) -> Self {
        Self {
            state,
            public: Arc::new(public),
        }
    }
}

impl Stage {
    async fn apply(
        self,
        pipeline: &Pipeline,
        exchange: &mut Exchange,
        request: Request,
    ) -> Outcome {
        let state = &pipeline.state;
        match self {
            Self::Origin => origin::stage(&state.origin, exchange, request),
            Self::Authenticate => {
                auth::stage(state.verifier.as_ref(), &pipeline.public, request).await
            }
            Self::DecodeBody => body::stage(state.config.server.body_limit_bytes, request).await,
            Self::Log => log_request(request),
        }
    }
}

// ─── Driver ──────────────────────────────────────────────────

/// Axum middleware entry point wrapping the dispatcher.
pub async fn run(State(pipeline): State<Pipeline>, request: Request, next: Next) -> Response {
    let mut exchange = Exchange::default();
    let outcome = drive(&pipeline, &mut exchange, request, next).await;

    let mut response = normalize(outcome);
    if let Some(grant) = &exchange.cors {
        grant.apply(response.headers_mut());
    }
    response
}

async fn drive(
    pipeline: &Pipeline,
    exchange: &mut Exchange,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    for stage in STAGES {
        let outcome = AssertUnwindSafe(stage.apply(pipeline, exchange, request))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| stage_panicked(stage, payload));

        request = match outcome {
            Outcome::Continue(request) => request,
            Outcome::ShortCircuit(err) => {
                tracing::debug!(?stage, kind = ?err.kind(), "Pipeline short-circuited");
                return Err(err);
            }
            Outcome::Respond(response) => return Ok(response),
        };
    }

    // Dispatch. Handler errors come back captured in the response.
    Ok(next.run(request).await)
}

/// A panicking stage fails the request like any other internal error.
fn stage_panicked(stage: Stage, payload: Box<dyn Any + Send>) -> Outcome {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    Outcome::ShortCircuit(AppError::Internal(anyhow::anyhow!(
        "{stage:?} stage panicked: {message}"
    )))
}

/// Stage 4. Pure side effect.
fn log_request(request: Request) -> Outcome {
    tracing::info!(
        method = %request.method(),
        path = %request.uri().path(),
        timestamp = %Utc::now().to_rfc3339(),
        "Request received"
    );
    Outcome::Continue(request)
}

// ─── Normalization ───────────────────────────────────────────

/// Stage 6: the only place internal errors become wire responses.
///
/// Successful responses pass through unchanged. Error-status responses
/// without a captured report (framework rejections, unmatched methods)
/// are classified by status.
pub fn normalize(outcome: Result<Response, AppError>) -> Response {
    let mut response = match outcome {
        Ok(response) => response,
        Err(err) => return render(err.report()),
    };

    if let Some(report) = response.extensions_mut().remove::<ErrorReport>() {
        return render(report);
    }

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return render(ErrorReport::from_status(status));
    }

    response
}

fn render(report: ErrorReport) -> Response {
    match report.kind {
        ErrorKind::Internal => tracing::error!(detail = %report.detail, "Request failed"),
        kind => tracing::debug!(?kind, detail = %report.detail, "Request rejected"),
    }
    report.render()
}
