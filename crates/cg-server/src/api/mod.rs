//! API routes module.
//!
//! Routes are registered on a [`Dispatcher`], which records which paths are
//! public and wraps the whole router in the request pipeline.

pub mod auth;
mod body;
mod health;
mod messages;
pub mod middleware;
pub mod origin;
mod pipeline;
mod stats;

use std::collections::HashSet;
use std::sync::Arc;

use axum::{middleware::from_fn_with_state, response::IntoResponse, routing::MethodRouter, Router};
use tower_http::catch_panic::CatchPanicLayer;

use crate::AppState;
use cg_common::AppError;
use pipeline::Pipeline;

/// Paths the authentication stage lets through without a token.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes(HashSet<String>);

impl PublicRoutes {
    pub fn contains(&self, path: &str) -> bool {
        self.0.contains(path)
    }
}

/// Route table plus the public-route capability the pipeline consults.
#[derive(Default)]
pub struct Dispatcher {
    router: Router<Arc<AppState>>,
    public: PublicRoutes,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route that requires a verified principal.
    pub fn route(mut self, path: &str, method_router: MethodRouter<Arc<AppState>>) -> Self {
        self.router = self.router.route(path, method_router);
        self
    }

    /// Register a route reachable without credentials.
    pub fn public_route(mut self, path: &str, method_router: MethodRouter<Arc<AppState>>) -> Self {
        self.public.0.insert(path.to_string());
        self.route(path, method_router)
    }

    /// Merge a sub-router whose routes all require authentication.
    pub fn merge(mut self, router: Router<Arc<AppState>>) -> Self {
        self.router = self.router.merge(router);
        self
    }

    /// Finish the table: unmatched paths become `NotFound`, panics become
    /// `Internal`, and everything runs behind the pipeline.
    pub fn into_router(self, state: Arc<AppState>) -> Router {
        let pipeline = Pipeline::new(state.clone(), self.public);

        self.router
            .fallback(route_not_found)
            .layer(CatchPanicLayer::custom(|_| {
                AppError::Internal(anyhow::anyhow!("handler panicked")).into_response()
            }))
            .layer(from_fn_with_state(pipeline, pipeline::run))
            .with_state(state)
    }
}

async fn route_not_found() -> AppError {
    AppError::NotFound("route not found".into())
}

/// Build the API router with all sub-routes.
pub fn router(state: Arc<AppState>) -> Router {
    Dispatcher::new()
        .public_route("/health", health::route())
        .merge(auth::router())
        .merge(stats::router())
        .merge(messages::router())
        .into_router(state)
}
