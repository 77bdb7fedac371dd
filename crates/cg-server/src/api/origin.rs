//! Origin gate shared by the HTTP pipeline and the WebSocket upgrade.
//!
//! One configured origin is allowed. A request declaring any other
//! `Origin` is rejected before it reaches anything else; requests without
//! an `Origin` header (same-origin or non-browser clients) pass.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::Response,
};

use super::pipeline::{self, Exchange, Outcome};
use crate::AppState;
use cg_common::AppError;

const ALLOWED_METHODS: &str = "GET, HEAD, PUT, PATCH, POST, DELETE";
const DEFAULT_ALLOWED_HEADERS: &str = "authorization, content-type";

/// Allow-list of exactly one origin.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: HeaderValue,
}

/// Headers owed to a request that passed the gate.
#[derive(Debug, Clone)]
pub struct CorsGrant {
    origin: HeaderValue,
    credentialed: bool,
}

impl OriginPolicy {
    pub fn new(allowed_origin: &str) -> anyhow::Result<Self> {
        let trimmed = allowed_origin.trim().trim_end_matches('/');
        let allowed = HeaderValue::from_str(trimmed)
            .with_context(|| format!("Invalid allowed origin: {allowed_origin:?}"))?;
        Ok(Self { allowed })
    }

    pub fn allowed(&self) -> &HeaderValue {
        &self.allowed
    }

    /// Allow or deny based on the declared `Origin`.
    pub fn check(&self, headers: &HeaderMap) -> Result<CorsGrant, AppError> {
        match headers.get(header::ORIGIN) {
            Some(origin) if *origin != self.allowed => Err(AppError::Forbidden(format!(
                "origin {origin:?} is not allowed"
            ))),
            _ => Ok(CorsGrant {
                origin: self.allowed.clone(),
                credentialed: is_credentialed(headers),
            }),
        }
    }
}

fn is_credentialed(headers: &HeaderMap) -> bool {
    headers.contains_key(header::AUTHORIZATION) || headers.contains_key(header::COOKIE)
}

fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

impl CorsGrant {
    /// Stamp the allow headers onto an outgoing response.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.origin.clone());
        headers.append(header::VARY, HeaderValue::from_static("Origin"));
        if self.credentialed {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

/// Pipeline stage 1. Preflights are answered here and never reach auth.
pub fn stage(policy: &OriginPolicy, exchange: &mut Exchange, request: Request) -> Outcome {
    let mut grant = match policy.check(request.headers()) {
        Ok(grant) => grant,
        Err(err) => {
            tracing::warn!(
                method = %request.method(),
                path = %request.uri().path(),
                "Request from disallowed origin rejected"
            );
            return Outcome::ShortCircuit(err);
        }
    };

    if is_preflight(&request) {
        // The preflight itself carries no credentials; the request it
        // announces will.
        grant.credentialed = true;
        exchange.cors = Some(grant);
        return Outcome::Respond(preflight_response(request.headers()));
    }

    exchange.cors = Some(grant);
    Outcome::Continue(request)
}

fn preflight_response(headers: &HeaderMap) -> Response {
    let allow_headers = headers
        .get(header::ACCESS_CONTROL_REQUEST_HEADERS)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_ALLOWED_HEADERS));

    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    let out = response.headers_mut();
    out.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    out.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, allow_headers);
    response
}

/// Route layer for the WebSocket upgrade: same policy, no pipeline.
/// Denied upgrades never reach the handler, so nothing is registered.
/// Rejected upgrades still leave in the common error shape.
pub async fn gate_upgrade(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match state.origin.check(request.headers()) {
        Ok(grant) => {
            let mut response = pipeline::normalize(Ok(next.run(request).await));
            grant.apply(response.headers_mut());
            response
        }
        Err(err) => {
            tracing::warn!(error = %err, "WebSocket upgrade from disallowed origin rejected");
            err.report().render()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOWED: &str = "http://localhost:7165";

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn granted(grant: &CorsGrant) -> HeaderMap {
        let mut out = HeaderMap::new();
        grant.apply(&mut out);
        out
    }

    #[test]
    fn allowed_origin_gets_matching_header() {
        let policy = OriginPolicy::new(ALLOWED).unwrap();
        let grant = policy
            .check(&headers(&[(header::ORIGIN, ALLOWED)]))
            .unwrap();
        let out = granted(&grant);
        assert_eq!(out[header::ACCESS_CONTROL_ALLOW_ORIGIN], ALLOWED);
        assert!(out.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
    }

    #[test]
    fn other_origins_are_denied() {
        let policy = OriginPolicy::new(ALLOWED).unwrap();
        for origin in [
            "http://localhost:7166",
            "https://localhost:7165",
            "http://evil.example.com",
            "null",
        ] {
            let result = policy.check(&headers(&[(header::ORIGIN, origin)]));
            assert!(
                matches!(result, Err(AppError::Forbidden(_))),
                "{origin} should be denied"
            );
        }
    }

    #[test]
    fn missing_origin_is_allowed() {
        let policy = OriginPolicy::new(ALLOWED).unwrap();
        assert!(policy.check(&HeaderMap::new()).is_ok());
    }

    #[test]
    fn trailing_slash_in_config_is_ignored() {
        let policy = OriginPolicy::new("http://localhost:7165/").unwrap();
        assert_eq!(policy.allowed(), ALLOWED);
        assert!(policy
            .check(&headers(&[(header::ORIGIN, ALLOWED)]))
            .is_ok());
    }

    #[test]
    fn credentialed_requests_get_credentials_header() {
        let policy = OriginPolicy::new(ALLOWED).unwrap();
        for credential in [header::AUTHORIZATION, header::COOKIE] {
            let grant = policy
                .check(&headers(&[(header::ORIGIN, ALLOWED), (credential, "x")]))
                .unwrap();
            assert_eq!(
                granted(&grant)[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
                "true"
            );
        }
    }

    #[test]
    fn invalid_configured_origin_is_rejected() {
        assert!(OriginPolicy::new("http://bad\norigin").is_err());
    }
}
