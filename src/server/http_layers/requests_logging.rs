//! Request logging middleware with configurable verbosity.

use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request, Response, StatusCode};
use axum::middleware::Next;
use tracing::{error, info};

use super::super::state::ServerState;

#[derive(PartialEq, PartialOrd, Clone, Debug, clap::ValueEnum)]
pub enum RequestsLoggingLevel {
    None,
    Path,
    Headers,
    Body,
}

impl Default for RequestsLoggingLevel {
    fn default() -> Self {
        Self::Path
    }
}

impl std::fmt::Display for RequestsLoggingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Bodies above this size are reported but not printed.
const MAX_LOGGED_BODY_BYTES: usize = 1024;

pub async fn log_requests(
    State(state): State<ServerState>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let level = state.config.requests_logging_level.clone();
    if level == RequestsLoggingLevel::None {
        return next.run(request).await;
    }

    let started = Instant::now();
    info!(">>> {} {}", request.method(), request.uri());

    let request = match inspect_request(&level, request).await {
        Ok(request) => request,
        Err(err) => {
            error!("Failed to buffer request body for logging: {:?}", err);
            return internal_error_response();
        }
    };

    let response = next.run(request).await;

    let response = match inspect_response(&level, response).await {
        Ok(response) => response,
        Err(err) => {
            error!("Failed to buffer response body for logging: {:?}", err);
            return internal_error_response();
        }
    };

    info!(
        "<<< {} ({}ms)",
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}

async fn inspect_request(
    level: &RequestsLoggingLevel,
    request: Request<Body>,
) -> Result<Request<Body>, axum::Error> {
    if *level >= RequestsLoggingLevel::Headers {
        log_headers("Req", request.headers());
    }
    if *level < RequestsLoggingLevel::Body {
        return Ok(request);
    }
    let (parts, body) = request.into_parts();
    let body = log_body("Req", &parts.headers, body).await?;
    Ok(Request::from_parts(parts, body))
}

async fn inspect_response(
    level: &RequestsLoggingLevel,
    response: Response<Body>,
) -> Result<Response<Body>, axum::Error> {
    if *level >= RequestsLoggingLevel::Headers {
        log_headers("Resp", response.headers());
    }
    if *level < RequestsLoggingLevel::Body {
        return Ok(response);
    }
    let (parts, body) = response.into_parts();
    let body = log_body("Resp", &parts.headers, body).await?;
    Ok(Response::from_parts(parts, body))
}

fn log_headers(side: &str, headers: &HeaderMap) {
    info!("  {} Headers:", side);
    for (name, value) in headers {
        info!("    {:?}: {:?}", name, value);
    }
}

/// Buffers the body to print it, handing back an equivalent body for the
/// rest of the pipeline. Oversized or unsized bodies pass through untouched.
async fn log_body(side: &str, headers: &HeaderMap, body: Body) -> Result<Body, axum::Error> {
    match content_length(headers) {
        None => {
            info!("  {} Body: unknown length, not logged", side);
            Ok(body)
        }
        Some(length) if length > MAX_LOGGED_BODY_BYTES => {
            info!("  {} Body: {} bytes, not logged", side, length);
            Ok(body)
        }
        Some(length) => {
            let bytes = axum::body::to_bytes(body, length).await?;
            info!("  {} Body:\n{}", side, String::from_utf8_lossy(&bytes));
            Ok(Body::from(bytes))
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn internal_error_response() -> Response<Body> {
    let mut response = Response::new(Body::from("Internal Server Error"));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}
