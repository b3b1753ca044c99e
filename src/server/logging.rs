use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

const LOG_TARGET: &str = "leaderboard::server::http";

/// Middleware that logs incoming HTTP requests and their responses
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();

    match uri.query() {
        Some(query) => tracing::info!(target: LOG_TARGET, %method, %path, %query, "incoming request"),
        None => tracing::info!(target: LOG_TARGET, %method, %path, "incoming request"),
    }

    let start = Instant::now();
    let response = next.run(request).await;
    let status = response.status();

    if status.is_server_error() {
        tracing::warn!(
            target: LOG_TARGET,
            %method,
            %path,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request failed"
        );
    } else {
        tracing::info!(
            target: LOG_TARGET,
            %method,
            %path,
            status = status.as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            "request completed"
        );
    }

    response
}
