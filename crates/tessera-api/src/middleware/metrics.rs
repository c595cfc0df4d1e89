//! Metrics tracking middleware
//!
//! Records request counts and latency per endpoint, method and status.
//!
//! Author: hephaex@gmail.com

use crate::metrics::record_request;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Metrics tracking middleware
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();

    // Normalize the path for metrics (remove IDs)
    let endpoint = normalize_endpoint(request.uri().path());

    let response = next.run(request).await;

    record_request(
        &endpoint,
        &method,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Normalize endpoint paths for consistent metrics
///
/// Replaces UUID and numeric segments with `:id` to keep label
/// cardinality bounded.
fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if is_uuid(seg) || is_numeric(seg) {
                ":id"
            } else {
                seg
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string looks like a UUID
fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(
            normalize_endpoint("/api/v1/accounts/550e8400-e29b-41d4-a716-446655440000"),
            "/api/v1/accounts/:id"
        );
        assert_eq!(normalize_endpoint("/api/v1/items/42"), "/api/v1/items/:id");
        assert_eq!(normalize_endpoint("/api/v1/auth/login"), "/api/v1/auth/login");
        assert_eq!(normalize_endpoint("/health"), "/health");
    }

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("550e8400-e29b-41d4-a716-446655440000"));
        assert!(!is_uuid("not-a-uuid"));
        assert!(!is_uuid("123"));
    }

    #[tokio::test]
    async fn test_requests_are_counted() {
        crate::metrics::init();

        let app = Router::new()
            .route("/metered", get(|| async { StatusCode::ACCEPTED }))
            .layer(middleware::from_fn(metrics_middleware));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/metered")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let output = crate::metrics::render().unwrap();
        assert!(output.contains("endpoint=\"/metered\""));
        assert!(output.contains("status=\"202\""));
    }
}
