//! Fixed-window request counter per client IP.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::auth::extractors::request_locale;
use crate::error::AppError;
use crate::state::AppState;

fn client_ip(req: &Request, trusted_hops: usize) -> String {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    if trusted_hops == 0 {
        return peer.unwrap_or_else(|| "unknown".into());
    }
    forwarded_for(req.headers(), trusted_hops)
        .or(peer)
        .unwrap_or_else(|| "unknown".into())
}

/// The `X-Forwarded-For` entry `hops` places from the right. Entries further
/// left were written by the client and are never used; with fewer entries
/// than hops the leftmost one is taken.
fn forwarded_for(headers: &HeaderMap, hops: usize) -> Option<String> {
    let header = headers.get("x-forwarded-for")?.to_str().ok()?;
    let entries: Vec<&str> = header
        .split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .collect();
    let index = entries.len().saturating_sub(hops);
    entries.get(index).map(|ip| ip.to_string())
}

pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let limits = &state.config.rate_limit;
    let ip = client_ip(&req, limits.trusted_proxy_hops);
    let key = format!("rate:{}", ip);

    match state.store.increment(&key, limits.window_seconds).await {
        Ok(count) if count > limits.max_requests => {
            debug!(%ip, count, "rate limit exceeded");
            let locale = request_locale(req.headers());
            return AppError::RateLimited.localize(&locale).into_response();
        }
        Ok(_) => {}
        // an unavailable store must not take the API down
        Err(e) => warn!(error = %e, "rate limit store unavailable"),
    }
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
            .with_state(state)
    }

    fn behind_proxies(hops: usize) -> AppState {
        let mut state = AppState::fake();
        let mut config = (*state.config).clone();
        config.rate_limit.trusted_proxy_hops = hops;
        state.config = Arc::new(config);
        state
    }

    fn request(peer: &str, forwarded: Option<&str>) -> axum::http::Request<Body> {
        let mut req = axum::http::Request::get("/ping");
        if let Some(forwarded) = forwarded {
            req = req.header("x-forwarded-for", forwarded);
        }
        let mut req = req.body(Body::empty()).unwrap();
        let addr: SocketAddr = format!("{peer}:4000").parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[tokio::test]
    async fn rejects_past_the_limit() {
        // fake state allows 3 requests per window
        let state = AppState::fake();
        for _ in 0..3 {
            let res = app(state.clone()).oneshot(request("10.0.0.1", None)).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let res = app(state.clone()).oneshot(request("10.0.0.1", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);

        // other clients keep their own window
        let res = app(state).oneshot(request("10.0.0.2", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn forwarded_header_is_ignored_without_trusted_proxies() {
        let state = AppState::fake();
        let mut statuses = Vec::new();
        for i in 0..5 {
            let forwarded = format!("6.6.6.{i}");
            let res = app(state.clone())
                .oneshot(request("10.0.0.1", Some(&forwarded)))
                .await
                .unwrap();
            statuses.push(res.status());
        }
        assert_eq!(statuses[2], StatusCode::OK);
        assert_eq!(statuses[3], StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(statuses[4], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn rotating_spoofed_prefixes_share_one_window() {
        let state = behind_proxies(1);
        let mut rejected = 0;
        for i in 0..20 {
            let forwarded = format!("6.6.6.{i}, 10.0.0.1");
            let res = app(state.clone())
                .oneshot(request("172.16.0.9", Some(&forwarded)))
                .await
                .unwrap();
            if res.status() == StatusCode::TOO_MANY_REQUESTS {
                rejected += 1;
            }
        }
        assert_eq!(rejected, 17);
    }

    #[test]
    fn picks_entry_by_trusted_hops() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "6.6.6.6, 1.2.3.4, 10.0.0.1".parse().unwrap());
        assert_eq!(forwarded_for(&headers, 1).as_deref(), Some("10.0.0.1"));
        assert_eq!(forwarded_for(&headers, 2).as_deref(), Some("1.2.3.4"));
        assert_eq!(forwarded_for(&headers, 5).as_deref(), Some("6.6.6.6"));
        assert_eq!(forwarded_for(&HeaderMap::new(), 1), None);
    }
}
