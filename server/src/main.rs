//! obo-gateway: On-Behalf-Of token exchange gateway - HTTP adapter
//!
//! Lightweight HTTP server using hyper. Builds the platform services and the
//! gateway once, then runs the core pipeline for every request.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use obo_gateway_core::config::HTTP_TIMEOUT_SECS;
use obo_gateway_core::sts::Gateway;

mod platform;

use platform::{ProcessEnv, ReqwestHttpClient, SystemClock};

/// Shared application state
struct AppState {
    gateway: Gateway,
    http: ReqwestHttpClient,
    clock: SystemClock,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "obo-gateway stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let port: u16 = match std::env::var("PORT") {
        Ok(raw) => raw.parse().map_err(|_| format!("PORT must be a number, got '{}'", raw))?,
        Err(_) => 8080,
    };

    let gateway = Gateway::from_env(&ProcessEnv);
    let timeout = gateway
        .config()
        .map(|c| c.http_timeout)
        .unwrap_or(Duration::from_secs(HTTP_TIMEOUT_SECS));

    let state = Arc::new(AppState {
        gateway,
        http: ReqwestHttpClient::new(timeout)?,
        clock: SystemClock,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "obo-gateway listening");

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                return Ok(());
            }
        };

        let state = state.clone();
        tokio::spawn(async move {
            let io = hyper_util::rt::TokioIo::new(stream);
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, &state).await }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}

type HyperResponse = Response<Full<Bytes>>;

async fn handle_request(
    req: Request<Incoming>,
    state: &AppState,
) -> Result<HyperResponse, std::convert::Infallible> {
    Ok(route_request(req, state).await)
}

async fn route_request(req: Request<Incoming>, state: &AppState) -> HyperResponse {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => handle_health(state),
        (&Method::GET | &Method::POST, "/api/exchange") => handle_exchange(req.headers(), state).await,
        _ => json_response(StatusCode::NOT_FOUND, &serde_json::json!({"error": "not_found"})),
    }
}

fn handle_health(state: &AppState) -> HyperResponse {
    let status = if state.gateway.config().is_ok() {
        "ok"
    } else {
        "misconfigured"
    };

    json_response(
        StatusCode::OK,
        &serde_json::json!({
            "name": "obo-gateway",
            "status": status,
        }),
    )
}

async fn handle_exchange(headers: &HeaderMap, state: &AppState) -> HyperResponse {
    let pairs = header_pairs(headers);
    let response = state.gateway.respond(&pairs, &state.http, &state.clock).await;

    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &response.body)
}

/// Borrow hyper headers as name/value pairs
///
/// Values that are not visible ASCII keep their position but read as empty,
/// so an opaque `Authorization` header fails the scheme check instead of
/// letting a later one through.
fn header_pairs(headers: &HeaderMap) -> Vec<(&str, &str)> {
    headers
        .iter()
        .map(|(name, value)| (name.as_str(), value.to_str().unwrap_or_default()))
        .collect()
}

fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> HyperResponse {
    let json = serde_json::to_vec(body).unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response.headers_mut().insert(
        hyper::header::CACHE_CONTROL,
        hyper::header::HeaderValue::from_static("no-store"),
    );
    response
}
