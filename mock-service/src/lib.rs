//! A stand-in for the TensorFlow Serving REST predict API.
//!
//! The model name picks the behavior:
//! - `failing`: every predict call fails with a 500.
//! - `delay-<ms>`: answer after sleeping `<ms>` milliseconds.
//! - `limited-<tps>`: answer at no more than `<tps>` calls per second, queueing the rest.
//! - `max-<tps>`: answer at no more than `<tps>` calls per second, rejecting the rest with a 503.
//! - anything else: answer immediately.
//!
//! Every predict body must carry a non-empty `inputs` object, otherwise the call is rejected with
//! a 400 like the real service would.
use axum::{
    debug_handler,
    extract::{Json, Path},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lazy_static::lazy_static;
use metrics::counter;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, info, warn};

type Reply = (StatusCode, Json<Value>);

pub fn router() -> Router {
    Router::new()
        // `:model` is either a bare model name or `{model}:predict`.
        .route("/v1/models/:model", get(status).post(predict))
        .route(
            "/v1/models/:model/versions/:version_action",
            post(predict_version),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serve on `addr` until the process exits.
pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router()).await?;
    Ok(())
}

/// Serve on an ephemeral local port in the background.
pub async fn spawn() -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router()).await {
            warn!("Mock service stopped: {err}");
        }
    });
    Ok(addr)
}

#[debug_handler]
async fn status(Path(model): Path<String>) -> Reply {
    (
        StatusCode::OK,
        Json(json!({
            "model_version_status": [{
                "version": "1",
                "state": "AVAILABLE",
                "status": { "error_code": "OK", "error_message": "" }
            }],
            "model": model,
        })),
    )
}

#[debug_handler]
async fn predict(Path(model_action): Path<String>, Json(body): Json<Value>) -> Reply {
    match model_action.split_once(':') {
        Some((model, "predict")) => respond(model, &body).await,
        _ => not_found(&model_action),
    }
}

#[debug_handler]
async fn predict_version(
    Path((model, version_action)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Reply {
    match version_action.split_once(':') {
        Some((version, "predict")) if version.parse::<u64>().is_ok() => {
            respond(&model, &body).await
        }
        _ => not_found(&version_action),
    }
}

async fn respond(model: &str, body: &Value) -> Reply {
    PREDICT_CALLS.fetch_add(1, Ordering::Relaxed);
    counter!("mock_service.predict").increment(1);

    let inputs = match body.get("inputs") {
        Some(Value::Object(inputs)) if !inputs.is_empty() => inputs,
        _ => {
            return error(
                StatusCode::BAD_REQUEST,
                "Missing 'inputs' or 'instances' key",
            )
        }
    };

    if model == "failing" {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "Model failed to run");
    }

    if let Some(delay_ms) = suffix(model, "delay-") {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    } else if let Some(tps) = suffix(model, "limited-") {
        limiter(model, tps).until_ready().await;
    } else if let Some(tps) = suffix(model, "max-") {
        if limiter(model, tps).check().is_err() {
            debug!("Rejecting call to {model} over {tps} TPS");
            return error(StatusCode::SERVICE_UNAVAILABLE, "Too many requests");
        }
    }

    // Echo the first input back as the output, like an identity model.
    let outputs = inputs.values().next().cloned().unwrap_or(Value::Null);
    (StatusCode::OK, Json(json!({ "outputs": outputs })))
}

fn suffix(model: &str, prefix: &str) -> Option<u64> {
    model.strip_prefix(prefix)?.parse().ok()
}

fn error(status: StatusCode, message: &str) -> Reply {
    (status, Json(json!({ "error": message })))
}

fn not_found(path: &str) -> Reply {
    error(StatusCode::NOT_FOUND, &format!("Unknown action: {path}"))
}

lazy_static! {
    static ref LIMITERS: RwLock<HashMap<String, Arc<DefaultDirectRateLimiter>>> =
        RwLock::new(HashMap::new());
}

fn limiter(model: &str, tps: u64) -> Arc<DefaultDirectRateLimiter> {
    let existing = LIMITERS
        .read()
        .ok()
        .and_then(|limiters| limiters.get(model).cloned());
    if let Some(limiter) = existing {
        return limiter;
    }

    let limiter = Arc::new(rate_limiter(tps));
    match LIMITERS.write() {
        Ok(mut limiters) => limiters
            .entry(model.to_string())
            .or_insert(limiter)
            .clone(),
        Err(_) => limiter,
    }
}

pub fn rate_limiter(tps: u64) -> DefaultDirectRateLimiter {
    let tps = u32::try_from(tps).unwrap_or(u32::MAX);
    RateLimiter::direct(Quota::per_second(NonZeroU32::new(tps).unwrap_or(NonZeroU32::MIN)))
}

static PREDICT_CALLS: AtomicU64 = AtomicU64::new(0);

/// Print the predict call rate once a second.
pub async fn tps_measure_task() {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let calls = PREDICT_CALLS.swap(0, Ordering::Relaxed);
        println!("{calls} TPS");
    }
}
