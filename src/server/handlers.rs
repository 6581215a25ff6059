//! Request routing and handlers

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

use crate::engine::{ComputeEngine, SeriesRequest};

const JSON: &str = "application/json";
const TEXT: &str = "text/plain; charset=utf-8";

/// Route one request. Never fails: every error becomes a status code.
pub async fn handle<B>(engine: Arc<ComputeEngine>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let request_id = Uuid::new_v4();
    let span = tracing::debug_span!(
        "request",
        id = %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );

    async move {
        let response = match (req.method(), req.uri().path()) {
            (&Method::POST, "/calculate") => calculate(&engine, req).await,
            (_, "/calculate") => text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed"),
            (&Method::GET, "/health") => text(StatusCode::OK, "OK"),
            (&Method::GET, "/metrics") => metrics(&engine),
            _ => text(StatusCode::NOT_FOUND, "not found"),
        };
        debug!("Responded {}", response.status());
        response
    }
    .instrument(span)
    .await
}

async fn calculate<B>(engine: &ComputeEngine, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: std::fmt::Display,
{
    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return text(StatusCode::BAD_REQUEST, "unreadable body");
        }
    };

    let requests: Vec<SeriesRequest> = match serde_json::from_slice(&body) {
        Ok(requests) => requests,
        Err(e) => {
            debug!("Rejected request body: {}", e);
            return text(StatusCode::BAD_REQUEST, &format!("invalid request: {}", e));
        }
    };

    debug!("Calculating {} requests", requests.len());
    let results = engine.compute_batch(&requests).await;

    match serde_json::to_vec(&results) {
        Ok(encoded) => respond(StatusCode::OK, JSON, Bytes::from(encoded)),
        Err(e) => {
            warn!("Failed to encode results: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn metrics(engine: &ComputeEngine) -> Response<Full<Bytes>> {
    match engine.metrics().encode() {
        Ok((content_type, buffer)) => {
            let mut response = respond(StatusCode::OK, TEXT, Bytes::from(buffer));
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                response.headers_mut().insert(CONTENT_TYPE, value);
            }
            response
        }
        Err(e) => {
            warn!("Failed to encode metrics: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    respond(status, TEXT, Bytes::copy_from_slice(body.as_bytes()))
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

// =============================================================================
// Tests
// =============================================================================
