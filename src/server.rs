// HTTP API: `POST /api/price` in front of the price service.

use crate::client::RateApi;
use crate::package::{InvalidPackage, PackageSpec};
use crate::service::{PriceError, PriceOutcome, PriceQuery, PriceService};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub const NO_VALID_COMBINATIONS: &str = "No valid combinations";
pub const PROCESSING_FAILED: &str = "Error in processing request";
const HOME_PAGE: &str = "/index.html";

/// Rejections of a malformed inbound request. Always answered with 400.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Cannot parse content type other than JSON")]
    UnsupportedContentType,

    #[error("Request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("International requests must include both country string and weight object")]
    IncompleteInternational,

    #[error("Domestic requests must include starting and ending zip strings and weight object")]
    IncompleteDomestic,

    #[error("Type must be either domestic or international")]
    UnknownType,

    #[error("Invalid weight object: {0}")]
    InvalidWeight(String),

    #[error(transparent)]
    InvalidPackage(#[from] InvalidPackage),
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub err: String,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { err: message.into() })).into_response()
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        error_body(StatusCode::BAD_REQUEST, self.to_string())
    }
}

impl IntoResponse for PriceError {
    fn into_response(self) -> Response {
        match self {
            PriceError::InvalidPackage(e) => RequestError::from(e).into_response(),
            // Upstream details stay in the log.
            other => {
                error!(error = %other, "price request failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, PROCESSING_FAILED)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PriceRequestBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    zip_start: Option<String>,
    zip_end: Option<String>,
    country: Option<String>,
    weight: Option<serde_json::Value>,
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validates an inbound price request and turns it into a query.
pub fn parse_price_request(headers: &HeaderMap, body: &[u8]) -> Result<PriceQuery, RequestError> {
    if !is_json(headers) {
        return Err(RequestError::UnsupportedContentType);
    }
    let body: PriceRequestBody =
        serde_json::from_slice(body).map_err(|e| RequestError::MalformedBody(e.to_string()))?;

    let kind = body.kind.as_deref().map(str::to_lowercase).unwrap_or_default();
    let weight = |missing: RequestError| -> Result<PackageSpec, RequestError> {
        let value = body.weight.clone().filter(|w| w.is_object()).ok_or(missing)?;
        let spec: PackageSpec =
            serde_json::from_value(value).map_err(|e| RequestError::InvalidWeight(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    };

    match kind.as_str() {
        "international" => {
            let spec = weight(RequestError::IncompleteInternational)?;
            let country = present(body.country.clone()).ok_or(RequestError::IncompleteInternational)?;
            Ok(PriceQuery::International { country, spec })
        }
        "domestic" => {
            let spec = weight(RequestError::IncompleteDomestic)?;
            let (Some(zip_origination), Some(zip_destination)) =
                (present(body.zip_start.clone()), present(body.zip_end.clone()))
            else {
                return Err(RequestError::IncompleteDomestic);
            };
            Ok(PriceQuery::Domestic {
                zip_origination,
                zip_destination,
                spec,
            })
        }
        _ => Err(RequestError::UnknownType),
    }
}

pub struct AppState<A> {
    pub service: Arc<PriceService<A>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}

impl<A> AppState<A> {
    pub fn new(service: Arc<PriceService<A>>) -> Self {
        Self { service }
    }
}

async fn price<A: RateApi>(State(state): State<AppState<A>>, headers: HeaderMap, body: Bytes) -> Response {
    let query = match parse_price_request(&headers, &body) {
        Ok(query) => query,
        Err(e) => {
            warn!(error = %e, "rejected price request");
            return e.into_response();
        }
    };

    match state.service.quote(&query).await {
        Ok(PriceOutcome::NoValidCombination) => error_body(StatusCode::OK, NO_VALID_COMBINATIONS),
        Ok(PriceOutcome::Packages(outcomes)) => (StatusCode::OK, Json(outcomes)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> &'static str {
    "ok"
}

// The browser UI is served separately; stray page loads land on its entry point.
async fn fallback(method: Method, uri: Uri) -> Response {
    if method == Method::GET && uri.path() != HOME_PAGE {
        return (StatusCode::FOUND, [(header::LOCATION, HOME_PAGE)]).into_response();
    }
    error_body(StatusCode::NOT_FOUND, "Not found")
}

pub fn router<A: RateApi>(state: AppState<A>) -> Router {
    Router::new()
        .route("/api/price", post(price::<A>))
        .route("/health", get(health))
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve<A: RateApi>(
    listener: TcpListener,
    state: AppState<A>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "price API listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
