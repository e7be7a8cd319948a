// Upstream rate API client: posts the form-encoded `API`/`XML` pair and
// decodes the XML document that comes back.

use crate::request::{WireRequest, DEFAULT_MAX_PACKAGES_PER_REQUEST};
use crate::xml_response::{parse_response, ProcessingError, RateResponse};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "http://production.shippingapis.com/ShippingAPI.dll";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError { status_code: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(#[from] ProcessingError),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub user_id: String,
    pub timeout_ms: u64,
    pub max_packages_per_request: usize,
}

impl ClientConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_id: user_id.into(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_packages_per_request: DEFAULT_MAX_PACKAGES_PER_REQUEST,
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.user_id.trim().is_empty() {
            return Err(ClientError::ConfigError("user id must not be empty".to_string()));
        }
        reqwest::Url::parse(&self.base_url)
            .map_err(|e| ClientError::ConfigError(format!("invalid base url {:?}: {e}", self.base_url)))?;
        if self.max_packages_per_request == 0 {
            return Err(ClientError::ConfigError(
                "max packages per request must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport to the rate service. Implementations must not retry.
#[async_trait]
pub trait RateApi: Send + Sync + 'static {
    async fn fetch(&self, request: &WireRequest) -> Result<RateResponse, ApiError>;
}

pub struct UspsClient {
    http: reqwest::Client,
    base_url: String,
    timeout_ms: u64,
}

impl UspsClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ApiError {
        if err.is_timeout() {
            ApiError::Timeout(self.timeout_ms)
        } else {
            ApiError::NetworkError(err.to_string())
        }
    }
}

#[async_trait]
impl RateApi for UspsClient {
    async fn fetch(&self, request: &WireRequest) -> Result<RateResponse, ApiError> {
        debug!(api = %request.api, packages = request.package_ids.len(), "sending rate request");

        let response = self
            .http
            .post(&self.base_url)
            .form(&[("API", request.api.as_str()), ("XML", request.xml.as_str())])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!(status = status.as_u16(), xml = %request.xml, "rate service returned an error status");
            return Err(ApiError::ApiResponseError {
                status_code: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        let document = parse_response(&body)?;
        if let RateResponse::Error(err) = &document {
            error!(
                number = %err.number,
                description = %err.description,
                xml = %request.xml,
                "rate service rejected the request"
            );
        }
        Ok(document)
    }
}
