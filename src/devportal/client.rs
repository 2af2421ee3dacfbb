//! Build service client for the connected developer account

use super::connection::DeveloperConnection;
use crate::error::{Result, StepError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const CONNECTION_PATH: &str = "apple_developer_portal_data.json";
const TOKEN_HEADER: &str = "BUILD_API_TOKEN";

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Source of the developer connection record for the current build
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn developer_connection(&self) -> Result<DeveloperConnection>;
}

/// Fetches the connection from the Bitrise build API
pub struct BitriseClient {
    http: reqwest::Client,
    build_url: String,
    build_api_token: String,
}

impl BitriseClient {
    pub fn new(build_url: &str, build_api_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| StepError::HttpRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            build_url: build_url.trim_end_matches('/').to_string(),
            build_api_token: build_api_token.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/{CONNECTION_PATH}", self.build_url)
    }
}

#[async_trait]
impl ConnectionProvider for BitriseClient {
    async fn developer_connection(&self) -> Result<DeveloperConnection> {
        let endpoint = self.endpoint();
        debug!("Fetching developer connection from {endpoint}");

        let response = self
            .http
            .get(&endpoint)
            .header(TOKEN_HEADER, &self.build_api_token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    StepError::HttpRequest(format!(
                        "Request to the build service timed out after {REQUEST_TIMEOUT_SECS} seconds"
                    ))
                } else if e.is_connect() {
                    StepError::HttpRequest(format!("Could not connect to the build service: {e}"))
                } else {
                    StepError::HttpRequest(format!("Failed to perform request: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StepError::HttpRequest(format!("Failed to read response body: {e}")))?;

        if status != reqwest::StatusCode::OK {
            return Err(StepError::Network {
                status: status.as_u16(),
                body,
            });
        }

        parse_connection(&body)
    }
}

/// Serves a connection record passed in directly, usually through
/// `BITRISE_PORTAL_DATA_JSON`, instead of asking the build service.
pub struct JsonConnectionProvider {
    body: String,
}

impl JsonConnectionProvider {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[async_trait]
impl ConnectionProvider for JsonConnectionProvider {
    async fn developer_connection(&self) -> Result<DeveloperConnection> {
        parse_connection(&self.body)
    }
}

fn parse_connection(body: &str) -> Result<DeveloperConnection> {
    serde_json::from_str(body).map_err(|e| {
        StepError::InvalidResponse(format!("failed to unmarshal response ({body}): {e}"))
    })
}
