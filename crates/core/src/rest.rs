//! Minimal management REST client
//!
//! Workflow execution goes through the remote CLI; the REST API is only used
//! for what the CLI does not expose to the harness, fetching a deployment's
//! declared outputs and probing the validated endpoint. Anything non-2xx on
//! the API itself is surfaced as a structured error for the lifecycle
//! controller to map.

use crate::errors::{Result, RestError};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::instrument;

/// Outputs declared by a deployment
#[derive(Debug, Clone, Deserialize)]
pub struct DeploymentOutputs {
    /// The deployment these outputs belong to
    pub deployment_id: String,
    /// Output key to value mapping
    pub outputs: Value,
}

impl DeploymentOutputs {
    /// Fetch one output value by key
    pub fn get(&self, key: &str) -> Result<&Value> {
        self.outputs
            .get(key)
            .ok_or_else(|| RestError::MissingOutput { key: key.to_string() }.into())
    }
}

/// Client for the management REST API
#[derive(Debug, Clone)]
pub struct RestClient {
    base_url: String,
    http: reqwest::Client,
}

impl RestClient {
    /// Create a client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(RestError::Http)?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Fetch a deployment's declared outputs
    #[instrument(level = "debug", skip(self))]
    pub async fn deployment_outputs(&self, deployment_id: &str) -> Result<DeploymentOutputs> {
        let response = self
            .http
            .get(self.url(&format!("/deployments/{}/outputs", deployment_id)))
            .send()
            .await
            .map_err(RestError::Http)?;

        let response = Self::expect_success(response).await?;
        let outputs = response
            .json::<DeploymentOutputs>()
            .await
            .map_err(RestError::Http)?;
        Ok(outputs)
    }

    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(RestError::Status {
                status: status.as_u16(),
                message,
            }
            .into())
        }
    }
}

/// GET a URL and return the response status code
///
/// Used by the deployment assertion to check the validated service answers.
pub async fn fetch_status(url: &str) -> Result<u16> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(RestError::Http)?;

    let response = client.get(url).send().await.map_err(RestError::Http)?;
    Ok(response.status().as_u16())
}
