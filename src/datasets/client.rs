//! Client for the remote dataset server.
//!
//! The remote server is optional: when configured it enriches the embedded
//! catalog at startup, and when unreachable the platform keeps serving the
//! embedded inventory.

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::Dataset;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid dataset server URL: {0}")]
    InvalidUrl(String),

    #[error("dataset server request failed: {0}")]
    Network(String),

    #[error("dataset server returned status {0}")]
    Status(u16),

    #[error("dataset server response is malformed: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct RemoteCatalogResponse {
    datasets: Vec<Dataset>,
}

pub struct DatasetServerClient {
    base: Url,
    api_key: String,
    client: reqwest::Client,
}

impl DatasetServerClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        Ok(Self {
            base,
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        })
    }

    fn datasets_url(&self) -> Result<Url, ClientError> {
        self.base
            .join("datasets/full/")
            .map_err(|e| ClientError::InvalidUrl(e.to_string()))
    }

    /// Fetch the remote dataset inventory.
    pub async fn fetch_datasets(&self) -> Result<Vec<Dataset>, ClientError> {
        let url = self.datasets_url()?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ClientError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ClientError::Status(response.status().as_u16()));
        }

        let body: RemoteCatalogResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(body.datasets)
    }
}
