//! Remote metadata source
//!
//! Fetches `sensors.json` and `locations.json` from a base URL, optionally
//! authenticated with a bearer token.

use reqwest::Client;
use tracing::debug;

use crate::error::{MetadataError, Result};
use crate::store::{LOCATIONS_FILE, MetadataStore, SENSORS_FILE};

/// HTTP client for a remote metadata source
#[derive(Debug, Clone)]
pub struct MetadataClient {
    /// Base URL the metadata files are served under
    base_url: String,
    access_token: Option<String>,
    client: Client,
}

impl MetadataClient {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self::with_client(base_url, access_token, Client::new())
    }

    /// Create a metadata client with a custom HTTP client
    pub fn with_client(
        base_url: impl Into<String>,
        access_token: Option<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn file_url(&self, file: &str) -> String {
        format!("{}/{}", self.base_url, file)
    }

    /// Download both metadata files and build a store from them
    pub async fn fetch(&self) -> Result<MetadataStore> {
        let sensors = self.fetch_file(SENSORS_FILE).await?;
        let locations = self.fetch_file(LOCATIONS_FILE).await?;
        MetadataStore::from_json(&sensors, &locations)
    }

    async fn fetch_file(&self, file: &str) -> Result<String> {
        let url = self.file_url(file);
        debug!("Fetching metadata file {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Check the status code and return the body text
    async fn handle_response(&self, response: reqwest::Response) -> Result<String> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(MetadataError::api_error(status.as_u16(), error_text));
        }

        Ok(response.text().await?)
    }
}
