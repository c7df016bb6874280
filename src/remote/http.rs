//! HTTP client for the hosted table service.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET /rest/{store}`: every row owned by the caller
//! - `POST /rest/{store}`: upsert one row
//! - `DELETE /rest/{store}/{id}`: delete one row
//! - `GET /me`: identity behind the API key
//! - `GET /health`: unauthenticated liveness check

use async_trait::async_trait;
use reqwest::{Response, StatusCode, Url};
use serde::Deserialize;

use super::{RemoteError, RemoteStore};
use crate::config::SyncConfig;
use crate::models::{Record, StoreName};

#[derive(Debug, Deserialize)]
struct MeResponse {
    user_id: String,
}

/// Remote store backed by the REST table service.
#[derive(Debug, Clone)]
pub struct RestRemote {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl RestRemote {
    pub fn new(server_url: impl AsRef<str>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(server_url.as_ref()),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Creates a client from config.
    ///
    /// Returns an error if sync is not configured.
    pub fn from_config(config: &SyncConfig) -> Result<Self, RemoteError> {
        let server_url = config
            .server_url
            .as_deref()
            .ok_or(RemoteError::NotConfigured)?;
        let api_key = config.api_key.clone().ok_or(RemoteError::NotConfigured)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RemoteError::Network(e.to_string()))?;
        Ok(Self {
            client,
            ..Self::new(server_url, api_key)
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, store: StoreName) -> String {
        format!("{}/rest/{}", self.base_url, store)
    }

    fn row_url(&self, store: StoreName, id: &str) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&self.table_url(store))
            .map_err(|e| RemoteError::Network(format!("invalid server url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Network("server url cannot be a base".to_string()))?
            .push(id);
        Ok(url)
    }

    /// Resolves the user id the API key belongs to.
    pub async fn whoami(&self) -> Result<String, RemoteError> {
        let response = self
            .client
            .get(format!("{}/me", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let me: MeResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(me.user_id)
    }
}

#[async_trait]
impl RemoteStore for RestRemote {
    async fn select_all(&self, store: StoreName) -> Result<Vec<Record>, RemoteError> {
        let response = self
            .client
            .get(self.table_url(store))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response)
            .await?
            .json::<Vec<Record>>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn upsert(&self, store: StoreName, row: Record) -> Result<(), RemoteError> {
        let response = self
            .client
            .post(self.table_url(store))
            .bearer_auth(&self.api_key)
            .json(&row)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn delete_by_id(&self, store: StoreName, id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.row_url(store, id)?)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response).await?;
        Ok(())
    }
}

/// Checks whether the server answers its health check.
pub async fn check_server(server_url: &str) -> bool {
    let url = format!("{}/health", normalize_base_url(server_url));
    match reqwest::get(&url).await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}

/// Bare hosts get `http://`; trailing slashes are trimmed.
fn normalize_base_url(server_url: &str) -> String {
    let trimmed = server_url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::Decode(e.to_string())
    } else {
        RemoteError::Network(e.to_string())
    }
}

async fn check_status(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(message),
        s if s.is_server_error() => RemoteError::Server {
            status: s.as_u16(),
            message,
        },
        s => RemoteError::Rejected {
            status: s.as_u16(),
            message,
        },
    })
}
