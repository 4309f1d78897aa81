//! HTTP implementation of the storage backend
//!
//! Talks to the storage REST API with reqwest. Every call is single-shot: no
//! retries and no whole-request timeout, only a connect timeout.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET    /storage/folder/<p>`          list
//! - `POST   /storage/folder/<p>/<name>`   create folder
//! - `PATCH  /storage/folder/<p>/<name>`   move/rename, body `{"path": "<literal>"}`
//! - `DELETE /storage/folder/<p>/<name>`
//! - `POST   /storage/file/<p>/<name>`     multipart chunk
//! - `PATCH  /storage/file/<p>/<name>`     move/rename
//! - `DELETE /storage/file/<p>/<name>`
//! - `GET    /storage/file/<p>/<name>`     raw bytes

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{ChunkPayload, DownloadedFile, ProviderError, RawEntry, StorageBackend};
use crate::path::RemotePath;

const FOLDER_ENDPOINT: &str = "storage/folder";
const FILE_ENDPOINT: &str = "storage/file";
const USER_AGENT: &str = concat!("folio-storage/", env!("CARGO_PKG_VERSION"));

/// Connection settings for `HttpBackend`
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// API base, e.g. `https://example.com/api`
    pub base_url: url::Url,
    /// Bearer token sent with every request, if set
    pub api_token: Option<SecretString>,
    pub connect_timeout_secs: u64,
}

impl HttpBackendConfig {
    pub fn new(base_url: &str) -> Result<Self, ProviderError> {
        let base_url = url::Url::parse(base_url)
            .map_err(|e| ProviderError::InvalidConfig(format!("Invalid base URL '{}': {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidConfig(format!(
                "Base URL '{}' cannot carry a path",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            api_token: None,
            connect_timeout_secs: 30,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(SecretString::from(token.into()));
        self
    }
}

pub struct HttpBackend {
    config: HttpBackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: HttpBackendConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ProviderError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Endpoint URL for `parent/name` in URL-segment form.
    pub(crate) fn endpoint_url(&self, endpoint: &str, parent: &RemotePath, name: Option<&str>) -> String {
        let base = self.config.base_url.as_str().trim_end_matches('/');
        let tail = parent.to_url_path(name);
        if tail.is_empty() {
            format!("{}/{}/", base, endpoint)
        } else {
            format!("{}/{}/{}", base, endpoint, tail)
        }
    }

    fn auth_header(&self) -> Result<Option<HeaderValue>, ProviderError> {
        match &self.config.api_token {
            Some(token) => HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map(Some)
                .map_err(|e| ProviderError::InvalidConfig(format!("Invalid characters in API token: {}", e))),
            None => Ok(None),
        }
    }

    fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, ProviderError> {
        let mut builder = self.client.request(method, url);
        if let Some(auth) = self.auth_header()? {
            builder = builder.header(AUTHORIZATION, auth);
        }
        Ok(builder)
    }

    /// Send and turn any non-2xx response into an error for `display_path`.
    async fn send(&self, builder: RequestBuilder, display_path: &str) -> Result<Response, ProviderError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        debug!("{} -> HTTP {}", display_path, status);
        Err(ProviderError::from_status(status.as_u16(), display_path, &body))
    }

    async fn patch_path(
        &self,
        endpoint: &str,
        parent: &RemotePath,
        name: &str,
        target: &str,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint_url(endpoint, parent, Some(name));
        let builder = self
            .request(Method::PATCH, &url)?
            .json(&serde_json::json!({ "path": target }));
        self.send(builder, &parent.to_body_path(Some(name))).await?;
        Ok(())
    }

    async fn delete_at(&self, endpoint: &str, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        let url = self.endpoint_url(endpoint, parent, Some(name));
        let builder = self.request(Method::DELETE, &url)?;
        self.send(builder, &parent.to_body_path(Some(name))).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    async fn list_folder(&self, path: &RemotePath) -> Result<Vec<RawEntry>, ProviderError> {
        let url = self.endpoint_url(FOLDER_ENDPOINT, path, None);
        let builder = self.request(Method::GET, &url)?;
        let resp = self.send(builder, &path.to_body_path(None)).await?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(format!("Listing of {}: {}", path, e)))?;
        parse_listing(body)
    }

    async fn create_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        let url = self.endpoint_url(FOLDER_ENDPOINT, parent, Some(name));
        let builder = self.request(Method::POST, &url)?;
        self.send(builder, &parent.to_body_path(Some(name))).await?;
        Ok(())
    }

    async fn move_folder(&self, parent: &RemotePath, name: &str, target: &str) -> Result<(), ProviderError> {
        self.patch_path(FOLDER_ENDPOINT, parent, name, target).await
    }

    async fn delete_folder(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        self.delete_at(FOLDER_ENDPOINT, parent, name).await
    }

    async fn upload_chunk(&self, parent: &RemotePath, chunk: ChunkPayload) -> Result<(), ProviderError> {
        let url = self.endpoint_url(FILE_ENDPOINT, parent, Some(&chunk.file_name));
        let display_path = parent.to_body_path(Some(&chunk.file_name));

        let part = reqwest::multipart::Part::bytes(chunk.data)
            .file_name(chunk.file_name.clone())
            .mime_str(&chunk.mime)
            .map_err(|e| ProviderError::InvalidConfig(format!("MIME parse error: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("file_id", chunk.file_id)
            .text("chunk_index", chunk.chunk_index.to_string())
            .text("total_chunks", chunk.total_chunks.to_string())
            .part("chunk_data", part);

        let builder = self.request(Method::POST, &url)?.multipart(form);
        self.send(builder, &display_path).await?;
        Ok(())
    }

    async fn move_file(&self, parent: &RemotePath, name: &str, target: &str) -> Result<(), ProviderError> {
        self.patch_path(FILE_ENDPOINT, parent, name, target).await
    }

    async fn delete_file(&self, parent: &RemotePath, name: &str) -> Result<(), ProviderError> {
        self.delete_at(FILE_ENDPOINT, parent, name).await
    }

    async fn download_file(&self, parent: &RemotePath, name: &str) -> Result<DownloadedFile, ProviderError> {
        let url = self.endpoint_url(FILE_ENDPOINT, parent, Some(name));
        let builder = self.request(Method::GET, &url)?;
        let resp = self.send(builder, &parent.to_body_path(Some(name))).await?;
        let mime = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;
        Ok(DownloadedFile {
            bytes: bytes.to_vec(),
            mime,
        })
    }
}

/// Listing bodies are either a bare array or `{"items": [...]}`. Any other
/// object is rejected so an error payload is never read as an empty folder.
fn parse_listing(body: serde_json::Value) -> Result<Vec<RawEntry>, ProviderError> {
    let items = match body {
        serde_json::Value::Array(_) => body,
        serde_json::Value::Object(mut map) => match map.remove("items") {
            Some(items @ serde_json::Value::Array(_)) => items,
            _ => {
                let keys: Vec<String> = map.keys().cloned().collect();
                return Err(ProviderError::ParseError(format!(
                    "Listing object has no items array (keys: {})",
                    keys.join(", ")
                )));
            }
        },
        serde_json::Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ProviderError::ParseError(format!(
                "Unexpected listing body: {}",
                other
            )))
        }
    };
    serde_json::from_value(items).map_err(|e| ProviderError::ParseError(format!("Listing entry: {}", e)))
}
