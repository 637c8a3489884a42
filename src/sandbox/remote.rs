//! REST client for a remote code-execution sandbox service
//!
//! | Operation | Request |
//! |---|---|
//! | create | `POST /sandboxes` |
//! | write file | `PUT /sandboxes/{id}/files?path=` (raw body) |
//! | read file | `GET /sandboxes/{id}/files?path=` |
//! | list dir | `GET /sandboxes/{id}/files/list?path=` |
//! | run code | `POST /sandboxes/{id}/execute` |
//! | kill | `DELETE /sandboxes/{id}` |
//!
//! Every request carries the `X-API-Key` header when a key is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{DirEntry, RunOutput, Sandbox, SandboxError, SandboxProvider};
use crate::config::SandboxConfig;

const API_KEY_HEADER: &str = "X-API-Key";

/// Shared HTTP plumbing for the provider and its sandboxes
#[derive(Clone)]
struct Api {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl Api {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(SandboxError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Provisions sandboxes from the remote service
pub struct RemoteSandboxProvider {
    api: Api,
}

impl RemoteSandboxProvider {
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            api: Api {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                client: reqwest::Client::new(),
            },
        }
    }
}

#[derive(Deserialize)]
struct Created {
    #[serde(alias = "sandboxId", alias = "sandbox_id")]
    id: String,
}

#[async_trait]
impl SandboxProvider for RemoteSandboxProvider {
    async fn create(&self) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let provision = |e: SandboxError| SandboxError::Provision(e.to_string());

        let response = self
            .api
            .request(reqwest::Method::POST, "/sandboxes")
            .json(&serde_json::json!({ "template": "python" }))
            .send()
            .await
            .map_err(|e| provision(e.into()))?;
        let created: Created = check(response)
            .await
            .map_err(provision)?
            .json()
            .await
            .map_err(|e| provision(e.into()))?;

        debug!(sandbox_id = %created.id, "sandbox created");
        Ok(Arc::new(RemoteSandbox {
            id: created.id,
            api: self.api.clone(),
        }))
    }
}

/// A sandbox living on the remote service
pub struct RemoteSandbox {
    id: String,
    api: Api,
}

#[derive(Deserialize)]
struct RemoteEntry {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

impl RemoteSandbox {
    fn path(&self, suffix: &str) -> String {
        format!("/sandboxes/{}{}", self.id, suffix)
    }
}

#[async_trait]
impl Sandbox for RemoteSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
        let response = self
            .api
            .request(reqwest::Method::PUT, &self.path("/files"))
            .query(&[("path", path)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content.to_vec())
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, SandboxError> {
        let response = self
            .api
            .request(reqwest::Method::GET, &self.path("/files"))
            .query(&[("path", path)])
            .send()
            .await?;
        Ok(check(response).await?.bytes().await?.to_vec())
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<DirEntry>, SandboxError> {
        let response = self
            .api
            .request(reqwest::Method::GET, &self.path("/files/list"))
            .query(&[("path", path)])
            .send()
            .await?;
        let entries: Vec<RemoteEntry> = check(response).await?.json().await?;
        Ok(entries
            .into_iter()
            .map(|e| DirEntry {
                is_dir: e.kind == "dir" || e.kind == "directory",
                name: e.name,
                size: e.size,
            })
            .collect())
    }

    async fn run_code(&self, code: &str, timeout: Duration) -> Result<RunOutput, SandboxError> {
        let response = self
            .api
            .request(reqwest::Method::POST, &self.path("/execute"))
            .json(&serde_json::json!({
                "language": "python",
                "code": code,
                "timeout_secs": timeout.as_secs(),
            }))
            // Leave the service room to report its own timeout first
            .timeout(timeout + Duration::from_secs(5))
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        let response = self
            .api
            .request(reqwest::Method::DELETE, &self.path(""))
            .send()
            .await?;
        check(response).await?;
        debug!(sandbox_id = %self.id, "sandbox killed");
        Ok(())
    }
}
