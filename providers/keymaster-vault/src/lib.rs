//! HashiCorp Vault backend using the live Vault HTTP API.
//!
//! Logical paths map directly onto `/v1/<path>`. Reads unwrap the `data`
//! envelope of the response; a 404 or an empty envelope reads as absent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use keymaster_core::{BackendError, Document, LogicalBackend};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub addr: String,
    pub token: String,
    pub namespace: Option<String>,
    pub timeout: Duration,
    pub ca_bundle: Option<Vec<u8>>,
    pub insecure_skip_tls: bool,
}

impl VaultConfig {
    pub fn new(addr: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: token.into(),
            namespace: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            ca_bundle: None,
            insecure_skip_tls: false,
        }
    }

    pub fn from_env() -> Result<Self> {
        let addr = std::env::var("VAULT_ADDR").context("set VAULT_ADDR to the Vault server URL")?;
        let token =
            std::env::var("VAULT_TOKEN").context("set VAULT_TOKEN for Vault authentication")?;
        let namespace = std::env::var("VAULT_NAMESPACE")
            .ok()
            .filter(|value| !value.is_empty());
        let timeout = std::env::var("VAULT_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let ca_bundle = std::env::var("VAULT_CA_BUNDLE")
            .ok()
            .map(|path| fs::read(path).context("failed to read VAULT_CA_BUNDLE"))
            .transpose()?;
        let insecure_skip_tls = std::env::var("VAULT_INSECURE_SKIP_TLS")
            .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE"))
            .unwrap_or(false);

        Ok(Self {
            addr,
            token,
            namespace,
            timeout,
            ca_bundle,
            insecure_skip_tls,
        })
    }

    fn build_http_client(&self) -> Result<Client> {
        let mut builder = Client::builder().timeout(self.timeout);
        if let Some(ca) = self.ca_bundle.as_ref() {
            let cert = reqwest::Certificate::from_pem(ca)
                .or_else(|_| reqwest::Certificate::from_der(ca))
                .context("failed to parse VAULT_CA_BUNDLE")?;
            builder = builder.add_root_certificate(cert);
        }
        if self.insecure_skip_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build().context("failed to build Vault HTTP client")
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/v1/{}",
            self.addr.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[derive(Clone)]
pub struct VaultBackend {
    config: VaultConfig,
    client: Client,
}

impl VaultBackend {
    pub fn new(config: VaultConfig) -> Result<Self> {
        let client = config.build_http_client()?;
        Ok(Self { config, client })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(VaultConfig::from_env()?)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.config.url(path))
            .header("X-Vault-Token", &self.config.token);
        if let Some(namespace) = &self.config.namespace {
            builder = builder.header("X-Vault-Namespace", namespace);
        }
        builder
    }
}

#[async_trait]
impl LogicalBackend for VaultBackend {
    async fn read(&self, path: &str) -> Result<Option<Document>, BackendError> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(BackendError::request)?;
        let status = response.status();
        debug!(path, %status, "vault read");
        match status {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                // A body cut short must not read as an absent document.
                let body = response.text().await.map_err(BackendError::request)?;
                parse_read_body(&body)
            }
            status => Err(BackendError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    async fn write(&self, path: &str, body: Document) -> Result<(), BackendError> {
        let response = self
            .request(Method::PUT, path)
            .json(&body)
            .send()
            .await
            .map_err(BackendError::request)?;
        let status = response.status();
        debug!(path, %status, "vault write");
        if status.is_success() {
            return Ok(());
        }
        Err(BackendError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }

    async fn delete(&self, path: &str) -> Result<(), BackendError> {
        let response = self
            .request(Method::DELETE, path)
            .send()
            .await
            .map_err(BackendError::request)?;
        let status = response.status();
        debug!(path, %status, "vault delete");
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(BackendError::Status {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    data: Option<Value>,
}

fn parse_read_body(body: &str) -> Result<Option<Document>, BackendError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    let parsed: ReadResponse = serde_json::from_str(body).map_err(|err| {
        BackendError::Malformed(format!("failed to decode vault response: {err}; body={body}"))
    })?;
    match parsed.data {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::Null) | None => Ok(None),
        Some(other) => Err(BackendError::Malformed(format!(
            "vault response data is not an object: {other}"
        ))),
    }
}
