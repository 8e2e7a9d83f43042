//! Auxiliary service clients
//!
//! Each service exposes a per-project configuration endpoint accepting the
//! database credentials it should use, and a per-project health endpoint.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pgmux_core::{ServiceName, Settings};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Credentials pushed to a service
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCredentials {
    pub database_user: String,
    pub database_password: String,
    pub database_name: String,
}

impl fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("database_user", &self.database_user)
            .field("database_password", &"<redacted>")
            .field("database_name", &self.database_name)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ServiceClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service responded {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Rejected(String),
}

#[async_trait]
pub trait ServiceClient: Send + Sync {
    fn service(&self) -> ServiceName;

    /// Point the service at the project's database with these credentials
    async fn configure(
        &self,
        project_ref: &str,
        credentials: &ServiceCredentials,
    ) -> Result<(), ServiceClientError>;

    /// Lightweight connectivity check for one project
    async fn probe(&self, project_ref: &str) -> Result<(), ServiceClientError>;
}

/// JSON-over-HTTP service admin API
pub struct HttpServiceClient {
    service: ServiceName,
    base_url: Url,
    client: reqwest::Client,
}

impl HttpServiceClient {
    pub fn new(service: ServiceName, base_url: Url, timeout: Duration) -> Result<Self, ServiceClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pgmux/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            service,
            base_url,
            client,
        })
    }

    /// One client per service from the configured endpoints
    pub fn from_settings(settings: &Settings) -> Result<Vec<Self>, ServiceClientError> {
        ServiceName::ALL
            .iter()
            .map(|service| {
                Self::new(
                    *service,
                    settings.services.url_for(*service).clone(),
                    settings.service_timeout,
                )
            })
            .collect()
    }

    fn endpoint(&self, project_ref: &str, path: &str) -> String {
        format!(
            "{}/admin/projects/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            project_ref,
            path
        )
    }

    async fn check(response: reqwest::Response) -> Result<(), ServiceClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(ServiceClientError::Status {
            status: status.as_u16(),
            body: truncate(&body, 512),
        })
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    fn service(&self) -> ServiceName {
        self.service
    }

    async fn configure(
        &self,
        project_ref: &str,
        credentials: &ServiceCredentials,
    ) -> Result<(), ServiceClientError> {
        let url = self.endpoint(project_ref, "database");
        debug!(service = %self.service, %url, "[ServiceConfig] Pushing database credentials");
        let response = self.client.post(&url).json(credentials).send().await?;
        Self::check(response).await
    }

    async fn probe(&self, project_ref: &str) -> Result<(), ServiceClientError> {
        let response = self
            .client
            .get(self.endpoint(project_ref, "health"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ServiceClientError::Rejected(format!(
                "{} does not know project {}",
                self.service, project_ref
            )));
        }
        Self::check(response).await
    }
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
