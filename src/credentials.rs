//! Ambient credentials for the execution identity.
//!
//! The handler never owns credentials. A [`CredentialSource`] is handed to it
//! per call and asked for a fresh token; nothing is cached between invocations.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, DRIVE_SCOPE};

const TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("{0}")]
    Unavailable(String),
    #[error("metadata server request failed: {0}")]
    Http(String),
    #[error("metadata server returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid token response: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "access_token")]
    pub token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl AccessToken {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self { token: token.into(), token_type: default_token_type(), expires_in: None }
    }
}

#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken, CredentialError>;
}

/// Token endpoint of the instance metadata server, reachable only from
/// inside the hosting environment.
pub struct MetadataServerSource {
    http: reqwest::Client,
    base_url: String,
    scopes: Vec<String>,
}

impl MetadataServerSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, scopes: Vec<String>) -> Self {
        Self { http, base_url: base_url.into(), scopes }
    }

    fn token_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), TOKEN_PATH)
    }
}

#[async_trait]
impl CredentialSource for MetadataServerSource {
    async fn access_token(&self) -> Result<AccessToken, CredentialError> {
        let mut request = self.http.get(self.token_url()).header("Metadata-Flavor", "Google");
        if !self.scopes.is_empty() {
            request = request.query(&[("scopes", self.scopes.join(","))]);
        }

        // Only a refused or unresolvable connection means there is no ambient identity
        let response = request.send().await.map_err(|error| {
            if error.is_connect() {
                debug!(%error, "metadata server unreachable");
                CredentialError::Unavailable("no default credentials".to_string())
            } else {
                CredentialError::Http(error.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected { status: status.as_u16(), body });
        }

        response
            .json::<AccessToken>()
            .await
            .map_err(|error| CredentialError::Malformed(error.to_string()))
    }
}

/// A token handed in through configuration, for invoking the function
/// from outside the platform.
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl CredentialSource for StaticTokenSource {
    async fn access_token(&self) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken::bearer(self.token.clone()))
    }
}

pub fn credential_source_from_config(config: &Config, http: reqwest::Client) -> Box<dyn CredentialSource> {
    match &config.access_token {
        Some(token) => Box::new(StaticTokenSource::new(token.clone())),
        None => Box::new(MetadataServerSource::new(
            http,
            config.metadata_url.clone(),
            vec![DRIVE_SCOPE.to_string()],
        )),
    }
}
