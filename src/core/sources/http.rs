// src/core/sources/http.rs

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error, info};

use super::{HttpFetcher, HttpResponse};
use crate::config::Config;
use crate::core::models::{ErrorKind, ProbeError};

/// Builds the HTTP client shared by every HTTP-based collaborator.
pub fn build_client(config: &Config) -> Result<Client, ProbeError> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.network_timeout())
        .build()
        .map_err(|e| {
            error!(error = %e, "Failed to build HTTP client.");
            ProbeError::new(ErrorKind::Internal, format!("Failed to build HTTP client: {}", e))
        })
}

/// Maps a transport-level reqwest error onto a probe error kind.
pub fn classify(err: &reqwest::Error) -> ProbeError {
    if err.is_timeout() {
        ProbeError::timeout(format!("HTTP request timed out: {}", err))
    } else if err.is_decode() || err.is_body() {
        ProbeError::parse(format!("Could not read HTTP response: {}", err))
    } else {
        ProbeError::unreachable(format!("HTTP request failed: {}", err))
    }
}

/// GET with the shared client; the body is read as text.
pub(crate) async fn get_text(client: &Client, url: &str) -> Result<(u16, String), ProbeError> {
    debug!(url, "Sending HTTP GET.");
    let response = client.get(url).send().await.map_err(|e| classify(&e))?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(|e| classify(&e))?;
    Ok((status, body))
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str) -> Result<HttpResponse, ProbeError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            error!(url, error = %e, "HTTP request failed.");
            classify(&e)
        })?;
        info!(url, status = %response.status(), "Received HTTP response.");

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().map(str::to_string).unwrap_or_else(|_| "[Invalid UTF-8]".to_string());
                (name.as_str().to_string(), value)
            })
            .collect();
        let body = response.text().await.map_err(|e| classify(&e))?;

        Ok(HttpResponse { status, final_url, headers, body })
    }
}
