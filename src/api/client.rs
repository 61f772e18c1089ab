// Adept Core - Adobe Digital Editions DRM Lifecycle Client
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! HTTP transport for the ADEPT protocol
//!
//! The authorization and fulfillment services speak XML over plain POST
//! and GET. [`Transport`] is the seam between the pipelines and the
//! network: production code uses [`HttpTransport`] (reqwest, rustls,
//! cookies), tests substitute an in-memory implementation and never open
//! a socket.
//!
//! Requests carry a best-effort timeout so no operation can hang a worker
//! indefinitely. Retry is left to the user: the protocol exchanges are
//! not idempotent end to end, and a stale retry of an activation is worse
//! than a clean error.

use crate::error::Result;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// ADEPT XML media type sent with protocol requests
const ADEPT_CONTENT_TYPE: &str = "application/vnd.adobe.adept+xml";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default download timeout in seconds (whole transfer)
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;

/// Status and body of an XML exchange
#[derive(Debug, Clone)]
pub struct XmlResponse {
    pub status: u16,
    pub body: String,
}

impl XmlResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network seam for the authorization and fulfillment pipelines
pub trait Transport: Send + Sync {
    /// POST an XML body, returning status and response body
    fn post_xml(
        &self,
        url: &str,
        body: String,
    ) -> impl Future<Output = Result<XmlResponse>> + Send;

    /// GET a resource, streaming it to `dest`
    ///
    /// Returns the HTTP status code. On a non-200 status no file is
    /// written; the caller classifies the failure.
    fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl Future<Output = Result<u16>> + Send;
}

/// Configuration for HttpTransport
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub timeout: Duration,
    pub download_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            download_timeout: Duration::from_secs(DEFAULT_DOWNLOAD_TIMEOUT_SECS),
            user_agent: format!("adept-core/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Production transport over reqwest
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    download_client: Client,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .cookie_store(true)
            .build()?;

        // Downloads share the user agent but get a longer whole-transfer
        // budget than the small XML exchanges.
        let download_client = Client::builder()
            .timeout(config.download_timeout)
            .user_agent(config.user_agent)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            download_client,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(ClientConfig::default())
    }
}

impl Transport for HttpTransport {
    async fn post_xml(&self, url: &str, body: String) -> Result<XmlResponse> {
        tracing::debug!(url, bytes = body.len(), "posting XML request");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, ADEPT_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(url, status, bytes = body.len(), "received XML response");

        Ok(XmlResponse { status, body })
    }

    async fn download_to_file(&self, url: &str, dest: &Path) -> Result<u16> {
        tracing::debug!(url, dest = %dest.display(), "downloading resource");

        let response = self.download_client.get(url).send().await?;
        let status = response.status().as_u16();
        if status != 200 {
            tracing::warn!(url, status, "download refused by server");
            return Ok(status);
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!(url, written, "download complete");
        Ok(status)
    }
}
