use crate::config::HttpSettings;
use crate::utils::error::{EtlError, Result};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::time::Duration;

const MB: f64 = 1024.0 * 1024.0;

/// openFDA client: GET with retry on transient failures, chunked download with progress logs.
#[derive(Debug, Clone)]
pub struct FdaClient {
    client: Client,
    retry: RetryPolicy,
    retry_statuses: Vec<u16>,
    progress_log_interval: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("<binary>").to_string()))
        .collect()
}

impl FdaClient {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout())
            .read_timeout(settings.read_timeout())
            .build()?;

        Ok(Self {
            client,
            retry: settings.retry_policy(),
            retry_statuses: settings.retry_statuses.clone(),
            progress_log_interval: settings.progress_log_interval.max(1),
            connect_timeout: settings.connect_timeout(),
            read_timeout: settings.read_timeout(),
        })
    }

    fn is_retryable(&self, err: &EtlError) -> bool {
        match err {
            EtlError::HttpStatusError { status, .. } => self.retry_statuses.contains(status),
            other => other.is_retryable(),
        }
    }

    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        tracing::info!("Requesting data from {}", url);
        tracing::info!(
            "Initiating request with timeout settings: connect={}s, read={}s",
            self.connect_timeout.as_secs(),
            self.read_timeout.as_secs()
        );

        match self.fetch_inner(url).await {
            Ok(value) => Ok(value),
            Err(e) => {
                tracing::error!("Error fetching data: {}", e);
                tracing::error!("Error type: {:?}", e.category());
                if let EtlError::HttpStatusError { status, .. } = &e {
                    tracing::error!("Response status code: {}", status);
                }
                Err(e)
            }
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<serde_json::Value> {
        let response = retry_with_backoff(
            &self.retry,
            "fda.fetch",
            |e| self.is_retryable(e),
            || self.get_once(url),
        )
        .await?;

        let body = self.read_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn get_once(&self, url: &str) -> Result<Response> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        tracing::info!("Response status: {}", status.as_u16());
        tracing::info!("Response headers: {:?}", header_map(response.headers()));

        if status.is_success() {
            return Ok(response);
        }

        Err(EtlError::HttpStatusError {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }

    async fn read_body(&self, mut response: Response) -> Result<Vec<u8>> {
        let mut content = Vec::new();
        let mut chunks_received: usize = 0;

        while let Some(chunk) = response.chunk().await? {
            if chunk.is_empty() {
                continue;
            }
            chunks_received += 1;
            content.extend_from_slice(&chunk);
            if chunks_received % self.progress_log_interval == 0 {
                tracing::info!(
                    "Download progress: {:.2} MB ({} chunks)",
                    content.len() as f64 / MB,
                    chunks_received
                );
            }
        }

        tracing::info!(
            "Download completed: {:.2} MB total",
            content.len() as f64 / MB
        );
        Ok(content)
    }
}
