//! Google Cloud Storage backend over the JSON API.

use crate::config::Settings;
use crate::domain::ports::Storage;
use crate::utils::error::{EtlError, Result};
use crate::utils::retry::{retry_with_backoff, RetryPolicy};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

/// metadata server 的 token 在到期前這段時間內就先換新
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectItem {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_MARGIN < self.expires_at
    }
}

#[derive(Debug, Clone)]
pub struct GcsStorage {
    client: Client,
    bucket: String,
    endpoint: Url,
    metadata_token_url: String,
    static_token: Option<String>,
    cached_token: Arc<Mutex<Option<CachedToken>>>,
    retry: RetryPolicy,
}

impl GcsStorage {
    pub fn new(settings: &Settings) -> Result<Self> {
        let endpoint = Url::parse(&settings.gcs.endpoint).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "gcs.endpoint".to_string(),
                value: settings.gcs.endpoint.clone(),
                reason: e.to_string(),
            }
        })?;

        let client = Client::builder()
            .connect_timeout(settings.http.connect_timeout())
            .read_timeout(settings.http.read_timeout())
            .build()?;

        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
            endpoint,
            metadata_token_url: settings.gcs.metadata_token_url.clone(),
            static_token: settings.gcs.access_token.clone(),
            cached_token: Arc::new(Mutex::new(None)),
            retry: settings.http.retry_policy(),
        })
    }

    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| EtlError::ConfigError {
                message: format!("GCS endpoint cannot be a base URL: {}", self.endpoint),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        tracing::debug!("Fetching access token from metadata server");
        let response = self
            .client
            .get(&self.metadata_token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EtlError::StorageError {
                message: format!(
                    "metadata server returned {} (set GCS_ACCESS_TOKEN outside GCP)",
                    response.status()
                ),
            });
        }

        let token: MetadataToken = response.json().await?;
        tracing::debug!("Metadata token valid for {}s", token.expires_in);
        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    /// 5xx 與 429 (rate limit) 都重送，其餘交給預設判斷
    fn is_retryable(err: &EtlError) -> bool {
        match err {
            EtlError::HttpStatusError { status, .. } => *status >= 500 || *status == 429,
            other => other.is_retryable(),
        }
    }

    /// 送出請求並檢查狀態碼；5xx 與 429 會依 retry 設定重送
    async fn send<F>(&self, operation: &str, path: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> RequestBuilder,
    {
        let token = self.access_token().await?;
        let token = token.as_str();
        let build = &build;

        retry_with_backoff(&self.retry, operation, Self::is_retryable, move || async move {
            let response = build(&self.client, token).send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let url = response.url().to_string();
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(EtlError::HttpStatusError {
                    status: status.as_u16(),
                    url,
                });
            }
            if status == StatusCode::NOT_FOUND {
                return Err(EtlError::NotFoundError {
                    path: self.describe(path),
                });
            }

            let body = response.text().await.unwrap_or_default();
            Err(EtlError::StorageError {
                message: format!("{} {} returned {}: {}", operation, self.describe(path), status, body),
            })
        })
        .await
    }
}

fn content_type_for(path: &str) -> &'static str {
    if path.ends_with(".json") {
        "application/json"
    } else {
        "application/octet-stream"
    }
}

impl Storage for GcsStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let mut url = self.api_url(&["storage", "v1", "b", &self.bucket, "o", path])?;
        url.query_pairs_mut().append_pair("alt", "media");

        let response = self
            .send("gcs.download", path, |client, token| {
                client.get(url.clone()).bearer_auth(token)
            })
            .await?;

        Ok(response.bytes().await?.to_vec())
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut url = self.api_url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", path);

        self.send("gcs.upload", path, |client, token| {
            client
                .post(url.clone())
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, content_type_for(path))
                .body(data.to_vec())
        })
        .await?;

        tracing::debug!("Uploaded {} bytes to {}", data.len(), self.describe(path));
        Ok(())
    }

    async fn list_files(&self, prefix: &str, suffix: &str) -> Result<Vec<String>> {
        let prefix = if prefix.is_empty() || prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };

        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.api_url(&["storage", "v1", "b", &self.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", &prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let response = self
                .send("gcs.list", &prefix, |client, token| {
                    client.get(url.clone()).bearer_auth(token)
                })
                .await?;
            let page: ObjectList = response.json().await?;

            names.extend(
                page.items
                    .into_iter()
                    .map(|item| item.name)
                    .filter(|name| name.ends_with(suffix)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        names.sort();
        Ok(names)
    }

    fn describe(&self, path: &str) -> String {
        format!("gs://{}/{}", self.bucket, path)
    }
}
