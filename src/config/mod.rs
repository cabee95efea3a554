#[cfg(feature = "cli")]
pub mod cli;

use crate::domain::model::Expectation;
use crate::utils::error::{EtlError, Result};
use crate::utils::retry::RetryPolicy;
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://api.fda.gov/drug/event.json?limit=100";
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Gcs,
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub project: String,
    pub bucket: String,
    pub api_url: String,
    pub storage: StorageKind,
    pub local_data_dir: String,
    pub ingestion_path: String,
    pub processed_path: String,
    pub failed_path: String,
    pub validation_path: String,
    pub num_shards: usize,
    pub concurrency: usize,
    pub http: HttpSettings,
    pub gcs: GcsSettings,
    pub validation: ValidationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor_secs: f64,
    pub max_backoff_secs: f64,
    pub retry_statuses: Vec<u16>,
    /// 每收到幾個 chunk 輸出一次下載進度
    pub progress_log_interval: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcsSettings {
    pub endpoint: String,
    pub access_token: Option<String>,
    pub metadata_token_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub expectations: Option<Vec<Expectation>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project: "rare-hub-450814-d2".to_string(),
            bucket: "drug-events".to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            storage: StorageKind::default(),
            local_data_dir: "data".to_string(),
            ingestion_path: "ingestion".to_string(),
            processed_path: "processed/drug_events".to_string(),
            failed_path: "failed/failed_records".to_string(),
            validation_path: "validation".to_string(),
            num_shards: 5,
            concurrency: 4,
            http: HttpSettings::default(),
            gcs: GcsSettings::default(),
            validation: ValidationSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            max_retries: 5,
            backoff_factor_secs: 2.0,
            max_backoff_secs: 120.0,
            retry_statuses: vec![500, 502, 503, 504],
            progress_log_interval: 100,
        }
    }
}

impl Default for GcsSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
            access_token: None,
            metadata_token_url: DEFAULT_METADATA_TOKEN_URL.to_string(),
        }
    }
}

impl HttpSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: Duration::from_secs_f64(self.backoff_factor_secs.max(0.0)),
            max_backoff: Duration::from_secs_f64(self.max_backoff_secs.max(0.0)),
        }
    }
}

impl Settings {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置，先做 `${VAR}` 環境變數替換
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content, |name| std::env::var(name).ok())?;
        Ok(toml::from_str(&processed)?)
    }

    /// 以環境變數覆蓋設定
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(project) = lookup("GCP_PROJECT") {
            self.project = project;
        }
        if let Some(bucket) = lookup("GCS_BUCKET_NAME") {
            self.bucket = bucket;
        }
        if let Some(api_url) = lookup("FDA_API_URL") {
            self.api_url = api_url;
        }
        if let Some(endpoint) = lookup("GCS_ENDPOINT") {
            self.gcs.endpoint = endpoint;
        }
        if let Some(token) = lookup("GCS_ACCESS_TOKEN") {
            self.gcs.access_token = Some(token);
        }
    }

    pub fn timestamp() -> String {
        chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn input_prefix(&self) -> &str {
        self.ingestion_path.trim_end_matches('/')
    }

    pub fn input_uri(&self) -> String {
        format!("gs://{}/{}/*.json", self.bucket, self.input_prefix())
    }

    pub fn output_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.processed_path)
    }

    pub fn expectations(&self) -> Vec<Expectation> {
        self.validation
            .expectations
            .clone()
            .unwrap_or_else(Expectation::default_suite)
    }
}

fn substitute_env_vars<F>(content: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let re = regex::Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
        message: format!("invalid substitution pattern: {}", e),
    })?;

    let result = re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        lookup(var_name).unwrap_or_else(|| format!("${{{}}}", var_name))
    });

    Ok(result.into_owned())
}

impl Validate for Settings {
    fn validate(&self) -> Result<()> {
        validation::validate_non_empty_string("project", &self.project)?;
        validation::validate_gcs_bucket_name("bucket", &self.bucket)?;
        validation::validate_url("api_url", &self.api_url)?;

        validation::validate_path("local_data_dir", &self.local_data_dir)?;
        validation::validate_path("ingestion_path", &self.ingestion_path)?;
        validation::validate_path("processed_path", &self.processed_path)?;
        validation::validate_path("failed_path", &self.failed_path)?;
        validation::validate_path("validation_path", &self.validation_path)?;

        validation::validate_range("num_shards", self.num_shards, 1, 1000)?;
        validation::validate_range("concurrency", self.concurrency, 1, 256)?;

        if self.storage == StorageKind::Gcs {
            validation::validate_url("gcs.endpoint", &self.gcs.endpoint)?;
        }

        if self.http.backoff_factor_secs < 0.0 {
            return Err(EtlError::InvalidConfigValueError {
                field: "http.backoff_factor_secs".to_string(),
                value: self.http.backoff_factor_secs.to_string(),
                reason: "Backoff cannot be negative".to_string(),
            });
        }

        if let Some(expectations) = &self.validation.expectations {
            if expectations.is_empty() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "validation.expectations".to_string(),
                    value: "[]".to_string(),
                    reason: "Expectation suite cannot be empty".to_string(),
                });
            }
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
