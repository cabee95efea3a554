use crate::config::{Settings, StorageKind};
use crate::utils::error::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "drug-events-etl")]
#[command(about = "Ingest, validate and batch-process openFDA drug adverse events")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(long, global = true, help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, help = "Storage backend")]
    pub storage: Option<StorageKind>,

    #[arg(long, global = true, help = "GCS bucket name")]
    pub bucket: Option<String>,

    #[arg(long, global = true, help = "GCP project id")]
    pub project: Option<String>,

    #[arg(long, global = true, help = "Base directory for local storage")]
    pub data_dir: Option<String>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Download drug events from the openFDA API into storage
    Ingest {
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Run data-quality expectations over ingested files
    Validate,
    /// Transform ingested files into sharded processed events
    Process {
        #[arg(long)]
        num_shards: Option<usize>,
    },
    /// Ingest, validate and process in sequence
    Run,
}

impl Cli {
    /// 設定優先順序: CLI 參數 > 環境變數 > 設定檔 > 預設值
    pub fn resolve_settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env();

        if let Some(storage) = self.storage {
            settings.storage = storage;
        }
        if let Some(bucket) = &self.bucket {
            settings.bucket = bucket.clone();
        }
        if let Some(project) = &self.project {
            settings.project = project.clone();
        }
        if let Some(dir) = &self.data_dir {
            settings.local_data_dir = dir.clone();
        }

        match &self.command {
            Command::Ingest {
                api_url: Some(url),
            } => settings.api_url = url.clone(),
            Command::Process {
                num_shards: Some(n),
            } => settings.num_shards = *n,
            _ => {}
        }

        Ok(settings)
    }
}
