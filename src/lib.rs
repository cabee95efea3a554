pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::{Cli, Command};
pub use config::{Settings, StorageKind};

pub use adapters::{FdaClient, GcsStorage, LocalStorage};
pub use core::{
    batch::BatchPipeline, etl::EtlEngine, ingest::IngestPipeline, quality::ValidationPipeline,
};
pub use utils::error::{EtlError, Result};
