use clap::Parser;
use drug_events_etl::core::Storage;
use drug_events_etl::utils::{logger, validation::Validate};
use drug_events_etl::{
    BatchPipeline, Cli, Command, EtlEngine, EtlError, GcsStorage, IngestPipeline, LocalStorage,
    Settings, StorageKind, ValidationPipeline,
};

async fn ingest<S: Storage>(storage: S, settings: &Settings) -> Result<(), EtlError> {
    let engine = EtlEngine::new(IngestPipeline::new(storage, settings)?);
    let file = engine.run().await?;
    println!("✅ Ingested {} records into {}", file.record_count, file.uri);
    Ok(())
}

async fn validate<S: Storage>(storage: S, settings: &Settings) -> Result<(), EtlError> {
    let engine = EtlEngine::new(ValidationPipeline::new(storage, settings));
    let summaries = engine.run().await?;
    for summary in &summaries {
        println!(
            "📋 {}: {}/{} expectations passed",
            summary.source, summary.passed, summary.total
        );
    }
    if summaries.is_empty() {
        println!("⚠️  No ingested files to validate");
    }
    Ok(())
}

async fn process<S: Storage>(storage: S, settings: &Settings) -> Result<(), EtlError> {
    tracing::info!(
        "Processing {} into {}",
        settings.input_uri(),
        settings.output_uri()
    );
    let engine = EtlEngine::new(BatchPipeline::new(storage, settings));
    let summary = engine.run().await?;
    println!(
        "✅ Processed {} events into {} shards ({} failed)",
        summary.processed,
        summary.shards.len(),
        summary.failed
    );
    Ok(())
}

async fn execute<S: Storage + Clone>(
    command: &Command,
    storage: S,
    settings: &Settings,
) -> Result<(), EtlError> {
    match command {
        Command::Ingest { .. } => ingest(storage, settings).await,
        Command::Validate => validate(storage, settings).await,
        Command::Process { .. } => process(storage, settings).await,
        Command::Run => {
            ingest(storage.clone(), settings).await?;
            validate(storage.clone(), settings).await?;
            process(storage, settings).await
        }
    }
}

async fn run(cli: &Cli) -> Result<(), EtlError> {
    let settings = cli.resolve_settings()?;
    tracing::debug!(
        "Resolved settings: storage={:?}, api_url={}, shards={}, concurrency={}",
        settings.storage,
        settings.api_url,
        settings.num_shards,
        settings.concurrency
    );
    settings.validate()?;

    match settings.storage {
        StorageKind::Local => {
            tracing::info!("💾 Using local storage at {}", settings.local_data_dir);
            let storage = LocalStorage::new(settings.local_data_dir.clone());
            execute(&cli.command, storage, &settings).await
        }
        StorageKind::Gcs => {
            tracing::info!(
                "☁️  Using GCS bucket gs://{} (project {})",
                settings.bucket,
                settings.project
            );
            let storage = GcsStorage::new(&settings)?;
            execute(&cli.command, storage, &settings).await
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting drug-events-etl");

    if let Err(e) = run(&cli).await {
        tracing::error!(
            "❌ Pipeline failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        let exit_code = e.exit_code();
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }
}
