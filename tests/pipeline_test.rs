use anyhow::Result;
use drug_events_etl::core::Storage;
use drug_events_etl::domain::model::{FailedRecord, FileValidation, ProcessedEvent};
use drug_events_etl::{
    BatchPipeline, EtlEngine, IngestPipeline, LocalStorage, Settings, StorageKind,
    ValidationPipeline,
};
use httpmock::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn local_settings(temp_dir: &TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.storage = StorageKind::Local;
    settings.local_data_dir = temp_dir.path().to_string_lossy().into_owned();
    settings.num_shards = 3;
    settings
}

fn sample_document() -> Value {
    json!({
        "meta": {"results": {"skip": 0, "limit": 4, "total": 4}},
        "results": [
            {
                "safetyreportid": "5801206-7",
                "receivedate": "20080707",
                "serious": "1",
                "patient": {"patientonsetage": "26", "patientonsetageunit": "801"}
            },
            {
                "safetyreportid": "10003301",
                "receivedate": "20140306",
                "serious": "2",
                "patient": {"patientonsetage": "6", "patientonsetageunit": "month"}
            },
            {
                "safetyreportid": "10003302",
                "receivedate": "20140310",
                "serious": "1",
                "patient": {}
            },
            {
                "receivedate": "20140311",
                "patient": {"patientonsetage": "77"}
            }
        ]
    })
}

async fn read_lines<T: serde::de::DeserializeOwned>(
    storage: &LocalStorage,
    path: &str,
) -> Result<Vec<T>> {
    let content = String::from_utf8(storage.read_file(path).await?)?;
    content
        .lines()
        .map(|line| -> Result<T> { Ok(serde_json::from_str(line)?) })
        .collect()
}

#[tokio::test]
async fn test_process_writes_shards_and_failed_records() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = local_settings(&temp_dir);
    let storage = LocalStorage::new(temp_dir.path());

    storage
        .write_file(
            "ingestion/drug_events_20240101_000000.json",
            serde_json::to_string_pretty(&sample_document())?.as_bytes(),
        )
        .await?;
    storage
        .write_file("ingestion/broken.json", b"{\"results\": []}\nnot-json\n")
        .await?;

    let engine = EtlEngine::new(BatchPipeline::new(storage.clone(), &settings));
    let summary = engine.run().await?;

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 2);
    assert_eq!(
        summary.shards,
        vec![
            "processed/drug_events-00000-of-00003.json".to_string(),
            "processed/drug_events-00001-of-00003.json".to_string(),
            "processed/drug_events-00002-of-00003.json".to_string(),
        ]
    );
    assert_eq!(summary.failed_output, "failed/failed_records-00000-of-00001.json");

    let mut events: Vec<ProcessedEvent> = Vec::new();
    for shard in &summary.shards {
        let shard_events: Vec<ProcessedEvent> = read_lines(&storage, shard).await?;
        assert_eq!(shard_events.len(), 1);
        events.extend(shard_events);
    }
    events.sort_by(|a, b| a.report_id.cmp(&b.report_id));

    assert_eq!(events[0].report_id, "10003301");
    assert_eq!(events[0].patient_age, Some(0.5));
    assert_eq!(events[1].report_id, "10003302");
    assert_eq!(events[1].patient_age, None);
    assert_eq!(events[2].report_id, "5801206-7");
    assert_eq!(events[2].patient_age, Some(26.0));
    assert!(events.iter().all(|e| e.processed));

    let failed: Vec<FailedRecord> = read_lines(&storage, &summary.failed_output).await?;
    let reasons: Vec<&str> = failed.iter().map(|f| f.reason.as_str()).collect();
    assert!(reasons.iter().any(|r| r.starts_with("invalid JSON")));
    assert!(reasons.contains(&"missing safetyreportid"));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_keeps_going_when_a_file_cannot_be_read() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = local_settings(&temp_dir);
    let storage = LocalStorage::new(temp_dir.path());

    storage
        .write_file(
            "ingestion/drug_events_a.json",
            serde_json::to_vec(&sample_document())?.as_slice(),
        )
        .await?;
    // 指向不存在檔案的連結會被列出，但讀取失敗
    std::os::unix::fs::symlink(
        temp_dir.path().join("gone.json"),
        temp_dir.path().join("ingestion/drug_events_b.json"),
    )?;

    let engine = EtlEngine::new(BatchPipeline::new(storage.clone(), &settings));
    let summary = engine.run().await?;

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 2);

    let failed: Vec<FailedRecord> = read_lines(&storage, &summary.failed_output).await?;
    let unreadable = failed
        .iter()
        .find(|f| f.source == "ingestion/drug_events_b.json")
        .expect("unreadable file should be recorded");
    assert!(unreadable.reason.starts_with("read error:"));
    Ok(())
}

#[tokio::test]
async fn test_process_with_no_input_writes_empty_shards() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = local_settings(&temp_dir);
    let storage = LocalStorage::new(temp_dir.path());

    let engine = EtlEngine::new(BatchPipeline::new(storage.clone(), &settings));
    let summary = engine.run().await?;

    assert_eq!(summary.processed, 0);
    for shard in &summary.shards {
        assert!(storage.read_file(shard).await?.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_validate_saves_reports() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let settings = local_settings(&temp_dir);
    let storage = LocalStorage::new(temp_dir.path());

    storage
        .write_file(
            "ingestion/drug_events_a.json",
            serde_json::to_vec(&sample_document())?.as_slice(),
        )
        .await?;
    storage
        .write_file("ingestion/drug_events_empty.json", b"{\"meta\": {}, \"results\": []}")
        .await?;

    let engine = EtlEngine::new(ValidationPipeline::new(storage.clone(), &settings));
    let summaries = engine.run().await?;
    assert_eq!(summaries.len(), 2);

    let full = &summaries[0];
    assert_eq!(full.source, "ingestion/drug_events_a.json");
    assert_eq!(full.total, 7);
    // safetyreportid 有缺值，其餘規則皆通過
    assert_eq!(full.passed, 6);
    assert!(full
        .report_path
        .starts_with("validation/validation_"));
    assert!(full.report_path.ends_with("_drug_events_a.json"));

    let report: FileValidation =
        serde_json::from_slice(&storage.read_file(&full.report_path).await?)?;
    match report {
        FileValidation::Report(report) => {
            assert_eq!(report.record_count, 4);
            assert_eq!(report.filename, "ingestion/drug_events_a.json");
            let not_null = &report.validation_results[1];
            assert_eq!(not_null.expectation, "expect_column_values_to_not_be_null");
            assert_eq!(not_null.unexpected_count, 1);
        }
        other => panic!("unexpected report: {:?}", other),
    }

    let empty = &summaries[1];
    assert_eq!(empty.total, 0);
    let saved: Value = serde_json::from_slice(&storage.read_file(&empty.report_path).await?)?;
    assert_eq!(saved, json!({"success": false, "message": "No data found"}));
    Ok(())
}

#[tokio::test]
async fn test_ingest_then_process_end_to_end() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;
    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/drug/event.json");
            then.status(200).json_body(sample_document());
        })
        .await;

    let mut settings = local_settings(&temp_dir);
    settings.api_url = server.url("/drug/event.json");
    let storage = LocalStorage::new(temp_dir.path());

    EtlEngine::new(IngestPipeline::new(storage.clone(), &settings)?)
        .run()
        .await?;
    api_mock.assert_async().await;

    let summary = EtlEngine::new(BatchPipeline::new(storage.clone(), &settings))
        .run()
        .await?;
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    Ok(())
}
