use anyhow::Result;
use drug_events_etl::core::Storage;
use drug_events_etl::{EtlEngine, EtlError, IngestPipeline, LocalStorage, Settings};
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;

fn fast_settings(api_url: String) -> Settings {
    let mut settings = Settings::default();
    settings.api_url = api_url;
    settings.http.max_retries = 2;
    settings.http.backoff_factor_secs = 0.01;
    settings.http.max_backoff_secs = 0.05;
    settings
}

#[tokio::test]
async fn test_ingest_uploads_pretty_json() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    let payload = json!({
        "meta": {"results": {"skip": 0, "limit": 2, "total": 2}},
        "results": [
            {"safetyreportid": "10003300", "receivedate": "20140312"},
            {"safetyreportid": "10003301", "receivedate": "20140313"}
        ]
    });

    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/drug/event.json")
                .query_param("limit", "100");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(payload.clone());
        })
        .await;

    let settings = fast_settings(server.url("/drug/event.json?limit=100"));
    let storage = LocalStorage::new(temp_dir.path());
    let engine = EtlEngine::new(IngestPipeline::new(storage, &settings)?);

    let file = engine.run().await?;
    api_mock.assert_async().await;

    assert_eq!(file.record_count, 2);
    assert!(file.path.starts_with("ingestion/drug_events_"));
    assert!(file.path.ends_with(".json"));

    let written = engine.pipeline().storage().read_file(&file.path).await?;
    let text = String::from_utf8(written)?;
    assert!(text.contains("\n    \"meta\""));

    let round_trip: serde_json::Value = serde_json::from_str(&text)?;
    assert_eq!(round_trip, payload);
    Ok(())
}

#[tokio::test]
async fn test_ingest_rejects_payload_without_meta() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/drug/event.json");
            then.status(200).json_body(json!({"results": []}));
        })
        .await;

    let settings = fast_settings(server.url("/drug/event.json"));
    let storage = LocalStorage::new(temp_dir.path());
    let engine = EtlEngine::new(IngestPipeline::new(storage, &settings)?);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EtlError::ValidationError { .. }));
    assert!(err.to_string().contains("missing required fields"));

    let files = engine.pipeline().storage().list_files("ingestion", ".json").await?;
    assert!(files.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_ingest_retries_server_errors() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/drug/event.json");
            then.status(503);
        })
        .await;

    let settings = fast_settings(server.url("/drug/event.json"));
    let engine = EtlEngine::new(IngestPipeline::new(
        LocalStorage::new(temp_dir.path()),
        &settings,
    )?);

    let err = engine.run().await.unwrap_err();

    // 一次原始請求 + max_retries 次重試
    api_mock.assert_hits_async(3).await;
    assert!(matches!(err, EtlError::HttpStatusError { status: 503, .. }));
    Ok(())
}

#[tokio::test]
async fn test_ingest_does_not_retry_client_errors() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    let api_mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/drug/event.json");
            then.status(404).json_body(json!({"error": {"code": "NOT_FOUND"}}));
        })
        .await;

    let settings = fast_settings(server.url("/drug/event.json"));
    let engine = EtlEngine::new(IngestPipeline::new(
        LocalStorage::new(temp_dir.path()),
        &settings,
    )?);

    let err = engine.run().await.unwrap_err();
    api_mock.assert_hits_async(1).await;
    assert!(matches!(err, EtlError::HttpStatusError { status: 404, .. }));
    Ok(())
}

#[tokio::test]
async fn test_ingest_invalid_json_body() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let server = MockServer::start_async().await;

    server
        .mock_async(|when, then| {
            when.method(GET).path("/drug/event.json");
            then.status(200).body("<html>maintenance</html>");
        })
        .await;

    let settings = fast_settings(server.url("/drug/event.json"));
    let engine = EtlEngine::new(IngestPipeline::new(
        LocalStorage::new(temp_dir.path()),
        &settings,
    )?);

    let err = engine.run().await.unwrap_err();
    assert!(matches!(err, EtlError::SerializationError(_)));
    Ok(())
}
