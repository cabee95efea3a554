use crate::config::Settings;
use crate::core::source;
use crate::core::{numeric_value, Pipeline, ProcessedEvent, Storage, TransformOutcome};
use crate::domain::model::{BatchSummary, FailedRecord, SourceDocument};
use crate::utils::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;

/// Patient onset age converted to years.
///
/// Units may be words (`month`, `day`, ...) or openFDA codes (`800`-`805`).
/// Missing or non-numeric ages give `None`; unknown units are taken as years.
pub fn normalize_age(patient: &Value) -> Option<f64> {
    let age = numeric_value(patient.get("patientonsetage")?)?;

    let unit = match patient.get("patientonsetageunit") {
        Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "year".to_string(),
    };

    let years = match unit.as_str() {
        "decade" | "800" => age * 10.0,
        "month" | "802" => age / 12.0,
        "week" | "803" => age / 52.0,
        "day" | "804" => age / 365.0,
        "hour" | "805" => age / 8760.0,
        _ => age,
    };
    Some(years)
}

/// 只有 null、false、0、空字串、空陣列與空物件視為缺少 id
fn report_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        Value::Array(items) if !items.is_empty() => Some(Value::Array(items.clone()).to_string()),
        Value::Object(map) if !map.is_empty() => Some(Value::Object(map.clone()).to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DrugEventTransform;

impl DrugEventTransform {
    /// 將一份 openFDA 回應攤平成多筆處理後事件
    pub fn process(&self, source: &str, element: &Value, now: DateTime<Utc>) -> TransformOutcome {
        let mut outcome = TransformOutcome::default();

        let Some(results) = element.get("results").and_then(Value::as_array) else {
            tracing::warn!("Invalid record structure in {}", source);
            outcome.failed.push(FailedRecord::new(
                source,
                "invalid record structure: missing results",
                element.clone(),
            ));
            return outcome;
        };

        let timestamp = now.to_rfc3339_opts(SecondsFormat::Micros, true);

        for result in results {
            if !result.is_object() {
                tracing::debug!("Skipping non-object result in {}", source);
                continue;
            }

            let Some(report_id) = report_id(result.get("safetyreportid")) else {
                outcome.failed.push(FailedRecord::new(
                    source,
                    "missing safetyreportid",
                    result.clone(),
                ));
                continue;
            };

            let patient_age = result.get("patient").and_then(normalize_age);

            outcome.processed.push(ProcessedEvent {
                report_id,
                receive_date: result.get("receivedate").cloned(),
                serious: result.get("serious").cloned(),
                patient_age,
                processed: true,
                processing_timestamp: timestamp.clone(),
            });
        }

        outcome
    }
}

/// Parse an input file as one JSON document, or as newline-delimited JSON
/// when that fails. Lines that still do not parse become failed records.
pub fn parse_documents(path: &str, content: &[u8]) -> (Vec<SourceDocument>, Vec<FailedRecord>) {
    if let Ok(body) = serde_json::from_slice::<Value>(content) {
        return (
            vec![SourceDocument {
                path: path.to_string(),
                body,
            }],
            Vec::new(),
        );
    }

    let text = String::from_utf8_lossy(content);
    let mut documents = Vec::new();
    let mut failed = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(body) => documents.push(SourceDocument {
                path: path.to_string(),
                body,
            }),
            Err(e) => {
                tracing::warn!("Unparseable JSON at {}:{}: {}", path, index + 1, e);
                failed.push(FailedRecord::new(
                    format!("{}:{}", path, index + 1),
                    format!("invalid JSON: {}", e),
                    Value::String(line.to_string()),
                ));
            }
        }
    }

    (documents, failed)
}

pub fn shard_name(prefix: &str, index: usize, total: usize) -> String {
    format!("{}-{:05}-of-{:05}.json", prefix, index, total)
}

fn json_lines<T: Serialize>(items: &[&T]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for item in items {
        serde_json::to_writer(&mut buf, item)?;
        buf.push(b'\n');
    }
    Ok(buf)
}

#[derive(Debug, Default)]
pub struct BatchInput {
    pub documents: Vec<SourceDocument>,
    pub failed: Vec<FailedRecord>,
}

pub struct BatchPipeline<S: Storage> {
    storage: S,
    transform: DrugEventTransform,
    ingestion_path: String,
    processed_path: String,
    failed_path: String,
    num_shards: usize,
    concurrency: usize,
}

impl<S: Storage> BatchPipeline<S> {
    pub fn new(storage: S, settings: &Settings) -> Self {
        Self {
            storage,
            transform: DrugEventTransform,
            ingestion_path: settings.input_prefix().to_string(),
            processed_path: settings.processed_path.clone(),
            failed_path: settings.failed_path.clone(),
            num_shards: settings.num_shards.max(1),
            concurrency: settings.concurrency,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for BatchPipeline<S> {
    type Extracted = BatchInput;
    type Transformed = TransformOutcome;
    type Output = BatchSummary;

    fn name(&self) -> &str {
        "process"
    }

    async fn extract(&self) -> Result<BatchInput> {
        let files =
            source::read_all(&self.storage, &self.ingestion_path, ".json", self.concurrency)
                .await?;

        let mut input = BatchInput::default();
        for file in files {
            match &file.content {
                Ok(content) => {
                    let (documents, failed) = parse_documents(&file.path, content);
                    input.documents.extend(documents);
                    input.failed.extend(failed);
                }
                Err(e) => {
                    tracing::error!("Error reading file {}: {}", file.path, e);
                    input.failed.push(FailedRecord::new(
                        file.path.as_str(),
                        format!("read error: {}", e),
                        Value::Null,
                    ));
                }
            }
        }

        tracing::info!(
            "Read {} document(s), {} unparseable line(s)",
            input.documents.len(),
            input.failed.len()
        );
        Ok(input)
    }

    async fn transform(&self, input: BatchInput) -> Result<TransformOutcome> {
        let now = Utc::now();
        let mut outcome = TransformOutcome {
            processed: Vec::new(),
            failed: input.failed,
        };

        for document in &input.documents {
            outcome.merge(self.transform.process(&document.path, &document.body, now));
        }

        tracing::info!(
            "Transformed {} event(s), {} failed record(s)",
            outcome.processed.len(),
            outcome.failed.len()
        );
        Ok(outcome)
    }

    async fn load(&self, outcome: TransformOutcome) -> Result<BatchSummary> {
        // 與 Beam 的 WriteToText 相同，固定分片數時即使是空分片也會寫出
        let mut shards: Vec<Vec<&ProcessedEvent>> = vec![Vec::new(); self.num_shards];
        for (index, event) in outcome.processed.iter().enumerate() {
            shards[index % self.num_shards].push(event);
        }

        let shard_paths: Vec<String> = (0..self.num_shards)
            .map(|i| shard_name(&self.processed_path, i, self.num_shards))
            .collect();

        let writes = shard_paths.iter().zip(&shards).map(|(path, events)| async move {
            let body = json_lines(events)?;
            self.storage.write_file(path, &body).await
        });
        try_join_all(writes).await?;

        let failed_output = shard_name(&self.failed_path, 0, 1);
        let failed_refs: Vec<&FailedRecord> = outcome.failed.iter().collect();
        self.storage
            .write_file(&failed_output, &json_lines(&failed_refs)?)
            .await?;

        tracing::info!(
            "📁 Wrote {} processed event(s) to {} shard(s) at {}",
            outcome.processed.len(),
            self.num_shards,
            self.storage.describe(&self.processed_path)
        );
        if !outcome.failed.is_empty() {
            tracing::warn!(
                "{} failed record(s) written to {}",
                outcome.failed.len(),
                self.storage.describe(&failed_output)
            );
        }

        Ok(BatchSummary {
            processed: outcome.processed.len(),
            failed: outcome.failed.len(),
            shards: shard_paths,
            failed_output,
        })
    }
}
