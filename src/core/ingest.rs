use crate::adapters::http::FdaClient;
use crate::config::Settings;
use crate::core::{Pipeline, Storage};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use serde_json::Value;

const REQUIRED_KEYS: [&str; 2] = ["results", "meta"];

/// openFDA 回應必須同時帶有 `results` 與 `meta`
pub fn has_required_keys(data: &Value) -> bool {
    data.as_object()
        .is_some_and(|obj| REQUIRED_KEYS.iter().all(|key| obj.contains_key(*key)))
}

/// JSON with 4-space indentation, the layout downstream readers expect.
pub fn to_pretty_json(data: &Value) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)?;
    Ok(buf)
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub path: String,
    pub uri: String,
    pub record_count: usize,
}

pub struct IngestPipeline<S: Storage> {
    storage: S,
    client: FdaClient,
    api_url: String,
    ingestion_path: String,
}

impl<S: Storage> IngestPipeline<S> {
    pub fn new(storage: S, settings: &Settings) -> Result<Self> {
        Ok(Self {
            storage,
            client: FdaClient::new(&settings.http)?,
            api_url: settings.api_url.clone(),
            ingestion_path: settings.input_prefix().to_string(),
        })
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn destination(&self) -> String {
        format!(
            "{}/drug_events_{}.json",
            self.ingestion_path,
            Settings::timestamp()
        )
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for IngestPipeline<S> {
    type Extracted = Value;
    type Transformed = Value;
    type Output = IngestedFile;

    fn name(&self) -> &str {
        "ingest"
    }

    async fn extract(&self) -> Result<Value> {
        self.client.fetch_json(&self.api_url).await
    }

    async fn transform(&self, data: Value) -> Result<Value> {
        if !has_required_keys(&data) {
            return Err(EtlError::ValidationError {
                message: "Data validation failed: missing required fields".to_string(),
            });
        }
        Ok(data)
    }

    async fn load(&self, data: Value) -> Result<IngestedFile> {
        let path = self.destination();
        let body = to_pretty_json(&data)?;

        self.storage.write_file(&path, &body).await.inspect_err(|e| {
            tracing::error!("Error uploading to storage: {}", e);
        })?;

        let uri = self.storage.describe(&path);
        tracing::info!("Uploaded data to {}", uri);

        let record_count = data
            .get("results")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        Ok(IngestedFile {
            path,
            uri,
            record_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_keys() {
        assert!(has_required_keys(&json!({"meta": {}, "results": []})));
        assert!(!has_required_keys(&json!({"results": []})));
        assert!(!has_required_keys(&json!({"meta": {}})));
        assert!(!has_required_keys(&json!([{"meta": {}, "results": []}])));
    }

    #[test]
    fn test_pretty_json_uses_four_spaces() {
        let body = to_pretty_json(&json!({"meta": {"limit": 100}})).unwrap();
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text, "{\n    \"meta\": {\n        \"limit\": 100\n    }\n}");
    }
}
