//! Data-quality checks over ingested drug event documents.
//!
//! Each document's `results` array is treated as a table: every record is a
//! row and dotted column names (`patient.patientonsetage`) reach into nested
//! objects.

use crate::config::Settings;
use crate::core::source::{self, FetchedFile};
use crate::core::{numeric_value, Pipeline, Storage};
use crate::domain::model::{
    Expectation, ExpectationResult, FileValidation, ValidationReport, ValidationSummary,
};
use crate::utils::error::Result;
use serde_json::Value;
use std::collections::HashMap;

const PARTIAL_UNEXPECTED_LIMIT: usize = 20;

pub fn resolve_column<'a>(record: &'a Value, column: &str) -> Option<&'a Value> {
    if let Some(value) = record.get(column) {
        return Some(value);
    }
    column
        .split('.')
        .try_fold(record, |current, key| current.get(key))
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

struct Tally {
    element_count: usize,
    checked: usize,
    unexpected: Vec<Value>,
}

impl Tally {
    fn into_result(self, expectation: &Expectation) -> ExpectationResult {
        let unexpected_count = self.unexpected.len();
        ExpectationResult {
            expectation: expectation.name().to_string(),
            column: expectation.column().to_string(),
            success: unexpected_count == 0,
            element_count: self.element_count,
            unexpected_count,
            unexpected_percent: percent(unexpected_count, self.checked),
            partial_unexpected_list: self
                .unexpected
                .into_iter()
                .take(PARTIAL_UNEXPECTED_LIMIT)
                .collect(),
            error: None,
        }
    }
}

pub fn evaluate(expectation: &Expectation, records: &[Value]) -> ExpectationResult {
    let column = expectation.column();
    let column_exists = records.iter().any(|r| resolve_column(r, column).is_some());

    if !column_exists && !matches!(expectation, Expectation::ColumnToExist { .. }) {
        return ExpectationResult {
            expectation: expectation.name().to_string(),
            column: column.to_string(),
            success: false,
            element_count: records.len(),
            unexpected_count: 0,
            unexpected_percent: 0.0,
            partial_unexpected_list: Vec::new(),
            error: Some(format!("column '{}' does not exist", column)),
        };
    }

    let values: Vec<&Value> = records
        .iter()
        .map(|r| resolve_column(r, column).unwrap_or(&Value::Null))
        .collect();
    let non_null: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    let tally = match expectation {
        Expectation::ColumnToExist { .. } => {
            return ExpectationResult {
                expectation: expectation.name().to_string(),
                column: column.to_string(),
                success: column_exists,
                element_count: records.len(),
                unexpected_count: 0,
                unexpected_percent: 0.0,
                partial_unexpected_list: Vec::new(),
                error: None,
            };
        }
        Expectation::ColumnValuesToNotBeNull { .. } => Tally {
            element_count: values.len(),
            checked: values.len(),
            unexpected: vec![Value::Null; values.len() - non_null.len()],
        },
        Expectation::ColumnValuesToBeUnique { .. } => {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for value in &non_null {
                *counts.entry(value.to_string()).or_default() += 1;
            }
            Tally {
                element_count: values.len(),
                checked: non_null.len(),
                unexpected: non_null
                    .iter()
                    .filter(|v| counts.get(&v.to_string()).copied().unwrap_or(0) > 1)
                    .map(|v| (*v).clone())
                    .collect(),
            }
        }
        Expectation::ColumnValuesToBeBetween {
            min_value,
            max_value,
            ..
        } => {
            let in_range = |v: &Value| {
                numeric_value(v).is_some_and(|n| {
                    min_value.map_or(true, |min| n >= min) && max_value.map_or(true, |max| n <= max)
                })
            };
            Tally {
                element_count: values.len(),
                checked: non_null.len(),
                unexpected: non_null
                    .iter()
                    .filter(|v| !in_range(v))
                    .map(|v| (*v).clone())
                    .collect(),
            }
        }
    };

    tally.into_result(expectation)
}

#[derive(Debug, Clone)]
pub struct DataValidator {
    expectations: Vec<Expectation>,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new(Expectation::default_suite())
    }
}

impl DataValidator {
    pub fn new(expectations: Vec<Expectation>) -> Self {
        Self { expectations }
    }

    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    pub fn validate_document(&self, filename: &str, document: &Value) -> FileValidation {
        let records = match document.get("results").and_then(Value::as_array) {
            Some(records) if !records.is_empty() => records,
            _ => {
                tracing::warn!("No data found in {}", filename);
                return FileValidation::no_data();
            }
        };

        let validation_results = self
            .expectations
            .iter()
            .map(|expectation| {
                let result = evaluate(expectation, records);
                if let Some(error) = &result.error {
                    tracing::error!("Error applying expectation {}: {}", expectation.name(), error);
                }
                result
            })
            .collect();

        FileValidation::Report(ValidationReport {
            filename: filename.to_string(),
            timestamp: Settings::timestamp(),
            record_count: records.len(),
            validation_results,
        })
    }

    pub fn validate_bytes(&self, filename: &str, content: &[u8]) -> FileValidation {
        match serde_json::from_slice::<Value>(content) {
            Ok(document) => self.validate_document(filename, &document),
            Err(e) => {
                tracing::error!("Error validating file {}: {}", filename, e);
                FileValidation::failed(e)
            }
        }
    }
}

pub struct ValidationPipeline<S: Storage> {
    storage: S,
    validator: DataValidator,
    ingestion_path: String,
    validation_path: String,
    concurrency: usize,
}

impl<S: Storage> ValidationPipeline<S> {
    pub fn new(storage: S, settings: &Settings) -> Self {
        Self {
            storage,
            validator: DataValidator::new(settings.expectations()),
            ingestion_path: settings.input_prefix().to_string(),
            validation_path: settings.validation_path.trim_end_matches('/').to_string(),
            concurrency: settings.concurrency,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn report_path(&self, source_name: &str) -> String {
        format!(
            "{}/validation_{}_{}",
            self.validation_path,
            Settings::timestamp(),
            source_name
        )
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ValidationPipeline<S> {
    type Extracted = Vec<FetchedFile>;
    type Transformed = Vec<(String, FileValidation)>;
    type Output = Vec<ValidationSummary>;

    fn name(&self) -> &str {
        "validate"
    }

    async fn extract(&self) -> Result<Vec<FetchedFile>> {
        let files =
            source::read_all(&self.storage, &self.ingestion_path, ".json", self.concurrency)
                .await?;
        if files.is_empty() {
            tracing::warn!("No ingested files found to validate");
        }
        Ok(files)
    }

    async fn transform(&self, files: Vec<FetchedFile>) -> Result<Vec<(String, FileValidation)>> {
        Ok(files
            .into_iter()
            .map(|file| {
                tracing::info!("Validating file: {}", file.file_name());
                let outcome = match &file.content {
                    Ok(content) => self.validator.validate_bytes(&file.path, content),
                    Err(e) => {
                        tracing::error!("Error validating file {}: {}", file.path, e);
                        FileValidation::failed(e)
                    }
                };
                (file.path, outcome)
            })
            .collect())
    }

    async fn load(&self, reports: Vec<(String, FileValidation)>) -> Result<Vec<ValidationSummary>> {
        let mut summaries = Vec::with_capacity(reports.len());

        for (source_path, report) in reports {
            let report_path = self.report_path(source::file_name(&source_path));
            let body = serde_json::to_vec_pretty(&report)?;
            self.storage.write_file(&report_path, &body).await?;
            tracing::info!(
                "Validation results saved to {}",
                self.storage.describe(&report_path)
            );

            let passed = report.passed_count();
            let total = report.results().len();
            tracing::info!("Validation complete: {}/{} expectations passed", passed, total);

            summaries.push(ValidationSummary {
                source: source_path,
                report_path,
                passed,
                total,
            });
        }

        Ok(summaries)
    }
}
