use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 從儲存層讀出的一份原始文件 (openFDA 回應或其中一行)
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    pub report_id: String,
    pub receive_date: Option<Value>,
    pub serious: Option<Value>,
    pub patient_age: Option<f64>,
    pub processed: bool,
    pub processing_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRecord {
    pub source: String,
    pub reason: String,
    pub record: Value,
    pub processed: bool,
}

impl FailedRecord {
    pub fn new(source: impl Into<String>, reason: impl Into<String>, record: Value) -> Self {
        Self {
            source: source.into(),
            reason: reason.into(),
            record,
            processed: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformOutcome {
    pub processed: Vec<ProcessedEvent>,
    pub failed: Vec<FailedRecord>,
}

impl TransformOutcome {
    pub fn merge(&mut self, other: TransformOutcome) {
        self.processed.extend(other.processed);
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub shards: Vec<String>,
    pub failed_output: String,
}

/// 資料品質規則，名稱沿用 Great Expectations 的慣例以便在 TOML 裡辨識
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name")]
pub enum Expectation {
    #[serde(rename = "expect_column_to_exist")]
    ColumnToExist { column: String },

    #[serde(rename = "expect_column_values_to_not_be_null")]
    ColumnValuesToNotBeNull { column: String },

    #[serde(rename = "expect_column_values_to_be_unique")]
    ColumnValuesToBeUnique { column: String },

    #[serde(rename = "expect_column_values_to_be_between")]
    ColumnValuesToBeBetween {
        column: String,
        #[serde(default)]
        min_value: Option<f64>,
        #[serde(default)]
        max_value: Option<f64>,
    },
}

impl Expectation {
    pub fn name(&self) -> &'static str {
        match self {
            Expectation::ColumnToExist { .. } => "expect_column_to_exist",
            Expectation::ColumnValuesToNotBeNull { .. } => "expect_column_values_to_not_be_null",
            Expectation::ColumnValuesToBeUnique { .. } => "expect_column_values_to_be_unique",
            Expectation::ColumnValuesToBeBetween { .. } => "expect_column_values_to_be_between",
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Expectation::ColumnToExist { column }
            | Expectation::ColumnValuesToNotBeNull { column }
            | Expectation::ColumnValuesToBeUnique { column }
            | Expectation::ColumnValuesToBeBetween { column, .. } => column,
        }
    }

    /// Suite applied to every ingested drug event file unless overridden.
    pub fn default_suite() -> Vec<Expectation> {
        let col = |c: &str| c.to_string();
        vec![
            Expectation::ColumnToExist { column: col("safetyreportid") },
            Expectation::ColumnValuesToNotBeNull { column: col("safetyreportid") },
            Expectation::ColumnValuesToBeUnique { column: col("safetyreportid") },
            Expectation::ColumnToExist { column: col("receivedate") },
            Expectation::ColumnValuesToNotBeNull { column: col("receivedate") },
            Expectation::ColumnToExist { column: col("patient.patientonsetage") },
            Expectation::ColumnValuesToBeBetween {
                column: col("patient.patientonsetage"),
                min_value: Some(0.0),
                max_value: Some(120.0),
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectationResult {
    pub expectation: String,
    pub column: String,
    pub success: bool,
    pub element_count: usize,
    pub unexpected_count: usize,
    pub unexpected_percent: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partial_unexpected_list: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub filename: String,
    pub timestamp: String,
    pub record_count: usize,
    pub validation_results: Vec<ExpectationResult>,
}

/// 單一檔案的驗證結果。無資料或讀取失敗時以 `success: false` 表示
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileValidation {
    Report(ValidationReport),
    NoData { success: bool, message: String },
    Failed { success: bool, error: String },
}

impl FileValidation {
    pub fn no_data() -> Self {
        FileValidation::NoData {
            success: false,
            message: "No data found".to_string(),
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        FileValidation::Failed {
            success: false,
            error: error.to_string(),
        }
    }

    pub fn results(&self) -> &[ExpectationResult] {
        match self {
            FileValidation::Report(report) => &report.validation_results,
            _ => &[],
        }
    }

    pub fn passed_count(&self) -> usize {
        self.results().iter().filter(|r| r.success).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub source: String,
    pub report_path: String,
    pub passed: usize,
    pub total: usize,
}
