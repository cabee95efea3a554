pub mod batch;
pub mod etl;
pub mod ingest;
pub mod quality;
pub mod source;

pub use crate::domain::model::{ProcessedEvent, TransformOutcome};
pub use crate::domain::ports::{Pipeline, Storage};
pub use crate::utils::error::Result;

use serde_json::Value;

/// 數字或可解析為數字的字串 (openFDA 的年齡等欄位常以字串表示)
pub(crate) fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
