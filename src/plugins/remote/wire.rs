use crate::core::model::{JobStats, ProgressSnapshot};
use serde::Deserialize;
use serde_json::Value;

/// Body of `GET /progress`. Every field is optional: the backend replaces
/// its status record wholesale between jobs and not every writer sets all keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireProgress {
    #[serde(default)]
    pub current: Option<u64>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_processing: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub statistics: Option<Value>,
}

impl From<WireProgress> for ProgressSnapshot {
    fn from(w: WireProgress) -> Self {
        ProgressSnapshot {
            current: w.current,
            total: w.total,
            message: w.message.unwrap_or_default(),
            is_running: w.is_processing,
            error: w.error.filter(|e| !e.trim().is_empty()),
            result: w.statistics.filter(|v| !v.is_null()).map(JobStats::Backend),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// The backend's `error` field, if it carries any text.
pub fn error_field(payload: &Value) -> Option<String> {
    payload
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Completion;
    use serde_json::json;

    fn parse(v: Value) -> ProgressSnapshot {
        serde_json::from_value::<WireProgress>(v).unwrap().into()
    }

    #[test]
    fn idle_backend_reads_as_finished() {
        let s = parse(json!({"current": 0, "total": 0, "message": "Ready", "is_processing": false, "error": null}));
        assert_eq!(s.completion(), Completion::Succeeded);
        assert_eq!(s.message, "Ready");
        assert!(s.result.is_none());
    }

    #[test]
    fn statistics_become_backend_stats() {
        let s = parse(json!({
            "current": 12, "total": 12, "is_processing": false,
            "statistics": {"duplicates": 2, "overlaps": 1}
        }));
        assert_eq!(s.result, Some(JobStats::Backend(json!({"duplicates": 2, "overlaps": 1}))));
    }

    #[test]
    fn missing_keys_are_tolerated() {
        let s = parse(json!({"message": "Starting..."}));
        assert_eq!(s.current, None);
        assert_eq!(s.is_running, None);
        assert_eq!(s.completion(), Completion::Pending);
    }

    #[test]
    fn backend_error_passes_through_verbatim() {
        let s = parse(json!({"is_processing": false, "error": "Source directory not found"}));
        assert_eq!(s.completion(), Completion::Failed("Source directory not found".to_string()));
        assert_eq!(s.error.as_deref(), Some("Source directory not found"));
    }

    #[test]
    fn error_field_ignores_blank_text() {
        assert_eq!(error_field(&json!({"error": "busy"})), Some("busy".to_string()));
        assert_eq!(error_field(&json!({"error": ""})), None);
        assert_eq!(error_field(&json!({"status": "started"})), None);
        assert_eq!(error_field(&Value::Null), None);
    }
}
