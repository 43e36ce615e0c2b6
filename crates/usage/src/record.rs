use {
    serde::Serialize,
    serde_json::{Map, Value},
};

use crate::extractor::ExtractedUsage;

/// One persisted usage row for a completed streamed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageRecord {
    pub id: i64,
    #[serde(skip)]
    pub principal_id: i64,
    pub thread_id: String,
    pub assistant_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    pub created_at: i64,
}

/// A usage row waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUsage {
    pub principal_id: i64,
    pub thread_id: String,
    pub assistant_id: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub model_name: Option<String>,
}

fn count(usage: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = usage.get(key)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

impl NewUsage {
    /// Build a row from extracted stream usage. Missing counters are zero;
    /// a missing total is the saturating sum of input and output.
    pub fn from_extracted(
        principal_id: i64,
        thread_id: impl Into<String>,
        assistant_id: impl Into<String>,
        extracted: &ExtractedUsage,
    ) -> Self {
        let input_tokens = count(&extracted.usage, "input_tokens").unwrap_or(0);
        let output_tokens = count(&extracted.usage, "output_tokens").unwrap_or(0);
        let total_tokens = count(&extracted.usage, "total_tokens")
            .unwrap_or_else(|| input_tokens.saturating_add(output_tokens));
        Self {
            principal_id,
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            input_tokens,
            output_tokens,
            total_tokens,
            model_name: extracted.model_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn extracted(usage: Value, model_name: Option<&str>) -> ExtractedUsage {
        let Value::Object(usage) = usage else {
            panic!("usage must be an object");
        };
        ExtractedUsage {
            usage,
            model_name: model_name.map(String::from),
        }
    }

    #[test]
    fn counters_are_copied() {
        let row = NewUsage::from_extracted(
            1,
            "t1",
            "a1",
            &extracted(
                json!({"input_tokens": 10, "output_tokens": 20, "total_tokens": 30}),
                Some("gpt-4o"),
            ),
        );
        assert_eq!(
            (row.input_tokens, row.output_tokens, row.total_tokens),
            (10, 20, 30)
        );
        assert_eq!(row.model_name.as_deref(), Some("gpt-4o"));
    }

    #[test]
    fn total_falls_back_to_sum() {
        let row = NewUsage::from_extracted(
            1,
            "t1",
            "a1",
            &extracted(json!({"input_tokens": 4, "output_tokens": 5}), None),
        );
        assert_eq!(row.total_tokens, 9);
    }

    #[test]
    fn fallback_total_saturates() {
        let row = NewUsage::from_extracted(
            1,
            "t1",
            "a1",
            &extracted(json!({"input_tokens": i64::MAX, "output_tokens": 1}), None),
        );
        assert_eq!(row.input_tokens, i64::MAX);
        assert_eq!(row.total_tokens, i64::MAX);

        let row = NewUsage::from_extracted(
            1,
            "t1",
            "a1",
            &extracted(json!({"input_tokens": i64::MIN, "output_tokens": -1}), None),
        );
        assert_eq!(row.total_tokens, i64::MIN);
    }

    #[test]
    fn missing_or_odd_counters() {
        let row = NewUsage::from_extracted(
            1,
            "t1",
            "a1",
            &extracted(json!({"input_tokens": "7", "output_tokens": 2.0, "foo": 1}), None),
        );
        assert_eq!(
            (row.input_tokens, row.output_tokens, row.total_tokens),
            (7, 2, 9)
        );

        let empty = NewUsage::from_extracted(1, "t1", "a1", &extracted(json!({"foo": 1}), None));
        assert_eq!(empty.total_tokens, 0);
    }

    #[test]
    fn serialized_record_omits_principal() {
        let record = UsageRecord {
            id: 1,
            principal_id: 99,
            thread_id: "t1".into(),
            assistant_id: "a1".into(),
            input_tokens: 1,
            output_tokens: 2,
            total_tokens: 3,
            model_name: None,
            created_at: 0,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("principal_id").is_none());
        assert!(json.get("model_name").is_none());
        assert_eq!(json["total_tokens"], 3);
    }
}
