//! Request/response shapes for the analyze endpoint.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::pipeline::PipelineOutput;

/// Body of POST /api/analyze.
///
/// `text` is an Option so an absent field reaches validation (and gets the
/// contract's 400 body) instead of a deserializer rejection.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// One-line caller-facing summary of the detection count. Presentation only.
pub fn summary_for(technique_count: usize) -> String {
    if technique_count > 0 {
        format!(
            "Analysis detected {} potential MITRE ATT&CK techniques with high confidence.",
            technique_count
        )
    } else {
        "No significant threats detected in the provided text.".to_string()
    }
}

/// Build the enriched response body: pipeline output passed through untouched,
/// plus the request echo and presentation metadata.
pub fn build_response(output: PipelineOutput, input_text: &str, now: DateTime<Utc>) -> Value {
    let summary = summary_for(output.techniques.len());
    let mut body: Map<String, Value> = output.extra;
    body.insert("techniques".to_string(), Value::Array(output.techniques));
    body.insert("inputText".to_string(), Value::String(input_text.to_string()));
    body.insert("summary".to_string(), Value::String(summary));
    body.insert(
        "timestamp".to_string(),
        // Same shape as JS Date.toISOString()
        Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    Value::Object(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn summary_counts_detections() {
        assert_eq!(
            summary_for(3),
            "Analysis detected 3 potential MITRE ATT&CK techniques with high confidence."
        );
        assert_eq!(
            summary_for(0),
            "No significant threats detected in the provided text."
        );
    }

    #[test]
    fn response_keeps_pipeline_fields_and_adds_metadata() {
        let output = PipelineOutput::from_value(json!({
            "status": "ok",
            "techniques": [{"id": "T1566", "name": "Phishing", "confidence": 0.82}],
        }))
        .unwrap();
        let now = Utc::now();
        let body = build_response(output, "spearphishing email observed", now);

        assert_eq!(body["status"], json!("ok"));
        assert_eq!(body["techniques"][0]["id"], json!("T1566"));
        assert_eq!(body["inputText"], json!("spearphishing email observed"));
        assert_eq!(
            body["summary"],
            json!("Analysis detected 1 potential MITRE ATT&CK techniques with high confidence.")
        );
        assert_eq!(
            body["timestamp"],
            json!(now.to_rfc3339_opts(SecondsFormat::Millis, true))
        );
    }

    #[test]
    fn missing_text_deserializes_to_none() {
        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.text.is_none());
    }
}
