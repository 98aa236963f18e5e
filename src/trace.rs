//! Trace records and dataset persistence.
//!
//! A trace is one recorded LLM interaction pulled from the observability
//! export. The cleaned collection is the sole durable state of the harness:
//! collection runs read it, merge new prompt outputs into it, and write it
//! back in full.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix of the per-prompt output fields merged into each record.
pub const OUTPUT_FIELD_PREFIX: &str = "output_new_prompt";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset not found: {0}")]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Trace record
// =============================================================================

/// One cleaned trace record.
///
/// Identity fields never change once the record exists; collection runs only
/// add or overwrite `output_new_prompt{N}` fields, which live in `extra` so
/// the on-disk shape round-trips regardless of how many prompts have been
/// collected so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub span_id: String,
    pub trace_id: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    pub input_original: String,
    pub output_original: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub list_url: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_model_name() -> String {
    "N/A".into()
}

impl TraceRecord {
    /// Field name for prompt number `n`.
    pub fn output_field(n: u32) -> String {
        format!("{OUTPUT_FIELD_PREFIX}{n}")
    }

    /// Collected output for prompt `n`, if the field is present.
    pub fn output(&self, n: u32) -> Option<&str> {
        self.extra
            .get(&Self::output_field(n))
            .and_then(serde_json::Value::as_str)
    }

    /// Write (or overwrite) the collected output for prompt `n`.
    pub fn set_output(&mut self, n: u32, text: impl Into<String>) {
        self.extra
            .insert(Self::output_field(n), serde_json::Value::String(text.into()));
    }

    /// Prompt numbers with a present output field, in ascending numeric order.
    pub fn output_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self
            .extra
            .keys()
            .filter_map(|k| k.strip_prefix(OUTPUT_FIELD_PREFIX))
            .filter_map(|suffix| suffix.parse().ok())
            .collect();
        numbers.sort_unstable();
        numbers
    }
}

/// Ensure every record carries `output_new_prompt{1..=count}`, defaulting
/// missing fields to the empty string. Fields already present are untouched,
/// so re-runs never clobber collected outputs.
pub fn ensure_output_fields(traces: &mut [TraceRecord], count: u32) {
    for trace in traces {
        for n in 1..=count {
            let field = TraceRecord::output_field(n);
            trace
                .extra
                .entry(field)
                .or_insert_with(|| serde_json::Value::String(String::new()));
        }
    }
}

// =============================================================================
// Raw export cleaning
// =============================================================================

/// Raw observability-platform export envelope.
#[derive(Debug, Deserialize)]
pub struct RawExport {
    #[serde(default)]
    pub data: Vec<RawTrace>,
}

#[derive(Debug, Deserialize)]
pub struct RawTrace {
    pub id: String,
    pub attributes: RawAttributes,
}

#[derive(Debug, Deserialize)]
pub struct RawAttributes {
    pub span_id: String,
    pub trace_id: String,
    #[serde(default)]
    pub model_name: Option<String>,
    pub input: RawPayload,
    pub output: RawPayload,
    #[serde(default)]
    pub start_ns: i64,
}

#[derive(Debug, Deserialize)]
pub struct RawPayload {
    pub value: String,
}

/// Reduce one raw export entry to the fields the harness works with.
pub fn clean_trace(raw: RawTrace) -> TraceRecord {
    let attrs = raw.attributes;
    let url = trace_url(&attrs.trace_id, &attrs.span_id);
    let list_url = list_url(&attrs.span_id, attrs.start_ns);
    TraceRecord {
        id: raw.id,
        span_id: attrs.span_id,
        trace_id: attrs.trace_id,
        model_name: attrs.model_name.unwrap_or_else(default_model_name),
        input_original: attrs.input.value,
        output_original: attrs.output.value,
        url,
        list_url,
        extra: BTreeMap::new(),
    }
}

/// Direct deep link to one trace.
pub fn trace_url(trace_id: &str, span_id: &str) -> String {
    format!(
        "https://app.datadoghq.com/llm/traces/trace/{trace_id}?selectedTab=overview&spanId={span_id}"
    )
}

/// Deep link to the LLM observability stream view around one span.
/// The query is constant apart from the span id and the time window, so the
/// encoded form is baked in rather than built with a query-string encoder.
pub fn list_url(span_id: &str, start_ns: i64) -> String {
    // 15 minute window after the span start.
    let start = start_ns;
    let end = start_ns + 15 * 60 * 1000;
    format!(
        "https://app.datadoghq.com/llm/traces\
         ?query=%40ml_app%3Agraphing-backend-investigations+%40event_type%3Aspan+%40parent_id%3Aundefined\
         &agg_m=%40metrics.estimated_total_cost\
         &agg_m_source=base\
         &agg_t=sum\
         &expanded-view=default\
         &fromUser=false\
         &selectedTab=overview\
         &spanId={span_id}\
         &viz=stream\
         &start={start}\
         &end={end}\
         &paused=false"
    )
}

// =============================================================================
// Dataset persistence
// =============================================================================

/// Load a trace collection (JSON array) from disk.
pub fn load_traces(path: impl AsRef<Path>) -> Result<Vec<TraceRecord>, DatasetError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Write the full trace collection back to disk, replacing prior content.
pub fn save_traces(path: impl AsRef<Path>, traces: &[TraceRecord]) -> Result<(), DatasetError> {
    let json = serde_json::to_string_pretty(traces)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Load a raw export file.
pub fn load_raw_export(path: impl AsRef<Path>) -> Result<RawExport, DatasetError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DatasetError::NotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw() -> RawTrace {
        RawTrace {
            id: "t-1".into(),
            attributes: RawAttributes {
                span_id: "span-1".into(),
                trace_id: "trace-1".into(),
                model_name: None,
                input: RawPayload {
                    value: "question".into(),
                },
                output: RawPayload {
                    value: "answer".into(),
                },
                start_ns: 100,
            },
        }
    }

    #[test]
    fn clean_trace_maps_fields_and_defaults_model() {
        let record = clean_trace(sample_raw());
        assert_eq!(record.id, "t-1");
        assert_eq!(record.model_name, "N/A");
        assert_eq!(record.input_original, "question");
        assert!(record.url.contains("trace-1"));
        assert!(record.url.contains("spanId=span-1"));
        assert!(record.list_url.contains("start=100"));
        assert!(record.list_url.contains("end=900100"));
    }

    #[test]
    fn output_fields_round_trip_and_sort_numerically() {
        let mut record = clean_trace(sample_raw());
        record.set_output(10, "ten");
        record.set_output(2, "two");
        assert_eq!(record.output_numbers(), vec![2, 10]);
        assert_eq!(record.output(2), Some("two"));
        assert_eq!(record.output(3), None);

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("output_new_prompt10"));
        let back: TraceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.output(10), Some("ten"));
    }

    #[test]
    fn ensure_output_fields_only_fills_missing() {
        let mut traces = vec![clean_trace(sample_raw())];
        traces[0].set_output(1, "kept");
        ensure_output_fields(&mut traces, 3);
        assert_eq!(traces[0].output(1), Some("kept"));
        assert_eq!(traces[0].output(2), Some(""));
        assert_eq!(traces[0].output(3), Some(""));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = r#"{
            "id": "t-9", "span_id": "s", "trace_id": "tr",
            "model_name": "gpt", "input_original": "a", "output_original": "b",
            "custom_note": "keep me"
        }"#;
        let record: TraceRecord = serde_json::from_str(raw).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("keep me"));
    }
}
