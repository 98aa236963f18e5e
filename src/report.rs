//! Comparison report rendering (Markdown and CSV).

use crate::trace::TraceRecord;

/// Render the per-trace Markdown comparison document.
///
/// Each trace gets an ordinal header, its deep link, the original output,
/// and one section per collected (non-empty) prompt output in ascending
/// prompt-number order.
pub fn render_comparison_markdown(traces: &[TraceRecord]) -> String {
    let mut out = String::new();
    out.push_str("# LLM Trace Output Comparison\n\n");
    out.push_str(
        "This file compares the original LLM outputs with new prompt outputs for each trace.\n\n",
    );
    out.push_str("---\n\n");

    for (i, trace) in traces.iter().enumerate() {
        out.push_str(&format!("## Trace {}: `{}`\n\n", i + 1, trace.id));
        out.push_str(&format!("**[View in Datadog]({})**\n\n", trace.url));
        out.push_str("### Original Output\n\n");
        out.push_str(&format!("{}\n\n", trace.output_original));

        for n in trace.output_numbers() {
            let text = trace.output(n).unwrap_or("");
            if text.is_empty() {
                continue;
            }
            out.push_str(&format!("### New Prompt {n} Output\n\n"));
            out.push_str(&format!("{text}\n\n"));
        }

        out.push_str("---\n\n");
    }

    out
}

/// Render the tabular comparison: one row per trace with the original input,
/// the original output, and all collected prompt outputs joined with `" | "`
/// in ascending prompt-number order (absent fields skipped).
pub fn render_comparison_csv(traces: &[TraceRecord]) -> String {
    let mut out = String::new();
    out.push_str("input_original,output_original,output_modified\r\n");
    for trace in traces {
        let outputs: Vec<&str> = trace
            .output_numbers()
            .into_iter()
            .filter_map(|n| trace.output(n))
            .collect();
        let row = [
            csv_field(&trace.input_original),
            csv_field(&trace.output_original),
            csv_field(&outputs.join(" | ")),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// RFC 4180 quoting: fields carrying commas, quotes, or line breaks are
/// quoted, with embedded quotes doubled.
fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================
