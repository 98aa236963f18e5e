//! Prompt template extraction and composition.
//!
//! Templates live in a plain-text document as numbered `<PROMPT{N}>` blocks.
//! Composition substitutes a trace's original input into the body, or appends
//! it after a blank line when the body carries no placeholder. Every template
//! written before the placeholder existed relies on the append fallback, so
//! that behavior is load-bearing.

use std::collections::BTreeMap;

use fancy_regex::Regex;
use once_cell::sync::Lazy;

/// Substitution point a template may carry for the trace input.
pub const INPUT_PLACEHOLDER: &str = "[[use input from traces_sampled_for_ui.json]]";

// Backreference keeps mismatched marker pairs from matching at all.
static PROMPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<PROMPT(\d+)>(.*?)</PROMPT\1>").expect("invalid prompt block regex")
});

/// Extract all numbered prompt bodies from a template document.
///
/// Bodies are trimmed; embedded newlines are preserved. A document without
/// markers yields an empty map. Mismatched begin/end ids are simply not
/// matched.
pub fn extract_templates(document: &str) -> BTreeMap<u32, String> {
    let mut templates = BTreeMap::new();
    for caps in PROMPT_BLOCK.captures_iter(document).flatten() {
        let number = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok());
        let body = caps.get(2).map(|m| m.as_str().trim().to_string());
        if let (Some(number), Some(body)) = (number, body) {
            templates.insert(number, body);
        }
    }
    templates
}

/// Build the full prompt for one trace.
///
/// If the template contains [`INPUT_PLACEHOLDER`], every occurrence is
/// replaced with the trace input; otherwise the input is appended after a
/// blank line.
pub fn compose_prompt(template: &str, trace_input: &str) -> String {
    if template.contains(INPUT_PLACEHOLDER) {
        template.replace(INPUT_PLACEHOLDER, trace_input)
    } else {
        format!("{template}\n\n{trace_input}")
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_numbered_blocks_with_newlines() {
        let doc = "intro\n<PROMPT1>\nRewrite this.\nKeep it short.\n</PROMPT1>\n\
                   <PROMPT3>Summarize.</PROMPT3>\ntrailing";
        let templates = extract_templates(doc);
        assert_eq!(templates.len(), 2);
        assert_eq!(templates[&1], "Rewrite this.\nKeep it short.");
        assert_eq!(templates[&3], "Summarize.");
    }

    #[test]
    fn mismatched_ids_do_not_match() {
        let doc = "<PROMPT1>body</PROMPT2>";
        assert!(extract_templates(doc).is_empty());
    }

    #[test]
    fn no_markers_yields_empty_map() {
        assert!(extract_templates("just prose, no markers").is_empty());
    }

    #[test]
    fn placeholder_is_fully_replaced() {
        let template = format!("Rewrite: {INPUT_PLACEHOLDER}");
        let prompt = compose_prompt(&template, "Hello");
        assert_eq!(prompt, "Rewrite: Hello");
        assert!(!prompt.contains(INPUT_PLACEHOLDER));
    }

    #[test]
    fn every_placeholder_occurrence_is_replaced() {
        let template = format!("{INPUT_PLACEHOLDER} and again {INPUT_PLACEHOLDER}");
        let prompt = compose_prompt(&template, "X");
        assert_eq!(prompt, "X and again X");
    }

    #[test]
    fn missing_placeholder_appends_after_blank_line() {
        let prompt = compose_prompt("Improve the answer.", "Hello");
        assert_eq!(prompt, "Improve the answer.\n\nHello");
    }
}
