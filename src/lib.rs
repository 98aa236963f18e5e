#![forbid(unsafe_code)]

//! # prompt-refinery
//!
//! Harness for refining LLM prompts against recorded production traces.
//!
//! The workflow: extract clean trace records from an observability export,
//! compose full prompts by substituting each trace's original input into
//! numbered templates, hand the prompts to externally spawned agents, then
//! collect each agent's final answer back into the persisted trace records
//! and render Markdown/CSV comparison reports.
//!
//! Collection is additive and idempotent across runs: only the
//! `output_new_prompt{N}` field an agent was spawned for is ever written,
//! so missing agents can be re-run and re-collected without losing earlier
//! results.

pub mod collect;
pub mod report;
pub mod template;
pub mod trace;
pub mod transcript;

pub use collect::{
    collect_outputs, load_config_from_path, CollectConfig, CollectError, CollectionSummary,
};
pub use report::{render_comparison_csv, render_comparison_markdown};
pub use template::{compose_prompt, extract_templates, INPUT_PLACEHOLDER};
pub use trace::{
    clean_trace, ensure_output_fields, load_raw_export, load_traces, save_traces, DatasetError,
    TraceRecord,
};
pub use transcript::{final_assistant_text, read_final_assistant_text};
