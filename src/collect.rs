//! Output collection: reconcile agent transcripts into the trace dataset.
//!
//! Each spawned agent is known only by an opaque id; the operator supplies a
//! mapping from agent id to the (trace index, prompt number) pair it was
//! spawned for. A collection run loads the persisted dataset, pulls the final
//! answer out of every mapped agent's transcript, writes it into the matching
//! `output_new_prompt{N}` field, and persists the whole collection back.
//!
//! Merging is additive and idempotent: fields untouched by the current run
//! keep their previous values, so the operator can re-run after supplying
//! missing transcripts without losing anything already collected.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::trace::{ensure_output_fields, load_traces, save_traces, DatasetError};
use crate::transcript::read_final_assistant_text;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("config not found: {0}")]
    ConfigNotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

// =============================================================================
// Configuration
// =============================================================================

/// Operator-supplied collection configuration.
///
/// The agent mapping is explicit configuration, not discoverable state: the
/// operator records each agent id against its (trace index, prompt number)
/// target after spawning the agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    /// Original dataset, used when no merged dataset exists yet.
    pub source_dataset: PathBuf,
    /// Merged dataset, read-modify-written by every run.
    pub merged_dataset: PathBuf,
    /// Directory holding `agent-{id}.jsonl` transcripts.
    pub agent_log_dir: PathBuf,
    /// Highest prompt number; every record gets fields `1..=prompt_count`.
    #[serde(default = "default_prompt_count")]
    pub prompt_count: u32,
    /// agent id -> (trace index, prompt number).
    #[serde(default)]
    pub agent_mapping: BTreeMap<String, (usize, u32)>,
}

fn default_prompt_count() -> u32 {
    4
}

impl CollectConfig {
    /// Transcript path for one agent id.
    pub fn agent_log_path(&self, agent_id: &str) -> PathBuf {
        self.agent_log_dir.join(format!("agent-{agent_id}.jsonl"))
    }
}

/// Load a collection config from a JSON file.
pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<CollectConfig, CollectError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(CollectError::ConfigNotFound(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

// =============================================================================
// Collection
// =============================================================================

/// Outcome of one collection run.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    /// Mapping entries processed (after any prompt filter).
    pub attempted: usize,
    /// Entries whose transcript yielded a non-empty answer.
    pub collected: usize,
    /// Agent ids whose transcript was missing or yielded no usable output.
    pub failed: Vec<String>,
}

/// Run one read-modify-write collection cycle.
///
/// Loads the merged dataset when present, otherwise the source dataset;
/// a missing source is fatal. Per-entry failures (missing transcript, empty
/// extraction, out-of-range trace index) are counted and reported in the
/// summary without aborting the batch.
pub fn collect_outputs(
    config: &CollectConfig,
    filter_prompt: Option<u32>,
) -> Result<CollectionSummary, CollectError> {
    let mut traces = if config.merged_dataset.exists() {
        eprintln!(
            "[collect] loading existing data from {}",
            config.merged_dataset.display()
        );
        load_traces(&config.merged_dataset)?
    } else {
        eprintln!(
            "[collect] loading source data from {}",
            config.source_dataset.display()
        );
        load_traces(&config.source_dataset)?
    };

    ensure_output_fields(&mut traces, config.prompt_count);

    let mut entries: Vec<(String, usize, u32)> = config
        .agent_mapping
        .iter()
        .map(|(id, &(trace_idx, prompt))| (id.clone(), trace_idx, prompt))
        .filter(|&(_, _, prompt)| filter_prompt.map_or(true, |p| prompt == p))
        .collect();
    entries.sort_by_key(|&(_, trace_idx, prompt)| (trace_idx, prompt));
    let attempted = entries.len();

    eprintln!("[collect] collecting outputs from {attempted} agents...");

    let mut seen_targets: HashSet<(usize, u32)> = HashSet::new();
    let mut collected = 0usize;
    let mut failed: Vec<String> = Vec::new();

    for (agent_id, trace_idx, prompt) in entries {
        if !seen_targets.insert((trace_idx, prompt)) {
            eprintln!(
                "[collect] WARN trace {} P{prompt}: duplicate mapping target, \
                 {agent_id} overwrites an earlier entry",
                trace_idx + 1
            );
        }

        if trace_idx >= traces.len() {
            eprintln!(
                "[collect] FAIL {agent_id}: trace index {trace_idx} out of range"
            );
            failed.push(agent_id);
            continue;
        }

        let log_path = config.agent_log_path(&agent_id);
        if !log_path.exists() {
            eprintln!(
                "[collect] FAIL trace {} P{prompt}: transcript not found: {}",
                trace_idx + 1,
                log_path.display()
            );
            failed.push(agent_id);
            continue;
        }

        let output = read_final_assistant_text(&log_path);
        if output.is_empty() {
            eprintln!(
                "[collect] FAIL trace {} P{prompt}: no usable output in {}",
                trace_idx + 1,
                log_path.display()
            );
            failed.push(agent_id);
            continue;
        }

        let preview: String = output
            .chars()
            .take(80)
            .map(|c| if c == '\n' { ' ' } else { c })
            .collect();
        eprintln!(
            "[collect] OK   trace {} P{prompt}: {:4} chars | {preview}",
            trace_idx + 1,
            output.chars().count()
        );
        traces[trace_idx].set_output(prompt, output);
        collected += 1;
    }

    save_traces(&config.merged_dataset, &traces)?;

    Ok(CollectionSummary {
        attempted,
        collected,
        failed,
    })
}
