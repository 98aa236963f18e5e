#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use prompt_refinery::collect::{collect_outputs, load_config_from_path};
use prompt_refinery::report::{render_comparison_csv, render_comparison_markdown};
use prompt_refinery::template::{compose_prompt, extract_templates};
use prompt_refinery::trace::{clean_trace, load_raw_export, load_traces, save_traces, TraceRecord};

const SAMPLE_SIZE: usize = 10;
const RULE: &str =
    "================================================================================";

#[derive(Parser)]
#[command(name = "refinery", version, about = "Prompt refinement harness CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract clean trace records from a raw observability export
    Extract {
        /// Raw export JSON (envelope with a `data` array)
        #[arg(long)]
        input: PathBuf,
        /// Directory for the cleaned datasets
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Compose full prompts for every (trace, prompt) pair
    Prompts {
        /// Template document with <PROMPT{N}> blocks
        #[arg(long)]
        templates: PathBuf,
        /// Trace dataset to draw inputs from
        #[arg(long)]
        traces: PathBuf,
        /// Restrict to one prompt number
        #[arg(long)]
        prompt: Option<u32>,
    },
    /// Collect agent outputs into the merged dataset
    Collect {
        /// Collection config JSON (paths + agent mapping)
        #[arg(long)]
        config: PathBuf,
        /// Restrict to one prompt number
        #[arg(long)]
        prompt: Option<u32>,
    },
    /// Render Markdown and CSV comparison reports
    Report {
        /// Merged trace dataset
        #[arg(long)]
        traces: PathBuf,
        #[arg(long)]
        out_md: PathBuf,
        #[arg(long)]
        out_csv: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { input, out_dir } => {
            let export = load_raw_export(&input)?;
            let traces: Vec<TraceRecord> = export.data.into_iter().map(clean_trace).collect();

            std::fs::create_dir_all(&out_dir)?;
            save_traces(out_dir.join("llm_traces_clean.json"), &traces)?;
            if let Some(recent) = traces.first() {
                save_traces(
                    out_dir.join("most_recent_llm_trace.json"),
                    std::slice::from_ref(recent),
                )?;
            }
            let sample: Vec<TraceRecord> =
                traces.iter().take(SAMPLE_SIZE).cloned().collect();
            save_traces(out_dir.join("recent_traces.json"), &sample)?;

            println!("Extracted {} clean traces", traces.len());
            if let Some(recent) = traces.first() {
                println!("\nMost recent trace:");
                println!("  ID: {}", recent.id);
                println!("  Model: {}", recent.model_name);
                println!("  Direct URL: {}", recent.url);
                println!("  List URL: {}", recent.list_url);
            }
        }
        Commands::Prompts {
            templates,
            traces,
            prompt,
        } => {
            let document = std::fs::read_to_string(&templates)?;
            let mut template_set = extract_templates(&document);
            println!(
                "Found {} prompt templates: {:?}",
                template_set.len(),
                template_set.keys().collect::<Vec<_>>()
            );

            if let Some(n) = prompt {
                if !template_set.contains_key(&n) {
                    return Err(format!("prompt {n} not found in templates").into());
                }
                template_set.retain(|k, _| *k == n);
                println!("Filtering to PROMPT{n} only");
            }

            let trace_set = load_traces(&traces)?;
            println!("Found {} traces", trace_set.len());

            let mut agent_count = 0usize;
            for (trace_idx, trace) in trace_set.iter().enumerate() {
                for (number, body) in &template_set {
                    agent_count += 1;
                    let full_prompt = compose_prompt(body, &trace.input_original);
                    println!("\n{RULE}");
                    println!("TRACE {trace_idx} | PROMPT {number}");
                    println!("{RULE}");
                    println!("Character count: {}", full_prompt.chars().count());
                    println!("\n{full_prompt}");
                    println!("\nAfter spawning, record the agent id in the collect config:");
                    println!("  \"<agent_id>\": [{trace_idx}, {number}]");
                }
            }

            println!("\n{RULE}");
            println!("AGENT MAPPING TEMPLATE");
            println!("{RULE}");
            println!("\nTotal agents to spawn: {agent_count}");
            println!("\n\"agent_mapping\": {{");
            for trace_idx in 0..trace_set.len() {
                let row = template_set
                    .keys()
                    .map(|n| format!("\"AGENT_ID_{trace_idx}_{n}\": [{trace_idx}, {n}]"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("  {row},");
            }
            println!("}}");
        }
        Commands::Collect { config, prompt } => {
            let config = load_config_from_path(&config)?;
            if let Some(n) = prompt {
                println!("Filtering to PROMPT{n} only");
            }

            let summary = collect_outputs(&config, prompt)?;

            println!("\nCollected: {}/{} outputs", summary.collected, summary.attempted);
            if !summary.failed.is_empty() {
                println!(
                    "Failed: {} agents: {:?}",
                    summary.failed.len(),
                    summary.failed
                );
            }

            // Per-trace verification table.
            let traces = load_traces(&config.merged_dataset)?;
            println!("\nVerification:");
            for (i, trace) in traces.iter().enumerate() {
                let lengths: Vec<usize> = (1..=config.prompt_count)
                    .map(|n| trace.output(n).unwrap_or("").chars().count())
                    .collect();
                let status = if lengths.iter().all(|len| *len > 0) {
                    "OK  "
                } else {
                    "GAPS"
                };
                let cells = lengths
                    .iter()
                    .enumerate()
                    .map(|(idx, len)| format!("P{}={:4}", idx + 1, len))
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("Trace {}: {status} {cells}", i + 1);
            }
        }
        Commands::Report {
            traces,
            out_md,
            out_csv,
        } => {
            let trace_set = load_traces(&traces)?;
            std::fs::write(&out_md, render_comparison_markdown(&trace_set))?;
            std::fs::write(&out_csv, render_comparison_csv(&trace_set))?;
            println!("Created comparison markdown: {}", out_md.display());
            println!("Created comparison CSV: {}", out_csv.display());
        }
    }

    Ok(())
}
