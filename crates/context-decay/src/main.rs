//! Apply graduated context decay to a session transcript.
//!
//! Reads a JSONL transcript (one message per line) and the summary store
//! beside it, and prints the decayed transcript as JSONL.
//!
//! # Examples
//!
//! ```sh
//! # Strip thinking after 2 turns and tool results after 5
//! context-decay apply sessions/tr-abc/session.jsonl \
//!   --strip-thinking-after 2 --strip-tool-results-after 5
//!
//! # Use thresholds from an agent config file, cap at 200 messages
//! context-decay apply session.jsonl --config agent.json --max-messages 200 -o out.jsonl
//!
//! # Show each message's turn age
//! context-decay show-ages session.jsonl
//!
//! # List tool results that still need a summary
//! context-decay candidates session.jsonl --summarize-after 3 --strip-tool-results-after 5
//!
//! # Drop the cached summaries
//! context-decay clear-summaries session.jsonl
//! ```

use clap::{Args, Parser, Subcommand};
use context_decay::prelude::*;
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Apply graduated context decay to a session transcript.
#[derive(Parser)]
#[command(name = "context-decay")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decay a transcript and print the result as JSONL
    Apply {
        /// Session transcript (.jsonl)
        session: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the turn age of every message
    ShowAges {
        /// Session transcript (.jsonl)
        session: PathBuf,
    },
    /// List tool results in the summarize band that have no cached summary
    Candidates {
        /// Session transcript (.jsonl)
        session: PathBuf,

        #[command(flatten)]
        thresholds: ThresholdArgs,
    },
    /// Delete the summary store that belongs to a transcript
    ClearSummaries {
        /// Session transcript (.jsonl)
        session: PathBuf,
    },
}

#[derive(Args)]
struct ThresholdArgs {
    /// JSON config file with decay thresholds (bare or under "contextDecay")
    #[arg(long)]
    config: Option<PathBuf>,

    /// Strip thinking blocks from assistant messages this many turns old (0 = off)
    #[arg(long)]
    strip_thinking_after: Option<usize>,

    /// Apply cached summaries to tool results this many turns old (0 = off)
    #[arg(long)]
    summarize_after: Option<usize>,

    /// Replace tool results this many turns old with a placeholder (0 = off)
    #[arg(long)]
    strip_tool_results_after: Option<usize>,

    /// Keep at most this many messages (0 = off)
    #[arg(long)]
    max_messages: Option<usize>,
}

impl ThresholdArgs {
    /// Config file values, overridden by any flag given on the command line.
    fn resolve(&self) -> Result<DecayConfig, String> {
        let mut config = match &self.config {
            Some(path) => DecayConfig::load(path)?,
            None => DecayConfig::default(),
        };
        if let Some(n) = self.strip_thinking_after {
            config = config.with_strip_thinking_after(n);
        }
        if let Some(n) = self.summarize_after {
            config = config.with_summarize_tool_results_after(n);
        }
        if let Some(n) = self.strip_tool_results_after {
            config = config.with_strip_tool_results_after(n);
        }
        if let Some(n) = self.max_messages {
            config = config.with_max_context_messages(n);
        }
        Ok(config)
    }
}

// ── Helpers ────────────────────────────────────────────────────────

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse a JSONL transcript. Blank lines are skipped.
fn read_transcript(path: &Path) -> Result<Vec<Message>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read transcript '{}': {e}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Message>(line).map_err(|e| {
                format!(
                    "failed to parse message on line {} of '{}': {e}",
                    n + 1,
                    path.display()
                )
            })
        })
        .collect()
}

fn to_jsonl(messages: &[Message]) -> Result<String, String> {
    let mut out = String::new();
    for msg in messages {
        let line =
            serde_json::to_string(msg).map_err(|e| format!("failed to serialize message: {e}"))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

// ── Commands ───────────────────────────────────────────────────────

async fn run(cli: Cli) -> Result<String, String> {
    match cli.command {
        Command::Apply {
            session,
            thresholds,
            output,
        } => {
            let config = thresholds.resolve()?;
            let messages = read_transcript(&session)?;
            let store = load_summary_store(&session).await;

            let outcome = apply_context_decay(&messages, &config, &store);
            if outcome.is_changed() {
                info!("{}", outcome.report.to_log_string());
            } else {
                info!("Nothing to decay ({} messages)", messages.len());
            }

            let jsonl = to_jsonl(&outcome.messages)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, jsonl)
                        .await
                        .map_err(|e| format!("failed to write '{}': {e}", path.display()))?;
                    Ok(String::new())
                }
                None => Ok(jsonl),
            }
        }
        Command::ShowAges { session } => {
            let messages = read_transcript(&session)?;
            let ages = compute_turn_ages(&messages);
            let mut out = String::new();
            for (idx, (msg, age)) in messages.iter().zip(ages).enumerate() {
                let role = msg.role.to_string();
                out.push_str(&format!(
                    "{idx:>5}  age {age:>3}  {role:<10}  {} chars\n",
                    msg.content.char_count()
                ));
            }
            Ok(out)
        }
        Command::Candidates {
            session,
            thresholds,
        } => {
            let config = thresholds.resolve()?;
            if config.summarize_after().is_none() {
                return Err("summarization is disabled; pass --summarize-after".to_string());
            }
            let messages = read_transcript(&session)?;
            let store = load_summary_store(&session).await;
            let candidates = summarization_candidates(&messages, &config, &store);
            info!(
                "{} candidate(s), {} cached summaries",
                candidates.len(),
                store.len()
            );
            let mut out = String::new();
            for idx in candidates {
                let msg = &messages[idx];
                out.push_str(&format!(
                    "{idx}\t{}\t{} chars\n",
                    msg.tool_name.as_deref().unwrap_or("-"),
                    msg.content.char_count()
                ));
            }
            Ok(out)
        }
        Command::ClearSummaries { session } => {
            clear_summary_store(&session).await.map_err(|e| {
                format!(
                    "failed to clear '{}': {e}",
                    summary_store_path(&session).display()
                )
            })?;
            Ok(String::new())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
