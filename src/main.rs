mod analysis;
mod config;
mod context;
mod evolution;
mod ranking;
mod recovery;
mod report;
mod synthesis;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use config::RecoveryConfig;
use context::RecoveryContext;
use recovery::MessageFilter;
use report::{CrashReport, RecoveryOptions, format_recovered_context};
use std::path::{Path, PathBuf};
use std::process;

const LOG_ENV: &str = "CRASHRECOVER_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

/// Salvage and analyze a conversation file that was cut off mid-write.
#[derive(Debug, Parser)]
#[command(name = "crashrecover", version)]
struct Cli {
    /// Conversation file to recover.
    task_id_or_path: PathBuf,

    /// Maximum length of the summary, in characters.
    #[arg(long, default_value_t = report::DEFAULT_MAX_LENGTH)]
    max_length: usize,

    /// Leave code snippets and code evolution out of the result.
    #[arg(long)]
    no_code_snippets: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Print the crash report projection instead of the full result.
    #[arg(long)]
    crash_report: bool,

    /// TOML file with analysis tunables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only keep messages at or after this epoch-ms timestamp.
    #[arg(long)]
    since: Option<i64>,

    /// Only keep messages at or before this epoch-ms timestamp.
    #[arg(long)]
    until: Option<i64>,

    /// Only keep messages containing this text (case-insensitive).
    #[arg(long)]
    search: Option<String>,
}

fn build_logger() -> env_logger::Logger {
    env_logger::Builder::from_env(env_logger::Env::new().filter_or(LOG_ENV, "warn"))
        .format_timestamp(None)
        .build()
}

/// Conversation files are named after their task; the stem is the id.
fn task_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn run(cli: Cli) -> Result<String> {
    let config = match &cli.config {
        Some(path) => RecoveryConfig::load(path)?,
        None => RecoveryConfig::default(),
    };
    let logger = build_logger();
    let ctx = RecoveryContext::new(&config, &logger);

    let options = RecoveryOptions {
        max_length: cli.max_length,
        include_code_snippets: !cli.no_code_snippets,
        filter: MessageFilter {
            since: cli.since,
            until: cli.until,
            search: cli.search.clone(),
        },
    };
    let result = report::recover_crashed_conversation(&ctx, &cli.task_id_or_path, &options)?;

    if cli.crash_report {
        let formatted = format_recovered_context(&result, &config.context_template)?;
        let report = CrashReport::from_result(&task_id(&cli.task_id_or_path), &result, formatted);
        return serde_json::to_string_pretty(&report).context("serializing crash report");
    }

    match cli.format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result).context("serializing recovery result")
        }
        OutputFormat::Text => Ok(format_recovered_context(&result, &config.context_template)?),
    }
}

fn main() {
    let cli = Cli::parse();
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(err) => {
            eprintln!("crashrecover: {err:#}");
            process::exit(1);
        }
    }
}
