// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! codi-perf entry point - reports, audits and queue maintenance.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use codi_perf::audit::AuditResult;
use codi_perf::config::{self, PipelineConfig};
use codi_perf::logging::{init_logging, LogConfig};
use codi_perf::pipeline::Pipeline;
use codi_perf::VERSION;

/// codi-perf - execution telemetry and performance audits.
#[derive(Parser)]
#[command(name = "codi-perf")]
#[command(author, version, about = "Execution telemetry and performance audits", long_about = None)]
struct Cli {
    /// Data directory holding the stores and the optimization queue
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'f', long, value_enum, default_value = "text", global = true)]
    format: OutputFormat,

    /// Show debug logs
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the markdown performance report
    Report {
        /// Skip components with fewer executions
        #[arg(short, long, default_value_t = 1)]
        min_executions: u64,
    },
    /// Audit one component
    Audit {
        /// Component name
        component: String,
        /// Layer the component belongs to
        #[arg(short, long, default_value = "tool")]
        layer: String,
    },
    /// Audit every component
    AuditAll {
        #[arg(short, long, default_value_t = 1)]
        min_executions: u64,
    },
    /// Sync pending records into the analytics store
    Sync,
    /// Inspect or edit the optimization queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Show the resolved configuration
    Config,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued components, highest priority first
    List,
    /// Remove one component from the queue
    Remove {
        component: String,
        #[arg(short, long, default_value = "tool")]
        layer: String,
    },
    /// Empty the queue
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::development()
    } else {
        LogConfig::production()
    };
    let _log_guard = init_logging(&log_config)?;

    let workspace_root = std::env::current_dir()?;
    let root = config::find_workspace_root(&workspace_root).unwrap_or(workspace_root);
    let mut config = config::load_config(&root)?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    if let Commands::Config = cli.command {
        return print_config(&config, cli.format);
    }

    let pipeline = Pipeline::open(config)?;
    let outcome = run_command(&pipeline, cli.command, cli.format);
    let closed = pipeline.close().await;
    outcome?;
    closed?;
    Ok(())
}

fn run_command(pipeline: &Pipeline, command: Commands, format: OutputFormat) -> anyhow::Result<()> {
    match command {
        Commands::Report { min_executions } => {
            println!("{}", pipeline.generate_report(min_executions)?);
        }
        Commands::Audit { component, layer } => {
            let result = pipeline.audit(&component, &layer)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
                OutputFormat::Text => print_audit(&result),
            }
        }
        Commands::AuditAll { min_executions } => {
            let results = pipeline.audit_all(min_executions)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
                OutputFormat::Text => {
                    if results.is_empty() {
                        println!("{}", "No components to audit".dimmed());
                    }
                    for result in &results {
                        print_audit(result);
                    }
                    let failed = results.iter().filter(|r| !r.passed).count();
                    println!(
                        "\n{} audited, {} failed, {} queued",
                        results.len(),
                        failed,
                        pipeline.queue().len()
                    );
                }
            }
        }
        Commands::Sync => {
            let report = pipeline.sync_now()?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!(
                    "{} Synced {} records in {} batches ({} new)",
                    "✓".green(),
                    report.synced,
                    report.batches,
                    report.inserted
                ),
            }
        }
        Commands::Queue { action } => handle_queue(pipeline, action, format)?,
        Commands::Config => {}
    }
    Ok(())
}

fn handle_queue(pipeline: &Pipeline, action: QueueAction, format: OutputFormat) -> anyhow::Result<()> {
    let queue = pipeline.queue();
    match action {
        QueueAction::List => {
            let candidates = queue.candidates();
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&candidates)?);
                return Ok(());
            }
            if candidates.is_empty() {
                println!("{}", "Optimization queue is empty".dimmed());
            }
            for candidate in &candidates {
                println!(
                    "[{}] {}:{}",
                    candidate.priority.to_string().bright_yellow(),
                    candidate.layer,
                    candidate.component_name.bright_white()
                );
                for violation in &candidate.violations {
                    println!("    {} {}", "-".red(), violation);
                }
                if !candidate.recommendation.is_empty() {
                    println!("    {}", candidate.recommendation.dimmed());
                }
            }
        }
        QueueAction::Remove { component, layer } => match queue.remove(&component, &layer)? {
            Some(_) => println!("{} Removed {}:{}", "✓".green(), layer, component),
            None => println!("{}", format!("{}:{} is not queued", layer, component).yellow()),
        },
        QueueAction::Clear => {
            let removed = queue.clear()?;
            println!("{} Removed {} entries", "✓".green(), removed);
        }
    }
    Ok(())
}

fn print_audit(result: &AuditResult) {
    let status = if result.passed {
        "PASS".green().bold()
    } else {
        "FAIL".red().bold()
    };
    println!(
        "{} {}:{} ({} executions, avg {:.1}ms, p95 {:.1}ms)",
        status,
        result.layer,
        result.component_name.bright_white(),
        result.metrics.execution_count,
        result.metrics.avg_duration_ms,
        result.metrics.p95_duration_ms
    );
    for violation in &result.violations {
        println!("    {} {}", "-".red(), violation);
    }
    if let Some(priority) = result.priority {
        println!("    queued with priority {}", priority.to_string().bright_yellow());
    }
    if let Some(ref recommendation) = result.recommendation {
        println!("    {}", recommendation.dimmed());
    }
}

fn print_config(config: &PipelineConfig, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
        OutputFormat::Text => {
            println!("{}", format!("codi-perf {}", VERSION).bright_blue().bold());
            println!("Data dir: {}", config.data_dir.display());
            println!("Sync interval: {}ms", config.sync_interval_ms);
            println!("Sync batch size: {}", config.sync_batch_size);
            println!("Shutdown grace: {}ms", config.shutdown_grace_ms);
            println!("System metrics: {}", config.capture_system_metrics);
            println!("Audit history: {}", config.max_audit_history);
            let thresholds = config.threshold_set();
            for layer in codi_perf::record::layers::ALL {
                println!(
                    "Threshold {}: {}",
                    layer,
                    serde_json::to_string(&thresholds.get(layer))?
                );
            }
        }
    }
    Ok(())
}
