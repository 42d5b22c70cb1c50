//! lectio CLI - inspect and maintain translation checkpoints and metrics.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lectio::{CheckpointStore, Config, MetricsCollector, SessionListing};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "lectio")]
#[command(version)]
#[command(about = "Inspect and maintain translation pipeline checkpoints and metrics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored sessions, most recently updated first
    Sessions {
        /// Only sessions that can still be resumed
        #[arg(long)]
        incomplete: bool,
    },

    /// Show progress of one session and the chunks left to process
    Show {
        session_id: String,
    },

    /// Delete a session checkpoint and its backup
    Delete {
        session_id: String,

        /// Also delete the session's metrics document
        #[arg(long)]
        metrics: bool,
    },

    /// Remove checkpoint backups older than the retention period
    Cleanup {
        /// Age threshold in days (defaults to the configured retention)
        #[arg(long)]
        days: Option<u64>,
    },

    /// Metrics reports
    Metrics {
        #[command(subcommand)]
        report: MetricsCommand,
    },

    /// Show example configuration
    Example,
}

#[derive(Subcommand)]
enum MetricsCommand {
    /// Aggregate report over all sessions
    Global,

    /// Detailed report of one session
    Session { session_id: String },

    /// Compare several sessions side by side
    Compare {
        #[arg(required = true)]
        session_ids: Vec<String>,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");
}

fn print_example_config() {
    let example = r#"# lectio configuration file

[storage]
# Checkpoint documents and their backups
checkpoint_dir = ".cache/pipeline/checkpoints"
# Metrics documents ({session_id}_metrics.json)
metrics_dir = "${HOME}/.cache/lectio/metrics"
# Keep a copy of the previous checkpoint before each write
backup_on_save = true
# Backups older than this are removed by `lectio cleanup`
backup_retention_days = 7
"#;
    println!("{example}");
}

fn print_sessions(sessions: &[SessionListing]) {
    if sessions.is_empty() {
        println!("No sessions found.");
        return;
    }
    println!(
        "{:<24} {:<14} {:>9} {:>8}  {}",
        "Session", "Phase", "Chunks", "Quality", "Work"
    );
    for s in sessions {
        let quality = s
            .mean_quality
            .map(|q| format!("{q:.2}"))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{:<24} {:<14} {:>9} {:>8}  {} - {}",
            s.session_id,
            s.phase,
            format!("{}/{}", s.chunks_done, s.chunks_total),
            quality,
            s.author,
            s.work
        );
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    if let Commands::Example = cli.command {
        print_example_config();
        return Ok(());
    }

    let config = Config::load_or_default(cli.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    let storage = &config.storage;

    match cli.command {
        Commands::Example => {}

        Commands::Sessions { incomplete } => {
            let store = CheckpointStore::new(&storage.resolved_checkpoint_dir())
                .context("Failed to open checkpoint store")?;
            let sessions = if incomplete {
                store.list_incomplete()?
            } else {
                store.list_sessions_detailed()?
            };
            print_sessions(&sessions);
        }

        Commands::Show { session_id } => {
            let store = CheckpointStore::new(&storage.resolved_checkpoint_dir())
                .context("Failed to open checkpoint store")?;
            let Some(checkpoint) = store.load_with_recovery(&session_id) else {
                println!("No checkpoint found for session '{session_id}'");
                return Ok(());
            };
            let summary = checkpoint.summary();

            println!("\n=== Session {} ===", summary.session_id);
            println!("Work:        {} - {}", summary.author, summary.work);
            println!("Phase:       {}", summary.phase);
            println!(
                "Chunks:      {} done, {} failed, {} pending of {}",
                summary.chunks_done,
                summary.chunks_failed,
                summary.chunks_pending,
                summary.chunks_total
            );
            match summary.mean_quality {
                Some(q) => println!("Quality:     {q:.2}"),
                None => println!("Quality:     N/A"),
            }
            println!(
                "Tokens:      {} in / {} out",
                summary.total_input_tokens, summary.total_output_tokens
            );
            println!("Cost:        €{:.4}", summary.total_cost);
            println!("Time:        {:.1}s", summary.total_seconds);
            println!("Errors:      {}", summary.error_count);
            println!("Updated:     {}", summary.updated_at.to_rfc3339());

            let pending: Vec<&str> = checkpoint
                .pending_chunks()
                .iter()
                .map(|c| c.id.as_str())
                .collect();
            if !pending.is_empty() {
                println!("Pending:     {}", pending.join(", "));
            }
        }

        Commands::Delete {
            session_id,
            metrics,
        } => {
            let store = CheckpointStore::new(&storage.resolved_checkpoint_dir())
                .context("Failed to open checkpoint store")?;
            if store.delete(&session_id)? {
                info!("Deleted checkpoint for '{session_id}'");
            } else {
                info!("No checkpoint for '{session_id}'");
            }
            if metrics {
                let collector = MetricsCollector::from_config(storage)
                    .context("Failed to open metrics directory")?;
                if collector.delete(&session_id)? {
                    info!("Deleted metrics for '{session_id}'");
                }
            }
        }

        Commands::Cleanup { days } => {
            let store = CheckpointStore::new(&storage.resolved_checkpoint_dir())
                .context("Failed to open checkpoint store")?;
            let days = days.unwrap_or(storage.backup_retention_days);
            let removed = store.cleanup_backups(days)?;
            info!("Removed {removed} backup(s) older than {days} day(s)");
        }

        Commands::Metrics { report } => {
            let collector = MetricsCollector::from_config(storage)
                .context("Failed to open metrics directory")?;
            let text = match report {
                MetricsCommand::Global => collector.global_report()?,
                MetricsCommand::Session { session_id } => collector.session_report(&session_id),
                MetricsCommand::Compare { session_ids } => collector.compare(&session_ids[..]),
            };
            println!("{text}");
        }
    }

    Ok(())
}
