use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{shutdown, status};
use scanner_core::config::{self, AppConfig};
use scanner_core::pipeline;
use scanner_core::RunOutcome;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    init_tracing(cfg.show_trace);

    match cli.command {
        Commands::Scan {
            json,
            bucket,
            concurrency,
        } => run_scan(cfg, bucket, concurrency, json).await,
        Commands::Status { json } => run_status(cfg, json).await,
    }
}

#[derive(Parser)]
#[command(name = "bucket-scanner")]
#[command(about = "Flags confidential documents in an object store bucket", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every object in the bucket that is not yet in the ledger
    Scan {
        /// Output JSON summary
        #[arg(long)]
        json: bool,
        /// Override store.bucket
        #[arg(long)]
        bucket: Option<String>,
        /// Override pipeline.max_concurrency
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Summarize the verdicts recorded in the ledger
    Status {
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(show_trace: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if show_trace {
            EnvFilter::new("info,scanner_core=trace,providers=trace,storage=trace,cli=trace")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_scan(
    mut cfg: AppConfig,
    bucket: Option<String>,
    concurrency: Option<usize>,
    json: bool,
) -> Result<()> {
    if let Some(bucket) = bucket {
        cfg.store.bucket = Some(bucket);
    }
    if let Some(max) = concurrency {
        cfg.pipeline.max_concurrency = max;
    }
    let scanner = pipeline::build_scanner(&cfg)?;

    let cancel = CancellationToken::new();
    let interrupt = shutdown::watch_interrupt(cancel.clone());
    shutdown::watch_exit_command(std::io::BufReader::new(std::io::stdin()), cancel.clone());
    info!("Type 'exit' or press Ctrl+C to stop after in-flight files finish");

    let result = scanner.run(cancel.clone()).await;
    // Release the signal listener; the stdin thread dies with the process.
    cancel.cancel();
    shutdown::join_listener(interrupt).await;
    let outcome = result?;

    let status_label = match &outcome {
        RunOutcome::Completed(_) => "completed",
        RunOutcome::Cancelled(_) => "cancelled",
    };
    let summary = outcome.summary();
    if json {
        let summary_json = serde_json::json!({
            "status": status_label,
            "bucket": scanner.bucket(),
            "ledger": cfg.ledger.path,
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&summary_json)?);
    } else {
        println!(
            "{}: listed {}, already processed {}, classified {}, recorded {} (confidential {}, clean {}, errors {}, other {})",
            status_label,
            summary.listed,
            summary.skipped_processed,
            summary.admitted,
            summary.recorded,
            summary.flagged,
            summary.clean,
            summary.errors,
            summary.unparsed,
        );
        if summary.discarded > 0 {
            println!("dropped after cancellation: {}", summary.discarded);
        }
    }
    Ok(())
}

async fn run_status(cfg: AppConfig, json: bool) -> Result<()> {
    let status = status::ledger_status(&cfg.ledger.path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!(
            "{}: {} rows, {} distinct files",
            status.path, status.rows, status.distinct_keys
        );
        for (verdict, count) in &status.by_verdict {
            println!("  {verdict}: {count}");
        }
        if !status.errored_keys.is_empty() {
            println!("files recorded as error (not retried):");
            for key in &status.errored_keys {
                println!("  {key}");
            }
        }
    }
    Ok(())
}
