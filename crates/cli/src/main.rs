//! closeman CLI - month-end close task engine.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use closeman_core::CloseError;
use closeman_service::{CloseManager, EngineConfig, Envelope, Request};
use closeman_storage::{JsonStorage, MemoryStorage, TaskStore};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "closeman")]
#[command(about = "Month-end close task engine", long_about = None)]
struct Cli {
    /// Directory holding period files
    #[arg(long, global = true, default_value = ".closeman")]
    storage: PathBuf,

    /// Use an in-memory store that is discarded on exit
    #[arg(long, global = true)]
    memory: bool,

    /// JSON engine configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by CLOSEMAN_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one JSON request from stdin and print the response
    Run,
    /// Answer line-delimited JSON requests on stdin until EOF
    Serve,
    /// Initialize the close tasks for a period
    Init {
        /// Period label, e.g. 2025-01
        period: String,
        /// Last day of the period (YYYY-MM-DD)
        period_end_date: String,
        /// Business days allowed for the close
        #[arg(long)]
        close_days: Option<u32>,
        /// Category assignee, e.g. RECONCILIATION=alice (repeatable)
        #[arg(long = "assign", value_parser = parse_assignment)]
        assignees: Vec<(String, String)>,
    },
    /// Show the close calendar for a period
    Calendar {
        /// Period label
        period: String,
        /// Last day of the period (YYYY-MM-DD)
        period_end_date: String,
        /// Business days allowed for the close
        #[arg(long)]
        close_days: Option<u32>,
        /// Print the fixed-width calendar instead of JSON
        #[arg(long)]
        text: bool,
    },
    /// Change a task's status
    Update {
        /// Task ID
        task_id: String,
        /// NOT_STARTED, IN_PROGRESS, COMPLETED or BLOCKED
        status: String,
        /// Notes to record
        #[arg(long)]
        notes: Option<String>,
        /// Who completed the task
        #[arg(long)]
        completed_by: Option<String>,
        /// Only update if the stored status is this one
        #[arg(long)]
        expect: Option<String>,
    },
    /// Show progress and health
    Progress {
        /// Period label
        period: String,
        /// Evaluate lateness as of this date (default: today)
        #[arg(long)]
        as_of: Option<String>,
    },
    /// List blocked tasks and critical blockers
    Blockers {
        /// Period label
        period: String,
    },
    /// Show the critical path
    CriticalPath {
        /// Period label
        period: String,
    },
    /// List initialized periods
    Periods,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    let store: Arc<dyn TaskStore> = if cli.memory {
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(
            JsonStorage::new(&cli.storage)
                .await
                .with_context(|| format!("Cannot open storage at {}", cli.storage.display()))?,
        )
    };
    debug!(storage = %cli.storage.display(), memory = cli.memory, "Store ready");

    let manager = CloseManager::new(store, config);

    let envelope = match cli.command {
        Commands::Run => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            manager.handle_json(&input).await
        }
        Commands::Serve => return serve(&manager).await,
        Commands::Init {
            period,
            period_end_date,
            close_days,
            assignees,
        } => {
            execute(
                &manager,
                Request::InitializeCloseTasks {
                    period,
                    period_end_date,
                    close_days,
                    assignees: assignees.into_iter().collect::<HashMap<_, _>>(),
                },
            )
            .await
        }
        Commands::Calendar {
            period,
            period_end_date,
            close_days,
            text,
        } => {
            let envelope = execute(
                &manager,
                Request::GenerateCloseCalendar {
                    period,
                    period_end_date,
                    close_days,
                },
            )
            .await;
            if text {
                if let Some(rendered) = envelope
                    .data()
                    .and_then(|data| data["text_format"].as_str())
                {
                    println!("{}", rendered);
                    return Ok(());
                }
            }
            envelope
        }
        Commands::Update {
            task_id,
            status,
            notes,
            completed_by,
            expect,
        } => {
            execute(
                &manager,
                Request::UpdateTaskStatus {
                    task_id,
                    new_status: status,
                    notes,
                    completed_by,
                    expected_status: expect,
                },
            )
            .await
        }
        Commands::Progress { period, as_of } => {
            execute(&manager, Request::GetCloseProgress { period, as_of }).await
        }
        Commands::Blockers { period } => {
            execute(&manager, Request::IdentifyBlockers { period }).await
        }
        Commands::CriticalPath { period } => {
            execute(&manager, Request::GetCriticalPath { period }).await
        }
        Commands::Periods => {
            let periods = manager.list_periods().await?;
            println!("Periods ({})", periods.len());
            for period in periods {
                println!("  {}", period);
            }
            return Ok(());
        }
    };

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if envelope.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env("CLOSEMAN_LOG").unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(manager: &CloseManager<dyn TaskStore>, request: Request) -> Envelope {
    let operation = request.operation();
    match manager.execute(request).await {
        Ok(data) => Envelope::success(operation, data),
        Err(e) => {
            error!(operation, kind = e.kind(), "{}", e);
            Envelope::error(&e)
        }
    }
}

/// Line-delimited request loop; one response line per request line.
async fn serve(manager: &CloseManager<dyn TaskStore>) -> Result<()> {
    info!("Serving close requests on stdin");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = BufWriter::new(tokio::io::stdout());

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let envelope = manager.handle_json(&line).await;
        stdout.write_all(envelope.to_json().as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }

    info!("Input closed, stopping");
    Ok(())
}

fn parse_assignment(raw: &str) -> Result<(String, String), CloseError> {
    let (category, who) = raw.split_once('=').ok_or_else(|| {
        CloseError::validation(format!("Expected CATEGORY=ASSIGNEE, got '{}'", raw))
    })?;
    let category: closeman_core::TaskCategory = category.parse()?;
    Ok((category.as_str().to_string(), who.trim().to_string()))
}
