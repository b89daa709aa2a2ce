//! CLI entry point - the composition root.
//!
//! This is the only place where the engine is wired together: config
//! from arguments, history store on disk, events onto the terminal.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use courier_cli::{Cli, Commands, ConsoleEmitter, HistoryCommands, JobOutcome, load_manifest};
use courier_core::EngineConfig;
use courier_download::{JobManager, JsonHistoryStore};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let history = Arc::new(JsonHistoryStore::new(
        cli.download_dir.join(".courier-history.json"),
    ));

    match cli.command {
        Commands::Download {
            source,
            token,
            parallel,
            no_extract,
        } => {
            let manifest = load_manifest(&source, token.as_deref()).await?;
            println!(
                "{}: {} file(s), {}",
                manifest.name,
                manifest.files.len(),
                format_bytes(manifest.total_bytes)
            );

            let config = EngineConfig::new(&cli.download_dir)
                .with_max_parallel(parallel)
                .with_auto_extract(!no_extract)
                .with_transfer_bin(&cli.transfer_bin)
                .with_extract_bin(&cli.extract_bin);

            let emitter = ConsoleEmitter::new();
            let manager = JobManager::new(config, Arc::new(emitter.clone()), history);

            let id = manager.start(manifest).await?;
            match emitter.wait_for(&id).await {
                JobOutcome::Completed {
                    extraction_error: None,
                } => {
                    println!("done");
                    Ok(ExitCode::SUCCESS)
                }
                JobOutcome::Completed {
                    extraction_error: Some(err),
                } => {
                    println!("downloaded, but extraction failed: {err}");
                    Ok(ExitCode::SUCCESS)
                }
                JobOutcome::Failed { message } => {
                    // One failed file does not abort its siblings; let
                    // the rest of the pool finish so completed files
                    // stay on disk for a later re-run.
                    while manager.is_active(&id)
                        && !manager.is_settled(&id).unwrap_or(true)
                    {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                    }
                    let _ = manager.cancel(&id);
                    eprintln!("download failed: {message}");
                    Ok(ExitCode::FAILURE)
                }
                JobOutcome::Cancelled => {
                    eprintln!("download cancelled");
                    Ok(ExitCode::FAILURE)
                }
            }
        }

        Commands::History { command } => match command {
            HistoryCommands::List => {
                use courier_core::HistoryStorePort;
                let records = history.list().await?;
                if records.is_empty() {
                    println!("no downloads recorded");
                } else {
                    for record in records {
                        println!(
                            "{}  {:<32} {:>10}  {}",
                            record.finished_at.format("%Y-%m-%d %H:%M"),
                            record.name,
                            format_bytes(record.total_bytes),
                            record.status.as_str()
                        );
                    }
                }
                Ok(ExitCode::SUCCESS)
            }
            HistoryCommands::Clear => {
                use courier_core::HistoryStorePort;
                history.clear().await?;
                println!("history cleared");
                Ok(ExitCode::SUCCESS)
            }
        },
    }
}

#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    if bytes == 0 {
        return "unknown size".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
