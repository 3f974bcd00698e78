mod cli;

use anyhow::Context;
use clap::Parser;
use std::future::Future;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use shardflow::prelude::*;

use crate::cli::{AssignArgs, Cli, Commands, DownloadArgs};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    if let Err(e) = init_tracing(format, &cli.log_level) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Command failed: {e:#}");
            eprintln!("Error: {e:#}");
            let failure = e.downcast_ref::<ShardflowError>();
            if let Some(ShardflowError::Usage(UsageError {
                fix_hint: Some(hint),
                ..
            })) = failure
            {
                eprintln!("Hint: {hint}");
            }
            let code = failure.map_or(1, ShardflowError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Download(args) => download(args).await,
        Commands::Assign(args) => assign_keys(&args),
    }
}

async fn download(args: DownloadArgs) -> anyhow::Result<()> {
    let assignment = JobAssignment::from_args(args.shard.job_number, args.shard.njobs)
        .map_err(ShardflowError::from)?;

    let mut config = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::new(),
    };
    if let Some(dir) = args.output_dir {
        config = config.with_output_dir(dir);
    }
    if let Some(path) = args.compositions {
        config.download.compositions = path;
    }

    let catalog = HttpCatalog::new(&config.catalog).context("failed to create catalog client")?;
    let cancel = Arc::new(CancellationToken::new());
    spawn_interrupt_handler(Arc::clone(&cancel));

    info!(%assignment, output_dir = %config.output_dir.display(), "Starting download");
    let summary = run_download(&config, assignment, catalog, cancel).await?;

    if args.summary_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    if summary.has_failures() {
        warn!(failures = summary.failures.len(), "Some keys failed, see the summary");
    }
    Ok(())
}

fn assign_keys(args: &AssignArgs) -> anyhow::Result<()> {
    // Validates njobs the same way job commands do.
    JobAssignment::shard(0, args.njobs).map_err(ShardflowError::from)?;
    for key in &args.keys {
        println!("{key}\t{}", assign(key, args.njobs));
    }
    Ok(())
}

/// Cancels the run on the first interrupt or terminate signal.
fn spawn_interrupt_handler(cancel: Arc<CancellationToken>) {
    cancel_on(cancel, shutdown_signal());
}

/// Cancels `cancel` with the name of the signal `signal` resolves to.
fn cancel_on<F>(cancel: Arc<CancellationToken>, signal: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = io::Result<&'static str>> + Send + 'static,
{
    tokio::spawn(async move {
        match signal.await {
            Ok(name) => {
                warn!(signal = name, "Stopping after flushing results");
                cancel.cancel(name);
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signals"),
        }
    })
}

#[cfg(unix)]
async fn shutdown_signal() -> io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "interrupt signal"),
        _ = terminate.recv() => Ok("terminate signal"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "interrupt signal")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_with_its_name() {
        let cancel = Arc::new(CancellationToken::new());

        cancel_on(Arc::clone(&cancel), async { Ok("terminate signal") })
            .await
            .unwrap();

        assert!(cancel.is_cancelled());
        assert_eq!(cancel.reason().as_deref(), Some("terminate signal"));
    }

    #[tokio::test]
    async fn test_listener_failure_leaves_run_alone() {
        let cancel = Arc::new(CancellationToken::new());

        cancel_on(Arc::clone(&cancel), async {
            Err(io::Error::other("no signal support"))
        })
        .await
        .unwrap();

        assert!(!cancel.is_cancelled());
    }
}
