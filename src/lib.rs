// src/lib.rs

pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod results;
pub mod types;
pub mod watch;

use std::path::PathBuf;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::loader::{default_config_path, load_from_path};
use crate::config::model::{ConfigFile, RawConfigFile};
use crate::engine::WatchCoordinator;
use crate::engine::coordinator::resolve_root;
use crate::errors::{Result, SentinelError};
use crate::exec::CommandRunner;
use crate::fs::RealFileSystem;
use crate::results::OutputSink;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and CLI overrides
/// - the test command runner
/// - the watch coordinator
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = resolve_config(&args)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let options = cfg.watch_options(OutputSink::stdout());
    let workdir = resolve_root(&RealFileSystem, &options.effective_paths())?;
    let runner = CommandRunner::new(&cfg.command, cfg.target_template.clone())?
        .with_workdir(workdir);

    let mut coordinator = WatchCoordinator::builder(options)
        .with_runner(runner)
        .build()?;

    let ctx = CancellationToken::new();
    {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl+C");
                return;
            }
            info!("interrupt received, shutting down");
            ctx.cancel();
        });
    }

    let result = coordinator.start(ctx).await;
    let status = coordinator.status();
    info!(
        runs = status.run_count,
        events = status.event_count,
        errors = status.error_count,
        "watch finished"
    );
    coordinator.stop()?;
    result
}

/// Process exit code for the outcome of [`run`].
///
/// Interrupting a watch is a normal way to end it.
pub fn exit_code(result: &Result<()>) -> i32 {
    match result {
        Ok(()) | Err(SentinelError::Cancelled) => 0,
        Err(SentinelError::Config(_)) | Err(SentinelError::Toml(_)) => 2,
        Err(_) => 1,
    }
}

/// File config (explicit `--config`, else `sentinel.toml` if present) with
/// command-line flags applied on top.
fn resolve_config(args: &CliArgs) -> Result<ConfigFile> {
    let path: Option<PathBuf> = match &args.config {
        Some(p) => Some(PathBuf::from(p)),
        None => default_config_path(),
    };

    let mut raw = match &path {
        Some(p) => {
            debug!(path = %p.display(), "loading config");
            load_from_path(p).map_err(|e| match e {
                SentinelError::Io(io) => {
                    SentinelError::config(format!("cannot read {}: {io}", p.display()))
                }
                other => other,
            })?
        }
        None => RawConfigFile::default(),
    };
    args.apply_to(&mut raw);
    ConfigFile::try_from(raw)
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("sentinel dry-run");
    println!("  paths: {:?}", cfg.paths);
    println!("  mode: {}", cfg.mode);
    println!("  ignore: {:?}", cfg.ignore);
    println!("  test_patterns: {:?}", cfg.test_patterns);
    println!("  debounce: {}ms", cfg.debounce.as_millis());
    println!("  run_on_start: {}", cfg.run_on_start);
    if cfg.clear_terminal {
        println!("  clear_terminal: true");
    }
    if cfg.use_hash {
        println!("  use_hash: true");
    }
    if cfg.fail_fast {
        println!("  fail_fast: true");
    }
    println!("  command: {:?}", cfg.command);
    println!("  target_template: {}", cfg.target_template);

    debug!("dry-run complete (no execution)");
}
