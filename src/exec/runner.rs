// src/exec/runner.rs

use std::fmt::Debug;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::{Result, SentinelError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes tests for a set of targets and returns their structured output.
pub trait TestRunner: Send + Debug {
    /// Run `targets` and return the complete line-delimited output.
    fn run<'a>(
        &'a mut self,
        ctx: CancellationToken,
        targets: &'a [String],
    ) -> BoxFuture<'a, Result<String>>;

    /// Run `targets`, forwarding each output line as it is produced.
    fn run_stream<'a>(
        &'a mut self,
        ctx: CancellationToken,
        targets: &'a [String],
        lines: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let output = self.run(ctx, targets).await?;
            for line in output.lines() {
                lines
                    .send(line.to_string())
                    .await
                    .map_err(|_| SentinelError::ChannelClosed("runner output"))?;
            }
            Ok(())
        })
    }
}

/// Runs an external test command, `go test -json` by default.
///
/// Each target is substituted into `target_template` (`{}` marks the spot)
/// and appended to the arguments.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: String,
    args: Vec<String>,
    target_template: String,
    workdir: Option<PathBuf>,
}

pub const DEFAULT_COMMAND: &[&str] = &["go", "test", "-json"];
pub const DEFAULT_TARGET_TEMPLATE: &str = "./{}";

impl Default for CommandRunner {
    fn default() -> Self {
        Self {
            program: DEFAULT_COMMAND[0].to_string(),
            args: DEFAULT_COMMAND[1..].iter().map(|s| s.to_string()).collect(),
            target_template: DEFAULT_TARGET_TEMPLATE.to_string(),
            workdir: None,
        }
    }
}

impl CommandRunner {
    pub fn new(command: &[String], target_template: impl Into<String>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| SentinelError::config("runner command must not be empty"))?;
        if program.trim().is_empty() {
            return Err(SentinelError::config("runner command must not be empty"));
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            target_template: target_template.into(),
            workdir: None,
        })
    }

    /// Run the command from `dir` instead of the current directory.
    pub fn with_workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    pub fn render_target(&self, target: &str) -> String {
        if self.target_template.contains("{}") {
            self.target_template.replace("{}", target)
        } else {
            target.to_string()
        }
    }

    fn spawn(&self, targets: &[String]) -> Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .args(targets.iter().map(|t| self.render_target(t)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        info!(program = %self.program, ?targets, "starting test process");
        cmd.spawn()
            .with_context(|| format!("spawning test command '{}'", self.program))
            .map_err(SentinelError::Runner)
    }

    /// Drive one invocation. Lines go to `forward` when given; otherwise they
    /// are collected and returned.
    async fn drive(
        &self,
        ctx: CancellationToken,
        targets: &[String],
        forward: Option<&mpsc::Sender<String>>,
    ) -> Result<String> {
        let mut child = self.spawn(targets)?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let program = self.program.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(program = %program, "stderr: {}", line);
                }
            });
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SentinelError::Runner(anyhow!("test process has no stdout")))?;
        let mut lines = BufReader::new(stdout).lines();
        let mut collected = String::new();
        let mut saw_output = false;

        loop {
            let line = tokio::select! {
                biased;
                _ = ctx.cancelled() => {
                    let _ = child.kill().await;
                    return Err(SentinelError::Cancelled);
                }
                line = lines.next_line() => line
                    .context("reading test output")
                    .map_err(SentinelError::Runner)?,
            };
            let Some(line) = line else { break };
            saw_output = saw_output || !line.trim().is_empty();

            match forward {
                Some(tx) => tx
                    .send(line)
                    .await
                    .map_err(|_| SentinelError::ChannelClosed("runner output"))?,
                None => {
                    collected.push_str(&line);
                    collected.push('\n');
                }
            }
        }

        let status = tokio::select! {
            biased;
            _ = ctx.cancelled() => {
                let _ = child.kill().await;
                return Err(SentinelError::Cancelled);
            }
            status = child.wait() => status
                .context("waiting for test process")
                .map_err(SentinelError::Runner)?,
        };

        info!(program = %self.program, success = status.success(), code = ?status.code(), "test process exited");

        // Failing tests exit non-zero too; only silence means the runner broke.
        if !status.success() && !saw_output {
            return Err(SentinelError::Runner(anyhow!(
                "'{}' exited with {} and produced no output",
                self.program,
                status
            )));
        }
        Ok(collected)
    }
}

impl TestRunner for CommandRunner {
    fn run<'a>(
        &'a mut self,
        ctx: CancellationToken,
        targets: &'a [String],
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.drive(ctx, targets, None).await })
    }

    fn run_stream<'a>(
        &'a mut self,
        ctx: CancellationToken,
        targets: &'a [String],
        lines: mpsc::Sender<String>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.drive(ctx, targets, Some(&lines)).await?;
            Ok(())
        })
    }
}
