//! Scanner subprocess supervision.
//!
//! One adapter call owns one child process for one phase: spawn, stream
//! stdout line by line, surface parsed events through a channel while the
//! process is still running, then judge the exit code. The adapter is the
//! only component that ever touches process handles.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use vigil_core::{Result, VigilError};
use vigil_model::{PortResult, ScanId, SubdomainResult};

use crate::scanner::wire::ScannerLine;

/// Program plus base arguments for one scanner phase; the target is
/// appended as the final argument.
#[derive(Debug, Clone)]
pub struct ScannerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ScannerCommand {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().collect(),
        }
    }

    /// Parse a whitespace-separated command line, e.g. from an env var.
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next()?.to_string();
        Some(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }

    fn build(&self, target: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Incremental output of the subdomain enumeration phase.
#[derive(Debug, Clone)]
pub enum SubdomainEnumEvent {
    Found(SubdomainResult),
    /// Phase-local progress, 0..=100.
    Progress(u8),
}

#[derive(Debug, Clone)]
pub struct ScannerAdapter {
    subdomain_command: ScannerCommand,
    port_command: ScannerCommand,
}

impl ScannerAdapter {
    pub fn new(
        subdomain_command: ScannerCommand,
        port_command: ScannerCommand,
    ) -> Self {
        Self {
            subdomain_command,
            port_command,
        }
    }

    /// Run the subdomain enumerator against `target`.
    ///
    /// Every parsed `subdomain`/`progress` line is forwarded through
    /// `events` the moment it arrives; the collected results are also
    /// returned once the process exits. Spawn failure or a nonzero exit
    /// is a hard failure that aborts the scan.
    pub async fn run_subdomain_enum(
        &self,
        scan_id: ScanId,
        target: &str,
        events: mpsc::Sender<SubdomainEnumEvent>,
    ) -> Result<Vec<SubdomainResult>> {
        let mut child =
            self.subdomain_command.build(target).spawn().map_err(|e| {
                VigilError::Scanner {
                    phase: "subdomain",
                    message: format!(
                        "failed to start subdomain scanner: {e}"
                    ),
                }
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            VigilError::Internal("child stdout not captured".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(scan_id, "subdomain", stderr));
        }

        let mut found = Vec::new();
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScannerLine>(&line) {
                Ok(ScannerLine::Subdomain(result)) => {
                    debug!(%scan_id, subdomain = %result.subdomain, "found subdomain");
                    found.push(result.clone());
                    let _ = events
                        .send(SubdomainEnumEvent::Found(result))
                        .await;
                }
                Ok(ScannerLine::Progress { percent }) => {
                    let percent = percent.clamp(0.0, 100.0) as u8;
                    let _ = events
                        .send(SubdomainEnumEvent::Progress(percent))
                        .await;
                }
                Ok(ScannerLine::Port(_)) => {
                    warn!(%scan_id, "port line from subdomain scanner, skipping");
                }
                Err(_) => {
                    warn!(%scan_id, %line, "failed to parse scanner output");
                }
            }
        }

        let status = child.wait().await.map_err(|e| VigilError::Scanner {
            phase: "subdomain",
            message: format!("failed to await subdomain scanner: {e}"),
        })?;
        if !status.success() {
            return Err(VigilError::Scanner {
                phase: "subdomain",
                message: format!(
                    "subdomain scanner exited with code {}",
                    status.code().unwrap_or(-1)
                ),
            });
        }
        Ok(found)
    }

    /// Run the port scanner against one target, forwarding each parsed
    /// `port` line through `ports`.
    ///
    /// Port scanning is best-effort per target: spawn failure and
    /// nonzero exits are logged and tolerated so one target's failure
    /// never aborts the job.
    pub async fn run_port_scan(
        &self,
        scan_id: ScanId,
        target: &str,
        ports: mpsc::Sender<PortResult>,
    ) {
        let mut child = match self.port_command.build(target).spawn() {
            Ok(child) => child,
            Err(err) => {
                error!(%scan_id, %target, error = %err, "failed to start port scanner");
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            error!(%scan_id, %target, "child stdout not captured");
            return;
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(drain_stderr(scan_id, "port", stderr));
        }

        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ScannerLine>(&line) {
                Ok(ScannerLine::Port(result)) => {
                    debug!(
                        %scan_id,
                        subdomain = %result.subdomain,
                        port = result.port,
                        service = %result.service,
                        "found port"
                    );
                    let _ = ports.send(result).await;
                }
                Ok(_) => {}
                Err(_) => {
                    warn!(%scan_id, %line, "failed to parse scanner output");
                }
            }
        }

        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!(
                    %scan_id,
                    %target,
                    code = status.code().unwrap_or(-1),
                    "port scanner exited with nonzero code"
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(%scan_id, %target, error = %err, "failed to await port scanner");
            }
        }
    }
}

async fn drain_stderr(
    scan_id: ScanId,
    phase: &'static str,
    stderr: tokio::process::ChildStderr,
) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            error!(%scan_id, phase, "scanner stderr: {line}");
        }
    }
}
