//! Invocation of the external speedtest binary

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::error::{ProbeError, ProbeResult};

#[cfg(windows)]
const LOCAL_BINARY: &str = "speedtest.exe";
#[cfg(not(windows))]
const LOCAL_BINARY: &str = "speedtest";

const PATH_BINARY: &str = "speedtest";

/// Maximum number of stderr characters carried in an execution error
const STDERR_TAIL: usize = 512;

/// Something that can run the probe and hand back its combined output
///
/// The production implementation spawns a process; tests substitute a
/// canned response.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    async fn execute(&self, args: &[String]) -> ProbeResult<String>;
}

/// Build the probe's argument list
pub fn speedtest_args(server_id: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--accept-license".to_string(),
        "--accept-gdpr".to_string(),
        "--format=jsonl".to_string(),
    ];
    if let Some(id) = server_id {
        args.push(format!("--server-id={id}"));
    }
    args
}

/// Pick the binary: explicit path, then one next to the working directory,
/// then whatever `speedtest` resolves to on `PATH`
pub fn resolve_program(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    let local = Path::new(".").join(LOCAL_BINARY);
    if local.is_file() {
        return local;
    }

    PathBuf::from(PATH_BINARY)
}

/// Runs the Ookla speedtest CLI as a subprocess
#[derive(Debug, Clone)]
pub struct SpeedtestCommand {
    program: PathBuf,
}

impl SpeedtestCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Use [`resolve_program`] to locate the binary
    pub fn discover(explicit: Option<&Path>) -> Self {
        Self::new(resolve_program(explicit))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

#[async_trait]
impl ProbeExecutor for SpeedtestCommand {
    #[instrument(skip(self), fields(program = %self.program.display()))]
    async fn execute(&self, args: &[String]) -> ProbeResult<String> {
        debug!("spawning speedtest");

        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProbeError::ExecutionFailed(format!(
                    "could not start {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            let tail = stderr_tail(&stderr);
            return Err(ProbeError::ExecutionFailed(if tail.is_empty() {
                format!("speedtest exited with {}", output.status)
            } else {
                format!("speedtest exited with {}: {}", output.status, tail)
            }));
        }

        let mut combined = stdout.into_owned();
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(combined)
    }
}

fn stderr_tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let skip = trimmed.chars().count().saturating_sub(STDERR_TAIL);
    trimmed.chars().skip(skip).collect()
}
