//! `compile` / `upload` — arduino-cli invocation.
//!
//! Commands are built as fixed argument vectors from validator output and
//! spawned directly, never through a shell. Both output streams are
//! captured, and a wall-clock timeout bounds every invocation; on timeout
//! the child is killed and reaped.

use std::ffi::OsStr;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::HandlerResult;
use crate::server::GatewayConfig;
use crate::validate;

use super::parse_params;

/// Name of the build/flash tool looked up on PATH.
const CLI_BINARY: &str = "arduino-cli";

/// Poll interval while waiting for the child to exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Deserialize)]
pub struct CompileParams {
    pub sketch: String,
    pub fqbn: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    pub sketch: String,
    pub fqbn: String,
    pub port: String,
}

/// Terminal states of one invocation.
#[derive(Debug)]
pub enum CliOutcome {
    /// Child ran to completion (exit code may still be nonzero).
    Completed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// Child exceeded the wall-clock budget and was killed.
    TimedOut,
    /// Child never started (binary missing, spawn error).
    SpawnFailed(String),
}

/// Handle `compile`: `arduino-cli compile --fqbn <fqbn> <sketch>`.
pub fn compile(config: &GatewayConfig, params: Value) -> HandlerResult<Value> {
    let params: CompileParams = parse_params(params)?;
    let sketch = validate::sketch_path(&params.sketch, config)?;
    let fqbn = validate::fqbn(&params.fqbn)?;

    info!(sketch = %sketch.display(), fqbn, "compile requested");

    let args = [
        OsStr::new("compile"),
        OsStr::new("--fqbn"),
        OsStr::new(fqbn),
        sketch.as_os_str(),
    ];
    let outcome = run_cli(CLI_BINARY, "compile", &args, config.cli_timeout);
    Ok(outcome_payload("compile", config.cli_timeout, outcome))
}

/// Handle `upload`: `arduino-cli upload -p <port> --fqbn <fqbn> <sketch>`.
///
/// A successful upload programs the attached board — that side effect is
/// the point of the operation.
pub fn upload(config: &GatewayConfig, params: Value) -> HandlerResult<Value> {
    let params: UploadParams = parse_params(params)?;
    let sketch = validate::sketch_path(&params.sketch, config)?;
    let fqbn = validate::fqbn(&params.fqbn)?;
    let port = validate::port(&params.port)?;

    info!(sketch = %sketch.display(), fqbn, port, "upload requested");

    let args = [
        OsStr::new("upload"),
        OsStr::new("-p"),
        OsStr::new(port),
        OsStr::new("--fqbn"),
        OsStr::new(fqbn),
        sketch.as_os_str(),
    ];
    let outcome = run_cli(CLI_BINARY, "upload", &args, config.cli_timeout);
    Ok(outcome_payload("upload", config.cli_timeout, outcome))
}

/// Map an outcome to the method payload. Tool failure is a legitimate
/// result the caller must handle, so it lives inside the success envelope
/// as `success: false`, not as a protocol-level error.
fn outcome_payload(op: &str, timeout: Duration, outcome: CliOutcome) -> Value {
    match outcome {
        CliOutcome::Completed {
            exit_code,
            stdout,
            stderr,
        } => json!({
            "success": exit_code == 0,
            "stdout": stdout,
            "stderr": stderr,
        }),
        CliOutcome::TimedOut => {
            warn!(op, "arduino-cli invocation timed out");
            json!({
                "success": false,
                "error": format!("{op} timed out after {}s", timeout.as_secs()),
            })
        }
        CliOutcome::SpawnFailed(reason) => {
            warn!(op, reason, "arduino-cli invocation failed to start");
            json!({ "success": false, "error": reason })
        }
    }
}

/// Run `binary args..` with piped output and a wall-clock timeout.
///
/// Output pipes are drained on background threads so a chatty child can
/// never fill a pipe buffer and stall the poll loop.
fn run_cli(binary: &str, op: &str, args: &[&OsStr], timeout: Duration) -> CliOutcome {
    let resolved = match which::which(binary) {
        Ok(path) => path,
        Err(e) => {
            return CliOutcome::SpawnFailed(format!("{binary} not found on PATH: {e}"));
        }
    };

    let mut child = match Command::new(&resolved)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            return CliOutcome::SpawnFailed(format!(
                "failed to spawn {}: {e}",
                resolved.display()
            ));
        }
    };

    let stdout_drain = child.stdout.take().map(drain);
    let stderr_drain = child.stderr.take().map(drain);

    let start = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                // Killing the child closes its pipes, so the drains finish.
                join_drain(stdout_drain);
                join_drain(stderr_drain);
                return CliOutcome::TimedOut;
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                join_drain(stdout_drain);
                join_drain(stderr_drain);
                return CliOutcome::SpawnFailed(format!("failed to poll {op}: {e}"));
            }
        }
    };

    CliOutcome::Completed {
        exit_code: status.code().unwrap_or(-1),
        stdout: join_drain(stdout_drain),
        stderr: join_drain(stderr_drain),
    }
}

fn drain(mut pipe: impl std::io::Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = std::io::Read::read_to_end(&mut pipe, &mut buf);
        buf
    })
}

fn join_drain(handle: Option<std::thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}
