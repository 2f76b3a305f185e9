//! `serial_send` / `read_serial` — line-oriented serial exchange.
//!
//! The port handle is scoped to one call: it is opened from validated
//! arguments, used, and dropped on every exit path (RAII), so an error or
//! timeout mid-read still closes the port. Whether the OS grants two
//! concurrent opens of the same port is left to the underlying driver —
//! this module does not arbitrate it.
//!
//! Decoding is permissive: bytes that are not valid UTF-8 become U+FFFD
//! instead of failing the call, because serial noise must never crash a
//! request.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use anyhow::Context as _;

use crate::error::HandlerResult;
use crate::validate;

use super::parse_params;

/// Timeout for one read attempt. Short so the loops stay responsive to
/// the overall deadline.
const PER_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Sleep between empty read attempts.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const fn default_baud() -> u32 {
    115_200
}

const fn default_timeout() -> f64 {
    2.0
}

#[derive(Debug, Deserialize)]
pub struct SendParams {
    pub port: String,
    #[serde(default = "default_baud")]
    pub baudrate: u32,
    pub message: String,
    /// Response deadline in fractional seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    pub port: String,
    #[serde(default = "default_baud")]
    pub baudrate: u32,
    /// Overall time budget in fractional seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    /// Stop after this many lines. When unset, only the budget governs.
    #[serde(default)]
    pub lines: Option<u32>,
}

/// Handle `serial_send`: write one line, read one response line.
pub fn send(params: Value) -> HandlerResult<Value> {
    let params: SendParams = parse_params(params)?;
    let port = validate::port(&params.port)?;
    let baud = validate::baud(params.baudrate)?;
    let timeout = validate::timeout_secs(params.timeout)?;

    info!(port, baud, "serial_send requested");

    match send_one(port, baud, &params.message, Duration::from_secs_f64(timeout)) {
        Ok(response) => Ok(json!({ "success": true, "response": response })),
        // Serial I/O faults are execution outcomes, reported in-payload.
        Err(e) => Ok(json!({ "success": false, "error": format!("{e:#}") })),
    }
}

/// Handle `read_serial`: collect lines until a count or the budget runs out.
pub fn read(params: Value) -> HandlerResult<Value> {
    let params: ReadParams = parse_params(params)?;
    let port = validate::port(&params.port)?;
    let baud = validate::baud(params.baudrate)?;
    let timeout = validate::timeout_secs(params.timeout)?;
    let max_lines = validate::line_count(params.lines)?;

    info!(port, baud, timeout, ?max_lines, "read_serial requested");

    match read_many(port, baud, Duration::from_secs_f64(timeout), max_lines) {
        Ok(lines) => Ok(json!({ "success": true, "lines": lines })),
        Err(e) => Ok(json!({ "success": false, "error": format!("{e:#}") })),
    }
}

/// Write `message` plus a newline, flush, and read one line bounded by
/// `budget`. Returns the trimmed line, possibly empty if nothing arrived.
fn send_one(port: &str, baud: u32, message: &str, budget: Duration) -> anyhow::Result<String> {
    // The open timeout also bounds writes on some platforms, so the write
    // phase gets the full call budget; the read loop then switches to
    // short slices to stay responsive to the deadline.
    let mut handle = serialport::new(port, baud)
        .timeout(budget.max(PER_READ_TIMEOUT))
        .open()
        .with_context(|| format!("failed to open {port}"))?;

    write_line(&mut handle, message).context("serial write failed")?;

    handle
        .set_timeout(PER_READ_TIMEOUT)
        .context("failed to set read timeout")?;
    let deadline = Instant::now() + budget;
    read_line_deadline(&mut handle, deadline).context("serial read failed")
}

/// Write `message` terminated by a newline and flush it out.
fn write_line(writer: &mut impl Write, message: &str) -> io::Result<()> {
    writer.write_all(message.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

/// Collect lines from the port until `max_lines` (if set) or `budget`.
fn read_many(
    port: &str,
    baud: u32,
    budget: Duration,
    max_lines: Option<u32>,
) -> anyhow::Result<Vec<String>> {
    let mut handle = serialport::new(port, baud)
        .timeout(PER_READ_TIMEOUT)
        .open()
        .with_context(|| format!("failed to open {port}"))?;

    collect_lines(&mut handle, budget, max_lines).context("serial read failed")
}

/// Read one line (or whatever arrived by `deadline`), lossily decoded and
/// whitespace-trimmed.
///
/// Zero-byte reads and `TimedOut`/`WouldBlock`/`Interrupted` errors mean
/// "no data yet"; any other I/O error is propagated.
fn read_line_deadline(reader: &mut impl Read, deadline: Instant) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                buf.push(byte[0]);
                if Instant::now() >= deadline {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut
                        | io::ErrorKind::WouldBlock
                        | io::ErrorKind::Interrupted
                ) =>
            {
                if Instant::now() >= deadline {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_owned())
}

/// Accumulate non-empty lines until `max_lines` is reached or `budget`
/// elapses, whichever triggers first. With no `max_lines`, the budget
/// alone governs.
fn collect_lines(
    reader: &mut impl Read,
    budget: Duration,
    max_lines: Option<u32>,
) -> io::Result<Vec<String>> {
    let deadline = Instant::now() + budget;
    let mut lines = Vec::new();
    loop {
        // Short read slices keep the loop responsive to the deadline.
        let slice = std::cmp::min(Instant::now() + PER_READ_TIMEOUT, deadline);
        let line = read_line_deadline(reader, slice)?;
        if !line.is_empty() {
            lines.push(line);
        }
        if let Some(max) = max_lines {
            if lines.len() >= max as usize {
                break;
            }
        }
        if Instant::now() >= deadline {
            break;
        }
    }
    Ok(lines)
}
