//! Gateway server — stdio transport, JSON-RPC 2.0 request objects,
//! newline-delimited.
//!
//! Reads one request per line from stdin, dispatches to the method router,
//! and writes one response per line to stdout, flushed immediately.
//! Requests are handled strictly sequentially: a request that blocks on a
//! child process or a serial read blocks the loop until it completes, and
//! responses are emitted in request order.
//!
//! Stderr carries diagnostics only; stdout carries nothing but protocol
//! payloads.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::tools::MethodRouter;

/// Maximum size of a single request line (10 MiB). Longer lines are
/// consumed, discarded, and reported as a parse error.
const MAX_LINE_BYTES: usize = 10 * 1024 * 1024;

/// Protocol version tag carried in every success envelope.
pub const PROTOCOL_VERSION: &str = "1.0";

// JSON-RPC 2.0 error codes.
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// Response object, exactly one of `result` / `error` set.
#[derive(Debug, Serialize)]
pub struct Response {
    /// Echo of the request id, or `null` when it could not be determined.
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ResultEnvelope>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Success payload wrapper.
#[derive(Debug, Serialize)]
pub struct ResultEnvelope {
    pub version: &'static str,
    pub data: Value,
}

/// Error object.
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Build a success response wrapping `data` in the versioned envelope.
pub fn success_response(id: Value, data: Value) -> Response {
    Response {
        id,
        result: Some(ResultEnvelope {
            version: PROTOCOL_VERSION,
            data,
        }),
        error: None,
    }
}

/// Build an error response.
pub fn error_response(id: Value, code: i64, message: &str) -> Response {
    Response {
        id,
        result: None,
        error: Some(RpcError {
            code,
            message: message.to_owned(),
            data: None,
        }),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Gateway configuration, read from the environment once at startup and
/// passed by reference from there on. Immutable for the life of the
/// process, so validation behavior is deterministic within a run.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory sketch paths must resolve under.
    pub sketch_root: PathBuf,
    /// Escape hatch: skip the sketch-root containment check. Character-set,
    /// traversal, and denied-prefix checks still apply.
    pub allow_outside_root: bool,
    /// Wall-clock budget for one arduino-cli invocation.
    pub cli_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            sketch_root: PathBuf::from("sketches"),
            allow_outside_root: false,
            cli_timeout: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Read configuration from the process environment.
    ///
    /// `SKETCH_ROOT` names the allowed root (default `./sketches`, resolved
    /// against the working directory); `SKETCH_ROOT_UNRESTRICTED=1` sets
    /// the containment escape hatch.
    pub fn from_env() -> Result<Self> {
        let raw_root =
            std::env::var("SKETCH_ROOT").unwrap_or_else(|_| "sketches".to_owned());
        let raw_root = PathBuf::from(raw_root);
        let sketch_root = if raw_root.is_absolute() {
            raw_root
        } else {
            std::env::current_dir()
                .context("failed to resolve working directory for SKETCH_ROOT")?
                .join(raw_root)
        };
        // Resolve symlinks when the root exists so containment checks
        // compare like with like.
        let sketch_root = sketch_root.canonicalize().unwrap_or(sketch_root);

        let allow_outside_root = std::env::var("SKETCH_ROOT_UNRESTRICTED")
            .is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

        Ok(Self {
            sketch_root,
            allow_outside_root,
            ..Self::default()
        })
    }
}

// ---------------------------------------------------------------------------
// Dispatch loop
// ---------------------------------------------------------------------------

/// Run the gateway on stdin/stdout.
///
/// Exits cleanly when stdin closes.
///
/// # Errors
///
/// Returns an error only if stdin/stdout I/O fails fatally. Malformed
/// requests and handler failures are reported on the protocol and never
/// abort the loop.
pub fn run_gateway(config: GatewayConfig) -> Result<()> {
    info!(
        sketch_root = %config.sketch_root.display(),
        allow_outside_root = config.allow_outside_root,
        "sketchport gateway starting"
    );

    let router = MethodRouter::new(config);
    let stdin = std::io::stdin();
    let mut reader = std::io::BufReader::new(stdin.lock());
    let mut stdout = std::io::stdout().lock();
    let mut line_buf = Vec::new();

    loop {
        line_buf.clear();
        match read_line_limited(&mut reader, &mut line_buf, MAX_LINE_BYTES)
            .context("failed to read from stdin")?
        {
            LineRead::Eof => {
                info!("stdin closed, shutting down");
                break;
            }
            LineRead::Oversized => {
                warn!("request line exceeds {MAX_LINE_BYTES} bytes, discarded");
                let resp = error_response(
                    Value::Null,
                    PARSE_ERROR,
                    &format!("parse error: line exceeds maximum size ({MAX_LINE_BYTES} bytes)"),
                );
                write_response(&mut stdout, &resp)?;
                continue;
            }
            LineRead::Line(n) => debug!(bytes = n, "read request line"),
        }

        // Lossy conversion: a line with invalid UTF-8 becomes invalid JSON
        // and is reported as a parse error rather than aborting the loop.
        let line = String::from_utf8_lossy(&line_buf);
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        debug!(raw = trimmed, "received request");

        if let Some(resp) = handle_line(&router, trimmed) {
            write_response(&mut stdout, &resp)?;
        }
    }

    info!("sketchport gateway stopped");
    Ok(())
}

/// Handle one raw request line, returning the response to emit (or `None`
/// for a handled notification).
pub fn handle_line(router: &MethodRouter, line: &str) -> Option<Response> {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparsable request line");
            return Some(error_response(
                Value::Null,
                PARSE_ERROR,
                &format!("parse error: {e}"),
            ));
        }
    };

    let Some(object) = value.as_object() else {
        warn!("request is not a JSON object");
        return Some(error_response(
            Value::Null,
            INVALID_REQUEST,
            "invalid request: expected a JSON object",
        ));
    };

    let id = object.get("id").cloned().unwrap_or(Value::Null);
    // An absent or null id marks a notification: the request is handled
    // but no response is expected.
    let is_notification = id.is_null();

    let Some(method) = object.get("method").and_then(Value::as_str) else {
        warn!("request has no usable method field");
        return Some(error_response(
            id,
            METHOD_NOT_FOUND,
            "method not found: request carries no method name",
        ));
    };

    let params = object
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

    let Some(outcome) = router.dispatch(method, params) else {
        warn!(method, "unknown method");
        return Some(error_response(
            id,
            METHOD_NOT_FOUND,
            &format!(
                "method not found: {method} (known methods: {})",
                MethodRouter::methods().join(", ")
            ),
        ));
    };

    let response = match outcome {
        Ok(data) => success_response(id, data),
        Err(crate::error::HandlerError::InvalidParams(reason)) => {
            warn!(method, reason, "invalid params");
            error_response(id, INVALID_PARAMS, &format!("invalid params: {reason}"))
        }
        Err(crate::error::HandlerError::Internal(e)) => {
            error!(method, error = %e, "handler failed unexpectedly");
            error_response(id, INTERNAL_ERROR, &format!("internal error: {e}"))
        }
    };

    if is_notification {
        debug!(method, "notification handled (no response)");
        return None;
    }
    Some(response)
}

/// Write a response as a single line, flushed so callers see it promptly.
fn write_response(out: &mut impl Write, resp: &Response) -> Result<()> {
    let json = serde_json::to_string(resp).context("failed to serialize response")?;
    debug!(response = json, "sending response");
    out.write_all(json.as_bytes())
        .context("failed to write to stdout")?;
    out.write_all(b"\n")
        .context("failed to write newline to stdout")?;
    out.flush().context("failed to flush stdout")?;
    Ok(())
}

/// Result of one limited line read.
enum LineRead {
    /// Stream closed with no pending data.
    Eof,
    /// A complete line of this many bytes is in the buffer.
    Line(usize),
    /// The line exceeded the limit; it was consumed and discarded.
    Oversized,
}

/// Read a line from `reader` into `buf`, stopping at newline or `max_bytes`.
///
/// An over-long line is consumed up to and including its newline so the
/// stream stays framed, and reported as [`LineRead::Oversized`].
fn read_line_limited(
    reader: &mut impl BufRead,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<LineRead> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().context("stdin fill_buf failed")?;
        if available.is_empty() {
            return Ok(if total == 0 {
                LineRead::Eof
            } else {
                LineRead::Line(total)
            });
        }
        let (consumed, found_newline) = match available.iter().position(|&b| b == b'\n') {
            Some(pos) => (pos + 1, true),
            None => (available.len(), false),
        };
        if total + consumed > max_bytes {
            reader.consume(consumed);
            if !found_newline {
                // Keep consuming until the newline or EOF.
                loop {
                    let rest = reader.fill_buf().context("stdin fill_buf failed")?;
                    if rest.is_empty() {
                        break;
                    }
                    match rest.iter().position(|&b| b == b'\n') {
                        Some(pos) => {
                            reader.consume(pos + 1);
                            break;
                        }
                        None => {
                            let len = rest.len();
                            reader.consume(len);
                        }
                    }
                }
            }
            return Ok(LineRead::Oversized);
        }
        buf.extend_from_slice(&available[..consumed]);
        total += consumed;
        reader.consume(consumed);
        if found_newline {
            return Ok(LineRead::Line(total));
        }
    }
}
