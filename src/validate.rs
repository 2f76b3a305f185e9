//! Input validators — the security boundary between request text and
//! privileged operations.
//!
//! Every argument that reaches a subprocess argument vector or a serial
//! `open()` passes through one of these functions first. They are pure:
//! no side effects beyond a filesystem existence probe for sketch paths.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;
use crate::server::GatewayConfig;

/// Characters a sketch path may contain. Excludes every shell
/// metacharacter, whitespace, and null bytes.
static SAFE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w\-./]+$").expect("static pattern"));

/// `vendor:architecture:board`, each segment word characters only.
static FQBN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w+:\w+:\w+$").expect("static pattern"));

/// Windows `COM<N>` tokens and Unix device nodes under `/dev/tty*` or
/// `/dev/cu.*`. Anything else — in particular absolute paths outside
/// `/dev` — is rejected.
static PORT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(COM[0-9]+|/dev/tty[\w.\-]+|/dev/cu\.[\w.\-]+)$").expect("static pattern")
});

/// Absolute prefixes a sketch path may never resolve under, even with the
/// root-containment override set.
const DENIED_ROOTS: &[&str] = &["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin"];

/// Inclusive range of acceptable baud rates.
const BAUD_RANGE: std::ops::RangeInclusive<u32> = 300..=1_000_000;

/// Upper bound on caller-supplied timeouts, in seconds. Keeps every
/// accepted value safely convertible to a `Duration` and representable
/// as a deadline.
const MAX_TIMEOUT_SECS: f64 = 3600.0;

/// Validate a sketch path and resolve it to an absolute path.
///
/// Checks, in order:
/// 1. character allow-list (no shell metacharacters) — unconditional;
/// 2. no `..` segment — unconditional;
/// 3. the path exists: it is canonicalized, resolving symlinks, so the
///    remaining checks see the real location rather than a link sitting
///    inside the root;
/// 4. not under a denied system prefix — unconditional;
/// 5. inside `config.sketch_root` — skipped when
///    `config.allow_outside_root` is set. This is an intentional escape
///    hatch for development setups; it never bypasses checks 1–4.
///
/// Relative inputs resolve against the sketch root, so the default mode
/// needs no check-5 exemptions for the common case.
pub fn sketch_path(raw: &str, config: &GatewayConfig) -> Result<PathBuf, ValidationError> {
    if !SAFE_PATH_RE.is_match(raw) {
        return Err(ValidationError::UnsafePath {
            path: raw.to_owned(),
        });
    }
    if Path::new(raw)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ValidationError::PathTraversal {
            path: raw.to_owned(),
        });
    }

    let joined = if Path::new(raw).is_absolute() {
        PathBuf::from(raw)
    } else {
        config.sketch_root.join(raw)
    };

    let resolved = match joined.canonicalize() {
        Ok(path) => path,
        Err(_) => return Err(ValidationError::SketchNotFound { path: joined }),
    };

    for denied in DENIED_ROOTS {
        if resolved.starts_with(denied) {
            return Err(ValidationError::DeniedPrefix { path: resolved });
        }
    }

    if !config.allow_outside_root && !resolved.starts_with(&config.sketch_root) {
        return Err(ValidationError::OutsideRoot {
            path: resolved,
            root: config.sketch_root.clone(),
        });
    }

    Ok(resolved)
}

/// Validate a fully-qualified board name. Returns it unchanged.
pub fn fqbn(raw: &str) -> Result<&str, ValidationError> {
    if FQBN_RE.is_match(raw) {
        Ok(raw)
    } else {
        Err(ValidationError::InvalidFqbn {
            fqbn: raw.to_owned(),
        })
    }
}

/// Validate a serial port identifier. Returns it unchanged.
pub fn port(raw: &str) -> Result<&str, ValidationError> {
    if PORT_RE.is_match(raw) {
        Ok(raw)
    } else {
        Err(ValidationError::InvalidPort {
            port: raw.to_owned(),
        })
    }
}

/// Validate a baud rate against the safe range.
pub const fn baud(rate: u32) -> Result<u32, ValidationError> {
    if *BAUD_RANGE.start() <= rate && rate <= *BAUD_RANGE.end() {
        Ok(rate)
    } else {
        Err(ValidationError::BaudOutOfRange { baud: rate })
    }
}

/// Validate a timeout given in fractional seconds.
pub fn timeout_secs(timeout: f64) -> Result<f64, ValidationError> {
    if timeout.is_finite() && (0.0..=MAX_TIMEOUT_SECS).contains(&timeout) {
        Ok(timeout)
    } else {
        Err(ValidationError::InvalidTimeout { timeout })
    }
}

/// Validate an optional line-count limit (must be positive when present).
pub const fn line_count(lines: Option<u32>) -> Result<Option<u32>, ValidationError> {
    match lines {
        Some(0) => Err(ValidationError::InvalidLines),
        other => Ok(other),
    }
}
