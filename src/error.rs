//! Error types for the sketchport crate.

use std::path::PathBuf;

/// Rejections produced by the input validators.
///
/// Every variant carries enough context for a caller-facing message; the
/// dispatcher reports these as `InvalidParams` and never starts the
/// privileged operation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Path contains shell metacharacters or other disallowed bytes.
    #[error("sketch path contains disallowed characters: {path}")]
    UnsafePath { path: String },

    /// Path contains a `..` segment.
    #[error("sketch path contains a parent-directory segment: {path}")]
    PathTraversal { path: String },

    /// Resolved path sits under a denied system prefix (never overridable).
    #[error("sketch path is under a denied system prefix: {path}")]
    DeniedPrefix { path: PathBuf },

    /// Resolved path escapes the configured sketch root.
    #[error("sketch path {path} is not inside the allowed root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Sketch path does not exist on the filesystem.
    #[error("sketch does not exist: {path}")]
    SketchNotFound { path: PathBuf },

    /// Board identifier is not `vendor:architecture:board`.
    #[error("invalid FQBN (expected vendor:architecture:board): {fqbn}")]
    InvalidFqbn { fqbn: String },

    /// Port is neither a COM token nor an allowed /dev node.
    #[error("invalid serial port: {port}")]
    InvalidPort { port: String },

    /// Baud rate outside the safe range.
    #[error("baudrate {baud} out of range (300..=1000000)")]
    BaudOutOfRange { baud: u32 },

    /// Serial timeout is not a number of seconds in the supported range.
    #[error("invalid timeout: {timeout} (expected seconds in 0..=3600)")]
    InvalidTimeout { timeout: f64 },

    /// `lines` must be a positive integer when present.
    #[error("lines must be a positive integer")]
    InvalidLines,
}

/// Failure of a method handler, split the way the response envelope needs it.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Bad or missing parameters — maps to JSON-RPC `-32602`.
    #[error("{0}")]
    InvalidParams(String),

    /// Anything unanticipated — maps to JSON-RPC `-32603`.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ValidationError> for HandlerError {
    fn from(err: ValidationError) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

/// Convenience result type for method handlers.
pub type HandlerResult<T> = Result<T, HandlerError>;
