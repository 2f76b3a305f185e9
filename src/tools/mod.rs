//! Method router — the fixed registry of gateway operations.
//!
//! Each method is a function taking JSON params and returning the
//! method-specific `data` payload. The router owns the read-only registry
//! and the startup configuration, and dispatches by name for the server
//! loop. Adding a method is an edit to [`MethodRouter::dispatch`] and
//! [`MethodRouter::methods`], not a type-hierarchy change.

pub mod cli;
pub mod ports;
pub mod serial;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::{HandlerError, HandlerResult};
use crate::server::GatewayConfig;

/// Router dispatching gateway method calls to implementations.
pub struct MethodRouter {
    config: GatewayConfig,
}

impl MethodRouter {
    /// Create a router over the given startup configuration.
    pub const fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// Names of all registered methods.
    pub const fn methods() -> &'static [&'static str] {
        &["list_ports", "compile", "upload", "serial_send", "read_serial"]
    }

    /// Dispatch a method call. Returns `None` for an unregistered name.
    pub fn dispatch(&self, method: &str, params: Value) -> Option<HandlerResult<Value>> {
        debug!(method, "dispatching method call");

        let outcome = match method {
            "list_ports" => ports::list(&params),
            "compile" => cli::compile(&self.config, params),
            "upload" => cli::upload(&self.config, params),
            "serial_send" => serial::send(params),
            "read_serial" => serial::read(params),
            _ => return None,
        };
        Some(outcome)
    }
}

/// Deserialize method params, mapping failures (missing required fields,
/// wrong types, non-integer numbers) to `InvalidParams`.
fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, HandlerError> {
    serde_json::from_value(params)
        .map_err(|e| HandlerError::InvalidParams(format!("invalid parameters: {e}")))
}
