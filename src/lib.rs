//! `sketchport` — JSON-RPC gateway for arduino-cli and serial-port access.
//!
//! Accepts JSON-RPC 2.0 requests over stdin (one per line), validates and
//! sanitizes every parameter, runs one of a small fixed set of external
//! operations, and writes the result envelope to stdout. The crate is the
//! security boundary between an untrusted structured-text caller and the
//! local filesystem, the `arduino-cli` child process, and hardware-attached
//! serial lines.
//!
//! # Methods
//!
//! - `list_ports` — enumerate attached serial-capable devices
//! - `compile` — `arduino-cli compile` for a validated sketch/FQBN
//! - `upload` — `arduino-cli upload` to a validated port
//! - `serial_send` — write one line, read one response line
//! - `read_serial` — collect lines until a count or a time budget
//!
//! # Architecture
//!
//! ```text
//! stdin (JSON-RPC) → server loop → MethodRouter → validate → tool impls
//!                                                     ↓
//!                                    arduino-cli | serialport | enumeration
//! stdout (JSON-RPC) ←──────────────────────────────────┘
//! ```

pub mod error;
pub mod server;
pub mod tools;
pub mod validate;

pub use error::{HandlerError, HandlerResult, ValidationError};
pub use server::{GatewayConfig, run_gateway};
