//! Module Bridge Library
//!
//! Hosts untrusted media-scraping modules in a sandboxed script runtime,
//! relays the HTTP requests they ask for, and hands their results back as
//! typed data.

pub mod bridge;
pub mod core;
pub mod decoder;
pub mod dispatcher;
pub mod protocol;
pub mod relay;
pub mod runtime;

// Re-export commonly used types
pub use bridge::{Bridge, BridgeOptions, BridgeState};
pub use crate::core::{BridgeError, Config, ErrorKind, Logger};
pub use decoder::{ModuleResult, ResultDecoder};
pub use dispatcher::{BridgeOutcome, ErrorPayload};
pub use protocol::{Action, FormatVersion, WebviewPayload};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Result type alias for the library
pub type Result<T> = crate::core::error::Result<T>;
