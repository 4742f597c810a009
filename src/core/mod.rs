//! Core infrastructure
//!
//! This module provides:
//! - Configuration management
//! - Structured logging and the module log sink
//! - Error handling and type system

pub mod config;
pub mod error;
pub mod logging;

pub use config::Config;
pub use error::{BridgeError, ErrorContext, ErrorKind, Prerequisite, Result};
pub use logging::{Logger, ModuleLogger, TracingModuleLogger};
