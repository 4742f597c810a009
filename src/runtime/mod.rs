//! Sandboxed script runtime
//!
//! Provides:
//! - The deno_core ops forming the native callback surface
//! - Bootstrap code per format version
//! - The runtime adapter hosting one module page at a time

pub mod adapter;
pub mod bootstrap;
pub mod ops;

pub use adapter::ScriptRuntime;
pub use bootstrap::{common_code, BootstrapSource};
pub use ops::{BridgeMessage, Capabilities};
