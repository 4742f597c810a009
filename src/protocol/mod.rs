//! Action protocol
//!
//! The shared vocabulary of message kinds and payload shapes exchanged
//! between the host and the script engine.

pub mod action;
pub mod payload;

pub use action::{Action, FormatVersion};
pub use payload::{
    ActionResult, BasePayload, GenericPayload, HttpMethod, RequestPayload, ResponsePayload,
    WebviewPayload, LOGIC_REQUEST_ID,
};

use serde::{Deserialize, Deserializer};

/// Treat an explicit JSON `null` the same as an absent field
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
