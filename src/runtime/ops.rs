//! Native callback surface exposed to the script engine
//!
//! The engine sees three synchronous ops. Each one only enqueues the raw
//! message for the dispatcher; nothing is parsed or awaited inside the op.

use deno_core::{op2, Extension, Op, OpState};
use std::borrow::Cow;
use tokio::sync::mpsc;
use tracing::warn;

/// Raw message emitted by a module through the native bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMessage {
    /// `sendHTTPRequest`: an HTTP ask or a signal routed through the request channel
    HttpRequest(String),
    /// `sendResult`: a terminal result envelope
    Result(String),
    /// `log`: a diagnostic line
    Log(String),
}

/// Capability object stored in the engine's `OpState`
#[derive(Debug, Clone)]
pub struct Capabilities {
    tx: mpsc::UnboundedSender<BridgeMessage>,
}

impl Capabilities {
    pub fn new(tx: mpsc::UnboundedSender<BridgeMessage>) -> Self {
        Self { tx }
    }

    fn emit(&self, message: BridgeMessage) {
        if self.tx.send(message).is_err() {
            warn!("Dispatcher is gone, dropping module message");
        }
    }
}

#[op2(fast)]
fn op_bridge_send_http_request(state: &mut OpState, #[string] raw: String) {
    state.borrow::<Capabilities>().emit(BridgeMessage::HttpRequest(raw));
}

#[op2(fast)]
fn op_bridge_send_result(state: &mut OpState, #[string] raw: String) {
    state.borrow::<Capabilities>().emit(BridgeMessage::Result(raw));
}

#[op2(fast)]
fn op_bridge_log(state: &mut OpState, #[string] message: String) {
    state.borrow::<Capabilities>().emit(BridgeMessage::Log(message));
}

/// Extension registering the bridge ops
pub fn bridge_extension() -> Extension {
    Extension {
        name: "module_bridge",
        ops: Cow::Borrowed(&[
            op_bridge_send_http_request::DECL,
            op_bridge_send_result::DECL,
            op_bridge_log::DECL,
        ]),
        ..Default::default()
    }
}
