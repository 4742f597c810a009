//! Bridge lifecycle state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::{BridgeError, Prerequisite, Result};
use crate::dispatcher::TerminalKind;

/// Bridge state enumeration
///
/// Tracks where a bridge instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// No script context exists yet
    Uninitialized,

    /// Script context and callback are in place, ready for a load
    Initialized,

    /// A query is running
    Loaded,

    /// The last query ended with a terminal outcome
    Terminated(TerminalOutcome),

    /// The script context was torn down
    Destroyed,
}

/// Terminal outcome recorded in [`BridgeState::Terminated`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Result,
    Error,
}

impl From<TerminalKind> for TerminalOutcome {
    fn from(kind: TerminalKind) -> Self {
        match kind {
            TerminalKind::Result => TerminalOutcome::Result,
            TerminalKind::Error => TerminalOutcome::Error,
        }
    }
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Uninitialized => write!(f, "uninitialized"),
            BridgeState::Initialized => write!(f, "initialized"),
            BridgeState::Loaded => write!(f, "loaded"),
            BridgeState::Terminated(TerminalOutcome::Result) => write!(f, "terminated (result)"),
            BridgeState::Terminated(TerminalOutcome::Error) => write!(f, "terminated (error)"),
            BridgeState::Destroyed => write!(f, "destroyed"),
        }
    }
}

impl BridgeState {
    /// Whether a script context exists in this state
    pub fn has_runtime(self) -> bool {
        matches!(
            self,
            BridgeState::Initialized | BridgeState::Loaded | BridgeState::Terminated(_)
        )
    }

    /// Check that a new query may be loaded
    pub fn check_load(self) -> Result<()> {
        match self {
            BridgeState::Initialized | BridgeState::Terminated(_) => Ok(()),
            BridgeState::Loaded => Err(BridgeError::QueryInFlight),
            BridgeState::Uninitialized | BridgeState::Destroyed => {
                Err(BridgeError::illegal_state("load", Prerequisite::Runtime))
            }
        }
    }

    /// Check that the runtime may be destroyed
    pub fn check_destroy(self) -> Result<()> {
        if self.has_runtime() {
            Ok(())
        } else {
            Err(BridgeError::illegal_state("destroy", Prerequisite::Runtime))
        }
    }

    /// State after a terminal outcome; only a running query can terminate
    pub fn terminate(self, kind: TerminalKind) -> Self {
        match self {
            BridgeState::Loaded => BridgeState::Terminated(kind.into()),
            other => other,
        }
    }
}
