//! Action vocabulary shared by host and script engine
//!
//! Every message crossing the bridge carries exactly one [`Action`]. Three
//! actions are reserved for the dispatcher (`HTTP_REQUEST`, `RESULT`,
//! `ERROR`); the rest name which module entry point a query runs.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Message kind tag
///
/// Unknown wire strings decode to [`Action::Unknown`] instead of failing
/// deserialization, so the dispatcher can still report a clean error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    HttpRequest,
    Result,
    Error,
    Logic,
    Search,
    GetInfo,
    GetEpisodeList,
    GetVideo,
    GetServer,
    GetSwitchConfig,
    Unknown(String),
}

impl Action {
    /// Wire name of this action
    pub fn as_str(&self) -> &str {
        match self {
            Action::HttpRequest => "HTTP_REQUEST",
            Action::Result => "RESULT",
            Action::Error => "ERROR",
            Action::Logic => "LOGIC",
            Action::Search => "SEARCH",
            Action::GetInfo => "GET_INFO",
            Action::GetEpisodeList => "GET_EPISODE_LIST",
            Action::GetVideo => "GET_VIDEO",
            Action::GetServer => "GET_SERVER",
            Action::GetSwitchConfig => "GET_SWITCH_CONFIG",
            Action::Unknown(s) => s,
        }
    }

    /// Whether the dispatcher routes this action itself
    pub fn is_reserved(&self) -> bool {
        matches!(self, Action::HttpRequest | Action::Result | Action::Error)
    }

    /// Whether this action names a module entry point
    pub fn is_query(&self) -> bool {
        !self.is_reserved() && !matches!(self, Action::Unknown(_))
    }

    /// Whether this action is a terminal signal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Action::Result | Action::Error)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let action = match s {
            "HTTP_REQUEST" => Action::HttpRequest,
            "RESULT" => Action::Result,
            "ERROR" => Action::Error,
            "LOGIC" => Action::Logic,
            "SEARCH" => Action::Search,
            "GET_INFO" => Action::GetInfo,
            "GET_EPISODE_LIST" => Action::GetEpisodeList,
            "GET_VIDEO" => Action::GetVideo,
            "GET_SERVER" => Action::GetServer,
            "GET_SWITCH_CONFIG" => Action::GetSwitchConfig,
            other => Action::Unknown(other.to_string()),
        };
        Ok(action)
    }
}

impl Serialize for Action {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.parse::<Action>() {
            Ok(action) => Ok(action),
            Err(never) => match never {},
        }
    }
}

/// Protocol revision a module declares compatibility with
///
/// Gates which bootstrap script and which query actions apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FormatVersion {
    V1,
    V2,
}

impl FormatVersion {
    pub const LATEST: FormatVersion = FormatVersion::V2;

    pub fn number(self) -> u8 {
        match self {
            FormatVersion::V1 => 1,
            FormatVersion::V2 => 2,
        }
    }

    /// Whether `action` may be sent as a query under this version
    pub fn supports(self, action: &Action) -> bool {
        match action {
            Action::Logic
            | Action::Search
            | Action::GetInfo
            | Action::GetEpisodeList
            | Action::GetVideo => true,
            Action::GetServer | Action::GetSwitchConfig => self >= FormatVersion::V2,
            _ => false,
        }
    }
}

impl Default for FormatVersion {
    fn default() -> Self {
        FormatVersion::LATEST
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number())
    }
}

impl TryFrom<u8> for FormatVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FormatVersion::V1),
            2 => Ok(FormatVersion::V2),
            other => Err(format!("unsupported format version: {}", other)),
        }
    }
}

impl From<FormatVersion> for u8 {
    fn from(version: FormatVersion) -> Self {
        version.number()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&Action::GetEpisodeList).unwrap(),
            "\"GET_EPISODE_LIST\""
        );
        let action: Action = serde_json::from_str("\"HTTP_REQUEST\"").unwrap();
        assert_eq!(action, Action::HttpRequest);
    }

    #[test]
    fn test_unknown_action_decodes() {
        let action: Action = serde_json::from_str("\"DANCE\"").unwrap();
        assert_eq!(action, Action::Unknown("DANCE".to_string()));
        assert!(!action.is_query());
        assert!(!action.is_reserved());
        assert_eq!(action.to_string(), "DANCE");
    }

    #[test]
    fn test_reserved_and_terminal() {
        assert!(Action::HttpRequest.is_reserved());
        assert!(!Action::HttpRequest.is_terminal());
        assert!(Action::Result.is_terminal());
        assert!(Action::Error.is_terminal());
        assert!(Action::Search.is_query());
    }

    #[test]
    fn test_format_version_gating() {
        assert!(FormatVersion::V1.supports(&Action::Search));
        assert!(!FormatVersion::V1.supports(&Action::GetServer));
        assert!(FormatVersion::V2.supports(&Action::GetSwitchConfig));
        assert!(!FormatVersion::V2.supports(&Action::Result));
    }

    #[test]
    fn test_format_version_from_number() {
        assert_eq!(FormatVersion::try_from(1).unwrap(), FormatVersion::V1);
        assert!(FormatVersion::try_from(7).is_err());
        let version: FormatVersion = serde_json::from_str("2").unwrap();
        assert_eq!(version, FormatVersion::V2);
    }
}
