//! Result decoders
//!
//! One decoder per query action. Each turns the raw JSON text a module
//! sends on completion (`{"action": ..., "result": ...}`) into a typed
//! [`GenericPayload`]. Failures are returned as [`BridgeError::Decode`] so
//! the dispatcher can convert them into an `ERROR` terminal.

pub mod models;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::core::error::{BridgeError, Result};
use crate::protocol::{Action, GenericPayload};

pub use models::{
    Episode, EpisodePage, InfoResult, SearchResult, Subtitle, SwitchSetting, TimeRange,
    VideoKind, VideoResult, VideoServer, VideoSource,
};

/// A decoded module result, one variant per query action
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModuleResult {
    Search(GenericPayload<Vec<SearchResult>>),
    Info(GenericPayload<InfoResult>),
    EpisodeList(GenericPayload<Vec<EpisodePage>>),
    Servers(GenericPayload<Vec<VideoServer>>),
    Video(GenericPayload<VideoResult>),
    SwitchConfig(GenericPayload<Vec<SwitchSetting>>),
    Logic(GenericPayload<Value>),
}

impl ModuleResult {
    /// The query action this result answers
    pub fn query_action(&self) -> &Action {
        match self {
            ModuleResult::Search(p) => &p.result.action,
            ModuleResult::Info(p) => &p.result.action,
            ModuleResult::EpisodeList(p) => &p.result.action,
            ModuleResult::Servers(p) => &p.result.action,
            ModuleResult::Video(p) => &p.result.action,
            ModuleResult::SwitchConfig(p) => &p.result.action,
            ModuleResult::Logic(p) => &p.result.action,
        }
    }
}

/// Raw envelope as sent by the bootstrap's `sendResult`
#[derive(Debug, Deserialize)]
struct RawResult {
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    result: Value,
}

/// Decoder selected for one query action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultDecoder {
    action: Action,
}

impl ResultDecoder {
    /// Select the decoder for a query action
    ///
    /// Reserved and unknown actions have no decoder.
    pub fn for_action(action: Action) -> Result<Self> {
        if !action.is_query() {
            return Err(BridgeError::InvalidAction(action.to_string()));
        }
        Ok(Self { action })
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    /// Decode the raw result text
    pub fn decode(&self, raw: &str) -> Result<ModuleResult> {
        let envelope: RawResult = serde_json::from_str(raw).map_err(|e| self.error(e))?;

        if let Some(sent) = &envelope.action {
            if sent != &self.action {
                warn!(
                    expected = %self.action,
                    received = %sent,
                    "Module tagged its result with a different action"
                );
            }
        }

        let value = envelope.result;
        let result = match self.action {
            Action::Search => ModuleResult::Search(self.typed(value)?),
            Action::GetInfo => ModuleResult::Info(self.typed(value)?),
            Action::GetEpisodeList => ModuleResult::EpisodeList(self.typed(value)?),
            Action::GetServer => ModuleResult::Servers(self.typed(value)?),
            Action::GetVideo => ModuleResult::Video(self.typed(value)?),
            Action::GetSwitchConfig => ModuleResult::SwitchConfig(self.typed(value)?),
            Action::Logic => ModuleResult::Logic(GenericPayload::result(Action::Logic, value)),
            // for_action only admits query actions
            _ => return Err(BridgeError::InvalidAction(self.action.to_string())),
        };

        Ok(result)
    }

    fn typed<T: DeserializeOwned>(&self, value: Value) -> Result<GenericPayload<T>> {
        let decoded = serde_json::from_value(value).map_err(|e| self.error(e))?;
        Ok(GenericPayload::result(self.action.clone(), decoded))
    }

    fn error(&self, err: serde_json::Error) -> BridgeError {
        BridgeError::Decode {
            action: self.action.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_decoder() -> ResultDecoder {
        ResultDecoder::for_action(Action::Search).unwrap()
    }

    #[test]
    fn test_no_decoder_for_reserved_actions() {
        assert!(ResultDecoder::for_action(Action::Result).is_err());
        assert!(ResultDecoder::for_action(Action::HttpRequest).is_err());
        assert!(ResultDecoder::for_action(Action::Unknown("X".into())).is_err());
    }

    #[test]
    fn test_decode_search_with_nulls() {
        let raw = r#"{
            "action": "SEARCH",
            "result": [{
                "url": "a", "img": "b", "title": "Batman",
                "indicatorText": null, "currentCount": null, "totalCount": null
            }]
        }"#;

        match search_decoder().decode(raw).unwrap() {
            ModuleResult::Search(payload) => {
                assert_eq!(payload.action, Action::Result);
                assert_eq!(payload.result.action, Action::Search);
                let hits = payload.value();
                assert_eq!(hits.len(), 1);
                assert_eq!(hits[0].title, "Batman");
                assert!(hits[0].indicator_text.is_none());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_info_missing_optional() {
        let decoder = ResultDecoder::for_action(Action::GetInfo).unwrap();
        let raw = r#"{"action":"GET_INFO","result":{"title":"Batman"}}"#;

        match decoder.decode(raw).unwrap() {
            ModuleResult::Info(payload) => {
                assert!(payload.value().alt_titles.is_empty());
                assert!(payload.value().description.is_none());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_wrong_type_is_decode_error() {
        let raw = r#"{"action":"SEARCH","result":[{"url":"a","img":"b","title":42}]}"#;
        let err = search_decoder().decode(raw).unwrap_err();

        assert!(matches!(err, BridgeError::Decode { action: Action::Search, .. }));
        assert!(err.to_string().contains("SEARCH"));
    }

    #[test]
    fn test_decode_malformed_text_is_decode_error() {
        let err = search_decoder().decode("[[[").unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[test]
    fn test_decode_logic_keeps_raw_value() {
        let decoder = ResultDecoder::for_action(Action::Logic).unwrap();
        let raw = r#"{"action":"LOGIC","result":{"anything":[1,2,3]}}"#;

        match decoder.decode(raw).unwrap() {
            ModuleResult::Logic(payload) => {
                assert_eq!(payload.value()["anything"][2], 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_decode_episode_pages() {
        let decoder = ResultDecoder::for_action(Action::GetEpisodeList).unwrap();
        let raw = r#"{"action":"GET_EPISODE_LIST","result":[
            {"title":"1-2","startNo":1,"endNo":2,"episodes":[
                {"url":"/1","number":1},{"url":"/2","number":2,"isFiller":true}
            ]},
            {"title":"empty","episodes":null}
        ]}"#;

        let result = decoder.decode(raw).unwrap();
        assert_eq!(result.query_action(), &Action::GetEpisodeList);
        match result {
            ModuleResult::EpisodeList(payload) => {
                let pages = payload.into_value();
                assert_eq!(pages.len(), 2);
                assert!(pages[0].episodes[1].is_filler);
                assert!(pages[1].episodes.is_empty());
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
