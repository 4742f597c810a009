//! Result shapes produced by modules
//!
//! These types describe what a module hands back for each query action.
//! Module output is semi-trusted: optional fields may be missing or an
//! explicit `null`, and unknown fields are ignored.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::protocol::null_as_default;

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Module-relative URL used for follow-up queries
    pub url: String,

    /// Poster image URL
    pub img: String,

    pub title: String,

    /// Short badge text such as "HD" or "Dub"
    #[serde(default)]
    pub indicator_text: Option<String>,

    #[serde(default)]
    pub current_count: Option<u32>,

    #[serde(default)]
    pub total_count: Option<u32>,
}

/// Media metadata for a detail page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResult {
    pub title: String,

    #[serde(default)]
    pub img: Option<String>,

    #[serde(default)]
    pub banner: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub alt_titles: Vec<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub rating: Option<f64>,

    #[serde(default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub total_media_count: Option<u32>,

    #[serde(default)]
    pub primary_color: Option<String>,

    #[serde(default)]
    pub secondary_color: Option<String>,
}

/// A page (range) of episodes, as modules group long lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodePage {
    pub title: String,

    #[serde(default)]
    pub start_no: Option<f64>,

    #[serde(default)]
    pub end_no: Option<f64>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub episodes: Vec<Episode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub url: String,

    /// Episode number; fractional for recaps and specials
    pub number: f64,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub img: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub is_filler: bool,
}

/// A hosting server offering an episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoServer {
    pub name: String,
    pub url: String,

    #[serde(default)]
    pub server_type: Option<String>,
}

/// Stream container type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoKind {
    #[default]
    Hls,
    Mp4,
    Dash,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    pub url: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub quality: Option<String>,

    #[serde(default, rename = "type", deserialize_with = "null_as_default")]
    pub kind: VideoKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subtitle {
    pub file: String,
    pub label: String,

    #[serde(default)]
    pub kind: Option<String>,
}

/// Start/end offsets in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// Playable stream descriptor for one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    #[serde(default, deserialize_with = "null_as_default")]
    pub sources: Vec<VideoSource>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub subtitles: Vec<Subtitle>,

    /// Headers the player must send when fetching the stream
    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub intro: Option<TimeRange>,

    #[serde(default)]
    pub outro: Option<TimeRange>,
}

/// A user-facing toggle a module exposes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSetting {
    pub key: String,
    pub label: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub default_value: bool,
}
