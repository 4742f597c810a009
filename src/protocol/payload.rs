//! Payload shapes exchanged across the bridge
//!
//! Wire field names are fixed by the protocol (`reqId`, `shouldExit`,
//! `responseText`, ...) and are independent of the Rust field names.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::action::Action;
use super::null_as_default;
use crate::core::error::{BridgeError, Result};

/// Request id carried by the logic kick-off envelope
pub const LOGIC_REQUEST_ID: &str = "-1";

/// HTTP methods the relay will perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(BridgeError::InvalidMethod(s.to_string())),
        }
    }
}

fn default_method() -> String {
    HttpMethod::Get.as_str().to_string()
}

/// Message emitted by the script runtime towards the host
///
/// Used both for outbound HTTP asks and for terminal signals sent through
/// the request channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(rename = "reqId")]
    pub request_id: String,

    pub action: Action,

    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,

    #[serde(rename = "shouldExit", default, deserialize_with = "null_as_default")]
    pub should_exit: bool,

    #[serde(default, deserialize_with = "null_as_default")]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Kept as text so unsupported methods reach the relay's validation
    #[serde(default = "default_method", deserialize_with = "method_or_default")]
    pub method: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn method_or_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let method = Option::<String>::deserialize(deserializer)?;
    Ok(method.unwrap_or_else(default_method))
}

impl RequestPayload {
    /// Parse a raw message from the native callback surface
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| BridgeError::Parse(e.to_string()))
    }

    /// Build an outbound HTTP GET ask
    pub fn http_get(request_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            action: Action::HttpRequest,
            url: url.into(),
            should_exit: false,
            headers: HashMap::new(),
            result: None,
            method: default_method(),
            body: None,
        }
    }

    /// Validated HTTP method
    pub fn http_method(&self) -> Result<HttpMethod> {
        self.method.parse()
    }
}

/// Answer to a [`RequestPayload`], posted back into the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload {
    #[serde(rename = "reqId")]
    pub request_id: String,

    #[serde(rename = "responseText")]
    pub response_text: String,

    /// Transport failure description; the module's pending request rejects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponsePayload {
    pub fn ok(request_id: impl Into<String>, response_text: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            response_text: response_text.into(),
            error: None,
        }
    }

    pub fn failed(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            response_text: String::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Query payload: "run this logic with this argument"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebviewPayload {
    pub query: String,
    pub action: Action,
}

impl WebviewPayload {
    pub fn new(query: impl Into<String>, action: Action) -> Self {
        Self {
            query: query.into(),
            action,
        }
    }
}

/// Envelope posted into the runtime to kick off a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePayload {
    #[serde(rename = "reqId")]
    pub request_id: String,
    pub action: Action,
    pub payload: WebviewPayload,
}

impl BasePayload {
    pub fn logic(payload: WebviewPayload) -> Self {
        Self {
            request_id: LOGIC_REQUEST_ID.to_string(),
            action: Action::Logic,
            payload,
        }
    }
}

/// Inner `{action, result}` pair produced by a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult<T> {
    pub action: Action,
    pub result: T,
}

/// Terminal decoded result: `{action, result: {action, result: T}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericPayload<T> {
    pub action: Action,
    pub result: ActionResult<T>,
}

impl<T> GenericPayload<T> {
    /// Wrap a decoded module result as a `RESULT`-tagged payload
    pub fn result(query_action: Action, result: T) -> Self {
        Self {
            action: Action::Result,
            result: ActionResult {
                action: query_action,
                result,
            },
        }
    }

    /// The decoded value
    pub fn value(&self) -> &T {
        &self.result.result
    }

    pub fn into_value(self) -> T {
        self.result.result
    }
}
