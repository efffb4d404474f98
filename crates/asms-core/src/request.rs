//! Internal request and response model shared by every protocol adapter.
//!
//! Adapters decode their wire contract into a [`Request`], hand it to the
//! gateway, and encode the returned [`Response`] back out. The shape is
//! deliberately dynamic: `input` and `data` carry JSON maps, and typed
//! decoding happens at the unit boundary against per-unit schemas.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of unit a request addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Command,
    Query,
    Resource,
    Workflow,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Query => "query",
            Self::Resource => "resource",
            Self::Workflow => "workflow",
        }
    }
}

impl std::str::FromStr for RequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "command" => Ok(Self::Command),
            "query" => Ok(Self::Query),
            "resource" => Ok(Self::Resource),
            "workflow" => Ok(Self::Workflow),
            other => Err(format!("unknown request type: {}", other)),
        }
    }
}

/// Per-request options supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Effective execution timeout in milliseconds. Zero or absent means
    /// the gateway default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, rename = "async")]
    pub run_async: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// A dispatch request addressed to a named unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "type")]
    pub request_type: RequestType,

    /// Dotted unit name (`model.list`) or resource URI (`asms://...`).
    pub unit: String,

    #[serde(default)]
    pub input: Map<String, Value>,

    #[serde(default)]
    pub options: RequestOptions,
}

impl Request {
    pub fn new(request_type: RequestType, unit: impl Into<String>) -> Self {
        Self {
            request_type,
            unit: unit.into(),
            input: Map::new(),
            options: RequestOptions::default(),
        }
    }

    pub fn with_input(mut self, input: Map<String, Value>) -> Self {
        self.input = input;
        self
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// Correlation and timing metadata attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub duration_ms: u64,
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
}

/// The gateway's answer to a [`Request`]. Exactly one of `data` or `error`
/// is populated; `meta` is always filled in by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<crate::error::ErrorInfo>,

    #[serde(default)]
    pub meta: ResponseMeta,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            meta: ResponseMeta::default(),
        }
    }

    pub fn failure(error: crate::error::ErrorInfo) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            meta: ResponseMeta::default(),
        }
    }
}
