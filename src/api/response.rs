//! Response Types
//!
//! The typed result of `POST /responses`, with read-only accessors. Fields
//! this crate does not model are kept in `extra` so nothing is lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::pricing::Pricing;

/// Lifecycle status of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Completed,
    Failed,
    InProgress,
    Incomplete,
    Cancelled,
    Queued,
    #[serde(other)]
    Unknown,
}

/// A response from the Responses API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: String,

    #[serde(default)]
    pub object: String,

    /// Unix timestamp (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResponseStatus>,

    #[serde(default)]
    pub model: String,

    /// Output items, in the order the API returned them
    #[serde(default)]
    pub output: Vec<OutputItem>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incomplete_details: Option<Value>,

    /// Fields not modelled above
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An item in `Response.output`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Message(OutputMessage),
    FunctionCall(FunctionCall),
    Reasoning(ReasoningItem),

    /// Item types this crate does not know, kept verbatim
    #[serde(untagged)]
    Other(Value),
}

/// An assistant message in the output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    #[serde(default)]
    pub id: String,

    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default)]
    pub content: Vec<OutputContent>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_role() -> String {
    "assistant".to_string()
}

/// A content part of an output message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputContent {
    OutputText {
        text: String,
        #[serde(default)]
        annotations: Vec<Value>,
    },
    Refusal {
        refusal: String,
    },
    #[serde(untagged)]
    Other(Value),
}

/// A function call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub call_id: String,

    pub name: String,

    /// Arguments as a JSON string
    #[serde(default)]
    pub arguments: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FunctionCall {
    /// Parse the argument string as JSON
    pub fn parsed_arguments(&self) -> crate::error::Result<Value> {
        serde_json::from_str(&self.arguments).map_err(|e| {
            crate::error::Error::decode(
                format!("Invalid arguments for '{}': {}", self.name, e),
                &self.arguments,
            )
        })
    }
}

/// A reasoning item (summary only; the raw chain is not exposed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub summary: Vec<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,

    pub output_tokens: u64,

    #[serde(default)]
    pub total_tokens: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens_details: Option<InputTokensDetails>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens_details: Option<OutputTokensDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTokensDetails {
    #[serde(default)]
    pub reasoning_tokens: u64,
}

/// Token counts with an optional cost estimate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
    pub reasoning_tokens: u64,

    /// Estimated cost in USD, when pricing was supplied
    pub cost: Option<f64>,
}

/// Error payload returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub message: String,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ApiErrorBody {
    /// Parse `{"error": {...}}` or a bare error object
    pub fn parse(body: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Envelope {
            error: ApiErrorBody,
        }

        serde_json::from_str::<Envelope>(body)
            .map(|e| e.error)
            .or_else(|_| serde_json::from_str::<ApiErrorBody>(body))
            .ok()
    }
}

impl Response {
    /// Concatenated text of every `output_text` part, in order
    pub fn output_text(&self) -> String {
        self.message_contents()
            .filter_map(|c| match c {
                OutputContent::OutputText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// True iff any output message contains a refusal
    pub fn has_refusal(&self) -> bool {
        self.message_contents()
            .any(|c| matches!(c, OutputContent::Refusal { .. }))
    }

    /// The first refusal message, if any
    pub fn refusal(&self) -> Option<&str> {
        self.message_contents().find_map(|c| match c {
            OutputContent::Refusal { refusal } => Some(refusal.as_str()),
            _ => None,
        })
    }

    /// Function calls requested by the model, in output order
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                OutputItem::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Token counts, with a cost estimate when pricing is given
    pub fn token_usage(&self, pricing: Option<&Pricing>) -> TokenUsage {
        let usage = self.usage.clone().unwrap_or_default();
        let cached_tokens = usage
            .input_tokens_details
            .as_ref()
            .map(|d| d.cached_tokens)
            .unwrap_or(0);
        let reasoning_tokens = usage
            .output_tokens_details
            .as_ref()
            .map(|d| d.reasoning_tokens)
            .unwrap_or(0);
        let total_tokens = if usage.total_tokens == 0 {
            usage.input_tokens + usage.output_tokens
        } else {
            usage.total_tokens
        };

        TokenUsage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens,
            cached_tokens,
            reasoning_tokens,
            cost: pricing.map(|p| p.cost(usage.input_tokens, cached_tokens, usage.output_tokens)),
        }
    }

    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
    }

    pub fn is_complete(&self) -> bool {
        self.status == Some(ResponseStatus::Completed)
    }

    fn message_contents(&self) -> impl Iterator<Item = &OutputContent> {
        self.output.iter().flat_map(|item| match item {
            OutputItem::Message(message) => message.content.as_slice(),
            _ => &[][..],
        })
    }
}
