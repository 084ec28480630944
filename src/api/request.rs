//! Request Types
//!
//! Typed inputs for `POST /responses`: messages, content parts, tools and
//! request options.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::api::schema::Schema;
use crate::error::{Error, Result};

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Developer,
}

/// Image detail level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

/// A content part in an input message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content
    InputText { text: String },

    /// Image content, as a remote URL or a base64 data URL
    InputImage {
        image_url: String,
        #[serde(default)]
        detail: ImageDetail,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::InputText { text: text.into() }
    }

    pub fn image(image_url: impl Into<String>, detail: ImageDetail) -> Self {
        ContentPart::InputImage {
            image_url: image_url.into(),
            detail,
        }
    }
}

/// Message content - a plain string or an ordered list of parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenate the text of this content, skipping images
    pub fn to_string_content(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::InputText { text } => Some(text.as_str()),
                    ContentPart::InputImage { .. } => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(value: Vec<ContentPart>) -> Self {
        MessageContent::Parts(value)
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn developer(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Developer, content)
    }
}

/// One entry of a list input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputItem {
    /// A role/content message
    Message(Message),

    /// A function call the model made on a previous turn
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },

    /// The result of running a function call locally
    FunctionCallOutput { call_id: String, output: String },
}

impl From<Message> for InputItem {
    fn from(value: Message) -> Self {
        InputItem::Message(value)
    }
}

/// Request input - the API accepts a string or an array of items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Items(Vec<InputItem>),
}

impl Input {
    /// View the input as messages; bare text is a single user message
    pub fn messages(&self) -> Vec<Message> {
        match self {
            Input::Text(text) => vec![Message::user(text.as_str())],
            Input::Items(items) => items
                .iter()
                .filter_map(|item| match item {
                    InputItem::Message(m) => Some(m.clone()),
                    _ => None,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Input::Text(text) => text.is_empty(),
            Input::Items(items) => items.is_empty(),
        }
    }
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        Input::Text(value.to_string())
    }
}

impl From<String> for Input {
    fn from(value: String) -> Self {
        Input::Text(value)
    }
}

impl From<Message> for Input {
    fn from(value: Message) -> Self {
        Input::Items(vec![InputItem::Message(value)])
    }
}

impl From<Vec<Message>> for Input {
    fn from(value: Vec<Message>) -> Self {
        Input::Items(value.into_iter().map(InputItem::Message).collect())
    }
}

impl From<Vec<InputItem>> for Input {
    fn from(value: Vec<InputItem>) -> Self {
        Input::Items(value)
    }
}

/// Tool declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Tool {
    /// A function the model may call
    Function {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        parameters: Value,
        #[serde(default)]
        strict: bool,
    },

    /// Built-in tools (web search, file search, ...) passed through as-is
    #[serde(untagged)]
    Raw(Value),
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Tool::Function {
            name: name.into(),
            description: Some(description.into()),
            parameters,
            strict: false,
        }
    }
}

/// Tool choice configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// "none", "auto" or "required"
    Mode(String),

    /// Force a specific function
    Function { r#type: String, name: String },
}

impl ToolChoice {
    pub fn function(name: impl Into<String>) -> Self {
        ToolChoice::Function {
            r#type: "function".to_string(),
            name: name.into(),
        }
    }
}

/// Output format for text responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextFormat {
    Text,
    JsonObject,
    JsonSchema {
        name: String,
        schema: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
        #[serde(default)]
        strict: bool,
    },
}

/// Text output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextConfig {
    pub format: TextFormat,
}

/// Reasoning configuration for reasoning models
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Reasoning {
    /// "minimal", "low", "medium" or "high"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,

    /// "auto", "concise" or "detailed"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Optional request parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// System/developer instructions inserted ahead of the input
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Nucleus sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Upper bound on generated tokens, reasoning included
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Tool declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,

    /// Response format, including structured output schemas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextConfig>,

    /// Continue from a stored response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,

    /// Whether the API should store the response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,

    /// End-user identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Set by the client for streamed calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,

    /// Unknown keys, forwarded unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    /// Constrain output to a JSON schema
    pub fn with_schema(mut self, schema: &Schema) -> Self {
        self.text = Some(TextConfig {
            format: schema.text_format(),
        });
        self
    }

    pub fn with_previous_response_id(mut self, id: impl Into<String>) -> Self {
        self.previous_response_id = Some(id.into());
        self
    }

    pub fn with_store(mut self, store: bool) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), Value::String(value.into()));
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning.get_or_insert_with(Reasoning::default).effort = Some(effort.into());
        self
    }

    /// Add a parameter this crate does not model yet
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// A complete request to `POST /responses`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRequest {
    pub model: String,
    pub input: Input,
    #[serde(flatten)]
    pub options: RequestOptions,
}

impl ResponseRequest {
    /// Build a request; the model must be non-empty
    pub fn new(
        model: impl Into<String>,
        input: impl Into<Input>,
        options: RequestOptions,
    ) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(Error::InvalidRequest("model must not be empty".to_string()));
        }

        Ok(Self {
            model,
            input: input.into(),
            options,
        })
    }

    /// Wire document for this request
    ///
    /// Extra option keys override named ones, except `model`, `input` and
    /// `stream`, which belong to the call.
    pub fn to_body(&self) -> Result<Value> {
        let mut named = self.options.clone();
        let extra = std::mem::take(&mut named.extra);

        let mut body = serde_json::to_value(ResponseRequest {
            model: self.model.clone(),
            input: self.input.clone(),
            options: named,
        })?;

        if let Some(obj) = body.as_object_mut() {
            for (key, value) in extra {
                if matches!(key.as_str(), "model" | "input" | "stream") {
                    tracing::warn!(key = %key, "Ignoring reserved key in extra request options");
                    continue;
                }
                obj.insert(key, value);
            }
        }

        Ok(body)
    }
}
