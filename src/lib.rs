//! openai-responses - async client for the OpenAI Responses API
//!
//! Typed request building, buffered and streamed calls, and helpers for
//! output text, refusals, token cost, image inputs and structured output.
//!
//! ```no_run
//! use openai_responses::{Client, RequestOptions};
//!
//! # async fn run() -> openai_responses::Result<()> {
//! let client = Client::from_env()?;
//! let response = client
//!     .create("gpt-4o-mini", "Say hello", RequestOptions::default())
//!     .await?;
//! println!("{}", response.output_text());
//! # Ok(())
//! # }
//! ```

use serde::de::DeserializeOwned;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub mod api;
pub mod client;
pub mod config;
pub mod error;

pub use api::{
    create_message_with_images, encode_image_file, ContentPart, FunctionCall, ImageDetail,
    ImageInput, Input, InputItem, Message, MessageContent, OutputContent, OutputItem, Pricing,
    PricingTable, RequestOptions, Response, ResponseRequest, ResponseStatus, ResponseStream, Role,
    Schema, StreamAccumulator, StreamEvent, TokenUsage, Tool, ToolChoice, Usage,
};
use client::HttpClient;
pub use config::{ClientConfig, ConfigLoader};
pub use error::{Error, Result};

/// Env var read by [`init_tracing`]
pub const LOG_ENV: &str = "OPENAI_RESPONSES_LOG";

/// The Responses API client
pub struct Client {
    /// Resolved configuration
    config: ClientConfig,

    /// Built-in rates overlaid with configured ones
    pricing: PricingTable,

    /// HTTP client
    http_client: HttpClient,
}

/// A structured-output result
#[derive(Debug, Clone)]
pub struct Parsed<T> {
    /// The payload, deserialized into the schema's shape
    pub value: T,

    /// The response it came from
    pub response: Response,
}

impl Client {
    /// Create a client from the environment and default config files
    pub fn from_env() -> Result<Self> {
        let loader = ConfigLoader::new()?;
        Self::new(loader.into_config())
    }

    /// Create a client with a custom config path
    pub fn with_config_path(path: &str) -> Result<Self> {
        let loader = ConfigLoader::from_path(path)?;
        Self::new(loader.into_config())
    }

    /// Create a client from a config object
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http_client = HttpClient::new(&config)?;

        let mut pricing = PricingTable::builtin();
        pricing.merge(config.pricing.clone());

        debug!(base_url = %config.base_url, "Created Responses API client");

        Ok(Self {
            config,
            pricing,
            http_client,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Rates for a model, if known
    pub fn pricing_for(&self, model: &str) -> Option<&Pricing> {
        self.pricing.lookup(model)
    }

    /// Token usage of a response, costed with this client's pricing table
    pub fn token_usage(&self, response: &Response) -> TokenUsage {
        response.token_usage(self.pricing_for(&response.model))
    }

    /// Create a response and wait for the full result
    pub async fn create(
        &self,
        model: &str,
        input: impl Into<Input>,
        options: RequestOptions,
    ) -> Result<Response> {
        let mut request = ResponseRequest::new(model, input, options)?;
        request.options.stream = None;
        self.send(&request).await
    }

    /// Send a prepared request and wait for the full result
    pub async fn send(&self, request: &ResponseRequest) -> Result<Response> {
        let body = request.to_body()?;
        let url = self.config.endpoint("responses");

        info!(model = %request.model, url = %url, "Creating response");
        let response: Response = self.http_client.post_json(&url, &body).await?;
        debug!(
            id = %response.id,
            status = ?response.status,
            output_items = response.output.len(),
            "Response received"
        );

        Ok(response)
    }

    /// Create a response and stream its events as they arrive
    pub async fn stream(
        &self,
        model: &str,
        input: impl Into<Input>,
        options: RequestOptions,
    ) -> Result<ResponseStream> {
        let mut request = ResponseRequest::new(model, input, options)?;
        request.options.stream = Some(true);

        let body = request.to_body()?;
        let url = self.config.endpoint("responses");

        info!(model = %request.model, url = %url, "Opening response stream");
        let bytes = self.http_client.post_stream(&url, &body).await?;
        Ok(ResponseStream::from_bytes(bytes))
    }

    /// Create a response constrained to `schema` and deserialize it
    ///
    /// Fails with [`Error::Refusal`] when the model refuses, and with
    /// [`Error::SchemaMismatch`] when the payload does not fit the schema.
    pub async fn parse<T: DeserializeOwned>(
        &self,
        model: &str,
        input: impl Into<Input>,
        schema: &Schema,
        options: RequestOptions,
    ) -> Result<Parsed<T>> {
        let response = self
            .create(model, input, options.with_schema(schema))
            .await?;
        let value = parse_output(&response, schema)?;
        Ok(Parsed { value, response })
    }

    /// Fetch a stored response by id
    pub async fn retrieve(&self, response_id: &str) -> Result<Response> {
        let url = self.config.endpoint(&format!("responses/{}", response_id));
        debug!(id = %response_id, "Retrieving response");
        self.http_client.get_json(&url).await
    }

    /// Delete a stored response by id
    pub async fn delete(&self, response_id: &str) -> Result<()> {
        let url = self.config.endpoint(&format!("responses/{}", response_id));
        info!(id = %response_id, "Deleting response");
        self.http_client.delete(&url).await
    }
}

/// Validate a structured-output response against its schema and deserialize it
pub fn parse_output<T: DeserializeOwned>(response: &Response, schema: &Schema) -> Result<T> {
    if let Some(refusal) = response.refusal() {
        return Err(Error::Refusal(refusal.to_string()));
    }

    let text = response.output_text();
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|e| Error::SchemaMismatch {
            path: "$".to_string(),
            message: format!("output is not valid JSON: {}", e),
        })?;

    schema.validate(&value)?;

    serde_json::from_value(value).map_err(|e| Error::SchemaMismatch {
        path: "$".to_string(),
        message: e.to_string(),
    })
}

/// Install a fmt subscriber filtered by `OPENAI_RESPONSES_LOG` (default `info`)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
