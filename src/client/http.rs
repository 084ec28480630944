//! HTTP Client
//!
//! Async transport for the Responses API. Requests are sent exactly once:
//! calls can cost money and count against rate limits, so retrying is left
//! to the caller.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes>> + Send>>;

/// HTTP client bound to one API key and base URL
pub struct HttpClient {
    /// Inner reqwest client
    client: Client,

    /// Headers sent with every request, credential included
    headers: HeaderMap,

    /// Whole-request timeout for buffered calls
    timeout: Duration,
}

impl HttpClient {
    /// Create a new HTTP client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::Config(
                    "No API key configured. Set OPENAI_API_KEY or pass one explicitly".to_string(),
                )
            })?;

        if config.timeout_secs == 0 || config.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "timeout_secs and connect_timeout_secs must be at least 1".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose()))
            .map_err(|_| Error::Config("API key contains invalid header characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        if let Some(org) = &config.organization {
            headers.insert(
                HeaderName::from_static("openai-organization"),
                header_value(org, "organization")?,
            );
        }
        if let Some(project) = &config.project {
            headers.insert(
                HeaderName::from_static("openai-project"),
                header_value(project, "project")?,
            );
        }

        // Add extra headers
        for (key, value) in &config.headers {
            let name = HeaderName::try_from(key.as_str())
                .map_err(|e| Error::Config(format!("Invalid header name '{}': {}", key, e)))?;
            headers.insert(name, header_value(value, key)?);
        }

        // The timeout is whole-request, so streams only get the connect timeout
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            headers,
            timeout: config.timeout(),
        })
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T, R>(&self, url: &str, body: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let request = self
            .request(Method::POST, url)
            .timeout(self.timeout)
            .json(body);
        let response = self.send(request, url).await?;
        decode_json(response).await
    }

    /// GET a JSON resource
    pub async fn get_json<R: DeserializeOwned>(&self, url: &str) -> Result<R> {
        let request = self.request(Method::GET, url).timeout(self.timeout);
        let response = self.send(request, url).await?;
        decode_json(response).await
    }

    /// DELETE a resource, ignoring the body
    pub async fn delete(&self, url: &str) -> Result<()> {
        let request = self.request(Method::DELETE, url).timeout(self.timeout);
        self.send(request, url).await?;
        Ok(())
    }

    /// POST a JSON body and return the raw response body as a byte stream
    pub async fn post_stream<T>(&self, url: &str, body: &T) -> Result<ByteStream>
    where
        T: Serialize + ?Sized,
    {
        let request = self
            .request(Method::POST, url)
            .header(ACCEPT, "text/event-stream")
            .json(body);
        let response = self.send(request, url).await?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(Error::from));
        Ok(Box::pin(stream))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.headers.clone())
    }

    /// Send a request; non-2xx statuses become `Error::Api`
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response> {
        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Request failed before a response arrived");
            Error::from(e)
        })?;

        let status = response.status();
        debug!(
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Received response headers"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!(url = %url, error = %e, "Failed to read error response body");
                String::new()
            }
        };
        let err = Error::from_status(status.as_u16(), &body);
        warn!(url = %url, status = status.as_u16(), error = %err, "API returned an error status");
        Err(err)
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Config(format!("Invalid {} header value: {}", what, e)))
}

async fn decode_json<R: DeserializeOwned>(response: Response) -> Result<R> {
    let body = response.text().await?;
    serde_json::from_str(&body)
        .map_err(|e| Error::decode(format!("Failed to parse response: {}", e), &body))
}
