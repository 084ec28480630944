//! Client Module
//!
//! HTTP transport for the Responses API.

pub mod http;

pub use http::{ByteStream, HttpClient};
