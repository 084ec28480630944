//! Configuration Module
//!
//! Client settings and the loader that resolves them.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{ApiKey, ClientConfig, DEFAULT_BASE_URL};
