//! Client module
//!
//! This module provides client functionality to drive the reminder service,
//! either over HTTP or against an in-process `Core`.

mod core;
mod http;
mod trait_def;

// Re-export the trait and types
pub use self::core::CoreClient;
pub use http::{ClientConfig, ClientError, HttpClientImpl};
pub use trait_def::Client;
