//! Yod Core - request execution engine for the Yod memory API
//!
//! Turns a logical operation (method, path, payload) into one or more HTTP
//! attempts governed by timeout, retry and backoff policy, and reports every
//! failure as one typed error.
//!
//! # Main Components
//!
//! - **Configuration**: [`ClientConfig`], built once and never mutated
//! - **Credential resolution**: api-key > bearer-token > dev user-id
//! - **Error classification**: [`ErrorClassification`] over status codes and transport failures
//! - **Execution**: [`HttpClient`] (async) and [`BlockingHttpClient`] over one retry state machine
//!
//! # Example
//!
//! ```no_run
//! use serde_json::Value;
//! use yod_core::{ClientConfig, HttpClient, RequestSpec, Result};
//!
//! async fn example() -> Result<()> {
//!     let config = ClientConfig::builder().api_key("sk-yod-...").build()?;
//!     let client = HttpClient::new(config)?;
//!     let memories: Value = client
//!         .execute_json(RequestSpec::get("/memories").query("limit", Some(20)))
//!         .await?;
//!     println!("{}", memories);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod http;

// Re-export main types for convenience
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
pub use http::{
    BackoffPolicy, BlockingHttpClient, CallOptions, Credential, ErrorClassification, HttpClient,
    HttpError, RequestSpec,
};

pub use tokio_util::sync::CancellationToken;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
