//! Inference client for the LLM benchmarking harness.
//!
//! The crate separates a single inference attempt ([`InferenceClient`]) from
//! the retry discipline wrapped around it ([`RetryingClient`]):
//!
//! - [`MessagesClient`] speaks the Anthropic Messages HTTP API via `reqwest`.
//! - [`RetryPolicy`] is a pure state machine deciding whether and how long to
//!   wait after a failed attempt.
//! - [`RetryingClient`] drives attempts with a per-attempt timeout and
//!   reports how many attempts a call consumed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use llm_bench_client::{ClientConfig, InferenceRequest, MessagesClient, RetryingClient};
//! use llm_bench_core::ExperimentConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = MessagesClient::new(
//!     ClientConfig::builder("https://api.anthropic.com")
//!         .api_key("sk-...")
//!         .build()?,
//! )?;
//!
//! let config = ExperimentConfig::new("claude-sonnet-4-20250514");
//! let client = RetryingClient::for_config(Arc::new(transport), &config);
//! let request = InferenceRequest::from_config(&config, None, "Hello".to_string());
//! let completion = client.invoke(&request).await?;
//! println!("{} ({} attempts)", completion.response.text, completion.attempts);
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod retry;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use capabilities::supports_thinking;
pub use client::{
    Completion, InferenceClient, InferenceFailure, InferenceRequest, InferenceResponse,
    RetryingClient, ThinkingConfig,
};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{InferenceError, InferenceResult};
pub use http::MessagesClient;
pub use retry::{AttemptOutcome, JitterStrategy, RetryDecision, RetryPolicy};
