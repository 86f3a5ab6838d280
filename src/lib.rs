//! Skiff, a tool-calling agent runtime.
//!
//! Drives a multi-turn conversation with an LLM completion endpoint and lets
//! the model invoke a fixed set of side-effecting tools (shell, file
//! read/write/edit, directory listing, web fetch, web search). Every tool
//! invocation passes through a uniform response envelope and is subject to
//! path confinement and outbound network policy.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use skiff::agent::runner::{Policy, Runner};
//! use skiff::agent::EnvelopeDispatcher;
//! use skiff::provider::OpenAiCompatibleProvider;
//! use skiff::tools::default_registry;
//! use skiff::tools::bash::CommandPolicy;
//! use skiff::tools::network_policy::NetworkPolicy;
//! use skiff::tools::web_search::WebSearchConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(default_registry(
//!     CommandPolicy::from_lists("", "")?,
//!     NetworkPolicy::new(false),
//!     WebSearchConfig::default(),
//! ));
//! let provider = Arc::new(OpenAiCompatibleProvider::new(
//!     "my-model",
//!     "sk-key",
//!     "https://openrouter.ai/api/v1",
//! ));
//! let dispatcher = Arc::new(EnvelopeDispatcher::new(
//!     registry.clone(),
//!     "/work".into(),
//!     "/work".into(),
//!     std::time::Duration::from_secs(30),
//! ));
//! let runner = Runner::new(provider, "my-model", registry.definitions(), dispatcher, Policy::default());
//! let mut history = Vec::new();
//! let cancel = CancellationToken::new();
//! let answer = runner.run_prompt(&cancel, &mut history, "list the files here", "corr-1").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod tools;
pub mod types;
