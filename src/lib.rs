//! Bujji: a conversational agent backend
//!
//! A query runs through a typed workflow graph: tools are resolved, a model
//! is bound, trimmed conversation memory is loaded, an optional
//! self-discussion pass plans the answer, and the model alternates with the
//! tool node until it answers. New messages are persisted at the end while
//! the caller receives an ordered stream of chat events.
//!
//! # Quick Start
//!
//! ```no_run
//! use bujji::prelude::*;
//! use futures::StreamExt;
//!
//! # async fn example() -> bujji::error::Result<()> {
//! let config = BujjiConfig::from_env();
//! let service = ChatService::from_config(&config)?;
//! let mut events = service.run(RunRequest::new("What is 2+2?", "user-1"));
//! while let Some(event) = events.next().await {
//!     if let ChatEvent::FinalResponse { text, .. } = event {
//!         print!("{text}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod prelude;
pub mod provider;
pub mod stream;
pub mod tools;
pub mod types;
pub mod util;
pub mod vector;
pub mod workflow;

#[cfg(feature = "cli")]
pub mod cli;
