//! Parley — streaming response engine for multi-assistant chat.
//!
//! Consumes a model backend's raw frame stream, turns provider-specific
//! reasoning, tool-call and error frames into one client frame protocol,
//! accumulates a typed transcript, and runs per-assistant hooks that can
//! rewrite the request, switch assistant or delegate the turn.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use parley::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let config = ParleyConfig::load()?;
//! let assistants = AssistantRegistry::new();
//! assistants.insert(
//!     Assistant::builder()
//!         .id("helper")
//!         .name("Helper")
//!         .connector("openai")
//!         .prompts(vec![Prompt::system("You are helpful")])
//!         .build(),
//! );
//!
//! let backend = Arc::new(OpenAiBackend::from_config(&config)?);
//! let engine = Engine::new(config, assistants, backend);
//! let sink: FrameSink = Arc::new(|frame| println!("{frame:?}"));
//!
//! let ctx = TurnContext::new("session", "chat", "helper");
//! let result = engine
//!     .execute(ctx, Message::user("2+2?"), Options::new(), sink, CancellationToken::new())
//!     .await;
//! println!("{:?}", result.status);
//! # Ok(())
//! # }
//! ```

pub mod assistant;
pub mod attachment;
pub mod config;
pub mod content;
pub mod error;
pub mod hooks;
pub mod prelude;
pub mod provider;
pub mod storage;
pub mod stream;
pub mod turn;
pub mod types;
