//! pytest-discord: post pytest session results to a Discord channel.
//!
//! This crate turns a finished pytest session into a compact Discord
//! notification: categorized result counts, an outcome-coloured summary
//! embed, optional per-file breakdowns and truncated failure tracebacks,
//! and an optional full Markdown report attached as a file. Delivery is
//! best-effort by design: a misconfigured or unreachable webhook never
//! affects the test run itself.
//!
//! # Architecture
//!
//! The main components are:
//!
//! - **Options**: three-tier setting resolution (CLI flag, environment
//!   variable, persisted defaults file)
//! - **Session**: the report store and timing for one finished run
//! - **Stats**: count extraction and outcome classification
//! - **Render**: the size-bounded message (embeds, budgets, attachment)
//! - **Webhook**: one-shot delivery to the Discord endpoint
//! - **Hook**: the session-end trigger wiring it all together
//!
//! # Example
//!
//! ```no_run
//! use pytest_discord::config::Defaults;
//! use pytest_discord::hook::{DiscordNotifier, SessionObserver};
//! use pytest_discord::junit;
//! use pytest_discord::options::{DiscordArgs, OptResolver};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let summary = junit::read_junit_file(std::path::Path::new("junit.xml"))?;
//! let session = summary.into_session(0);
//!
//! let resolver = OptResolver::new(DiscordArgs::default(), Defaults::default());
//! DiscordNotifier::new(resolver).on_session_end(&session).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod hook;
pub mod junit;
pub mod markdown;
pub mod options;
pub mod render;
pub mod runner;
pub mod session;
pub mod stats;
pub mod webhook;

// Re-export commonly used types
pub use config::{Defaults, load_defaults};
pub use hook::{DiscordNotifier, SessionObserver};
pub use options::{DiscordArgs, OptResolver};
pub use render::{RenderedMessage, render};
pub use session::{Category, ReportStore, Session, TestReport};
pub use stats::{Outcome, ResultCounts, classify, extract};
