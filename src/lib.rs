//! # vibium
//!
//! Browser automation for AI agents and humans, speaking WebDriver BiDi.
//!
//! The crate drives a chromedriver-managed browser over a BiDi WebSocket and
//! gates every mutating action behind actionability checks: an element must
//! be visible, stable, hit-testable, enabled (and editable, for typing)
//! before vibium will click or type into it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vibium::{actions, browser, BidiClient, WaitOptions, WsTransport};
//!
//! # #[tokio::main]
//! # async fn main() -> vibium::Result<()> {
//! let mut launched = browser::launch(browser::LaunchOptions::default()).await?;
//! let transport = WsTransport::connect(launched.websocket_url()).await?;
//! let client = BidiClient::new(Arc::new(transport));
//!
//! let context = actions::resolve_context(&client, None).await?;
//! actions::navigate(&client, &context, "https://example.com").await?;
//! actions::click(&client, &context, "a", WaitOptions::default()).await?;
//!
//! launched.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`transport`]: frame-oriented duplex channels (WebSocket and in-memory)
//! - [`bidi`]: the BiDi wire protocol and request/response client
//! - [`actionability`]: the DOM predicates gating actions
//! - [`wait`]: poll-until-ready with deadline and reason reporting
//! - [`actions`]: navigate, find, click, type, screenshot, evaluate
//! - [`browser`]: install, path discovery, and chromedriver launch
//!
//! The multi-client WebSocket proxy lives in the `vibium-proxy` crate; the
//! `vibium` binary in `vibium-cli`.

pub mod actionability;
pub mod actions;
pub mod bidi;
pub mod browser;
pub mod error;
pub mod transport;
pub mod wait;

pub use actionability::{Actionability, BoundingBox, Check, CLICK_CHECKS, TYPE_CHECKS};
pub use actions::{ElementInfo, NavigateResult};
pub use bidi::{Bidi, BidiClient};
pub use error::{Error, Result, TimeoutError};
pub use transport::{Transport, WsTransport};
pub use wait::WaitOptions;
