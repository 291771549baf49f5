//! Error reporting and logging facade for the metrics indexer.
//!
//! # Setup
//!
//! To enable logging, invoke the [`init`] function with [`logging`](LogConfig) and
//! [`sentry`](SentryConfig) configuration. The configuration implements `serde` traits, so it can
//! be obtained from configuration files.
//!
//! ```
//! use indexer_log::{LogConfig, SentryConfig};
//!
//! let log_config = LogConfig {
//!     enable_backtraces: true,
//!     ..LogConfig::default()
//! };
//!
//! let sentry_config = SentryConfig {
//!     enabled: true,
//!     ..SentryConfig::default()
//! };
//!
//! indexer_log::init(&log_config, &sentry_config);
//! ```
//!
//! # Logging
//!
//! The basic use of this crate is through the five logging macros: [`error!`], [`warn!`],
//! [`info!`], [`debug!`] and [`trace!`] where `error!` represents the highest-priority log
//! messages and `trace!` the lowest. The log messages are filtered by configuring the log level to
//! exclude messages with a lower priority.
//!
//! ## Conventions
//!
//! Log messages should start lowercase and end without punctuation. Prefer short and precise log
//! messages over verbose text. Choose the log level according to these rules:
//!
//! - [`error!`] for bugs and invalid behavior. This will also be reported to Sentry.
//! - [`warn!`] for undesirable behavior.
//! - [`info!`] for messages relevant to the average user.
//! - [`debug!`] for messages usually relevant to debugging.
//! - [`trace!`] for full auxiliary information.
//!
//! Attach structured context as fields rather than formatting it into the message:
//!
//! ```
//! indexer_log::error!(string_type = "tags", "dropped message");
//! ```

#![warn(missing_docs)]

mod setup;
pub use setup::*;

// Expose the minimal tracing facade.
#[doc(inline)]
pub use tracing::{debug, error, info, trace, warn};

// Expose the minimal error reporting API.
#[doc(inline)]
pub use sentry::{capture_error, configure_scope, with_scope, Hub};
