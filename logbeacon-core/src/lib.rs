//! # logbeacon-core
//!
//! Client-side log and error reporting pipeline.
//!
//! This library provides:
//! - Event building with host environment metadata
//! - An in-memory delivery queue drained by one background loop
//! - Host platform adapters (native process, mini-program, browser)
//! - Configuration management
//! - Logging infrastructure for the reporter's own diagnostics
//!
//! ## Architecture
//!
//! ```text
//! caller ─▶ Reporter ─▶ EventBuilder ─▶ DeliveryQueue ─▶ DeliveryLoop ─▶ Platform::send ─▶ endpoint
//! ```
//!
//! Logging never blocks and never fails from the caller's point of view.
//! Delivery is best-effort: a batch whose upload fails is dropped, and the
//! loop backs off for a fixed interval before the next attempt.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use logbeacon_core::platform::{FileStore, HttpTransport, NativePlatform};
//! use logbeacon_core::{Config, Reporter, ReporterConfig};
//!
//! # async fn run() -> logbeacon_core::Result<()> {
//! let config = ReporterConfig::new("https://logs.example.com/track", "my-app", "1.0.0");
//! let transport = HttpTransport::new(Duration::from_secs(30))?;
//! let store = Arc::new(FileStore::new(Config::device_store_path()));
//! let reporter = Reporter::new(config, Arc::new(NativePlatform::new(transport, store)))?;
//! reporter.start();
//!
//! reporter.set_user_context("user-42");
//! reporter.error("payment failed", Some("checkout"));
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use builder::{EventBuilder, ReporterContext};
pub use config::{Config, ReporterConfig};
pub use delivery::{CycleOutcome, DeliveryLoop, DeliveryStats, LoopState};
pub use error::{Error, Result};
pub use event::{ErrorReport, Event, Level, Message};
pub use platform::Platform;
pub use queue::DeliveryQueue;
pub use reporter::Reporter;

// Public modules
pub mod builder;
pub mod config;
pub mod delivery;
pub mod error;
pub mod event;
pub mod logging;
pub mod platform;
pub mod queue;
pub mod reporter;
