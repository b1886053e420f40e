//! Reporter facade: the entry point application code logs through
//!
//! Logging calls build the event on the spot and push it onto the queue;
//! they never wait on the network and never fail. Delivery happens on the
//! background loop started by [`Reporter::start`]. Calls made before the
//! loop starts, or during its start-up delay, are queued like any other.

use std::sync::{Arc, PoisonError, RwLock};

use crate::builder::{EventBuilder, ReporterContext};
use crate::config::ReporterConfig;
use crate::delivery::{DeliveryLoop, DeliveryStats, LoopState};
use crate::error::Result;
use crate::event::{coerce_to_text, Level, Message, CUSTOM_KEY_SLOTS};
use crate::platform::Platform;
use crate::queue::DeliveryQueue;

struct ReporterInner {
    config: ReporterConfig,
    builder: EventBuilder,
    queue: DeliveryQueue,
    delivery: Arc<DeliveryLoop>,
    context: RwLock<ReporterContext>,
}

/// Cheaply cloneable handle; clones share one queue and one delivery loop
#[derive(Clone)]
pub struct Reporter {
    inner: Arc<ReporterInner>,
}

impl Reporter {
    /// Validate `config`, initialize the platform and wire up the pipeline.
    ///
    /// The delivery loop is not running until [`Reporter::start`] is called.
    pub fn new(config: ReporterConfig, platform: Arc<dyn Platform>) -> Result<Self> {
        config.validate()?;
        platform.initialize();

        let queue = DeliveryQueue::new();
        let builder = EventBuilder::new(Arc::clone(&platform), &config);
        let delivery = Arc::new(DeliveryLoop::new(queue.clone(), platform, &config));

        Ok(Self {
            inner: Arc::new(ReporterInner {
                config,
                builder,
                queue,
                delivery,
                context: RwLock::new(ReporterContext::default()),
            }),
        })
    }

    /// Spawn the delivery loop on the current tokio runtime.
    ///
    /// Returns `false` if it was already started, or if there is no runtime
    /// to spawn on (logged; events keep queueing until a later call succeeds).
    pub fn start(&self) -> bool {
        self.inner.delivery.start().is_some()
    }

    pub fn error(&self, message: impl Into<Message>, description: Option<&str>) {
        self.log(Level::Error, message, description);
    }

    pub fn info(&self, message: impl Into<Message>, description: Option<&str>) {
        self.log(Level::Info, message, description);
    }

    pub fn warn(&self, message: impl Into<Message>, description: Option<&str>) {
        self.log(Level::Warn, message, description);
    }

    /// Report a caller-named event, e.g. `custom_event("purchase", ...)`
    pub fn custom_event(&self, name: &str, message: impl Into<Message>, description: Option<&str>) {
        self.log(Level::Custom(name.to_string()), message, description);
    }

    /// Build and enqueue an event.
    ///
    /// Returns whether the event was queued; a build failure drops it and
    /// is only logged.
    pub fn log(&self, level: Level, message: impl Into<Message>, description: Option<&str>) -> bool {
        let message = message.into();
        let context = self.context();

        match self.inner.builder.build(&message, description, level, &context) {
            Ok(event) => {
                self.inner.queue.push(event);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping event that failed to build");
                false
            }
        }
    }

    /// Set the user context stamped on subsequent events.
    ///
    /// Objects are stored as JSON text, other values as plain text.
    pub fn set_user_context(&self, value: impl Into<serde_json::Value>) {
        match coerce_to_text(&value.into()) {
            Ok(user) => self.update_context(|context| context.user = user),
            Err(e) => tracing::warn!(error = %e, "Ignoring user context"),
        }
    }

    /// Set custom key slot `index` (1..=6) for subsequent events.
    ///
    /// An out-of-range index is ignored with a warning.
    pub fn set_custom_key(&self, index: usize, value: impl Into<serde_json::Value>) {
        if index == 0 || index > CUSTOM_KEY_SLOTS {
            tracing::warn!(
                index,
                max = CUSTOM_KEY_SLOTS,
                "Ignoring custom key with out-of-range index"
            );
            return;
        }

        let text = match coerce_to_text(&value.into()) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(index, error = %e, "Ignoring custom key value");
                return;
            }
        };

        self.update_context(|context| {
            if let Err(e) = context.custom_keys.set(index, text) {
                tracing::warn!(index, error = %e, "Ignoring custom key");
            }
        });
    }

    /// Snapshot of the current user context and custom keys
    pub fn context(&self) -> ReporterContext {
        self.inner
            .context
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> DeliveryStats {
        self.inner.delivery.stats()
    }

    pub fn loop_state(&self) -> LoopState {
        self.inner.delivery.state()
    }

    /// Number of events waiting in the queue
    pub fn pending_count(&self) -> usize {
        self.inner.queue.len()
    }

    /// True when nothing is queued and no upload is in flight
    pub fn is_idle(&self) -> bool {
        self.inner.queue.is_empty() && !self.inner.delivery.is_uploading()
    }

    fn update_context(&self, f: impl FnOnce(&mut ReporterContext)) {
        f(&mut self
            .inner
            .context
            .write()
            .unwrap_or_else(PoisonError::into_inner));
    }
}
