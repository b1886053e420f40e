//! Host platform adapters
//!
//! A [`Platform`] hides everything that differs between host environments:
//! which metadata can be read, where the device identifier is persisted,
//! and how a batch reaches the network. The event builder and the delivery
//! loop only ever see this trait.
//!
//! Adapters shipped here:
//! - [`NativePlatform`]: a plain OS process
//! - [`MiniProgramPlatform`]: a mini-program host, queried through [`MiniProgramHost`]
//! - [`BrowserPlatform`]: a browser host, queried through [`BrowserHost`]
//!
//! Every metadata lookup is independent. A lookup that fails leaves its fields
//! as empty strings and logs a warning; it never stops the other lookups.

mod browser;
mod device;
mod miniprogram;
mod native;
mod storage;
mod transport;

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::event::{generate_id, logtime_now, Event, EventFields, Level};

pub use browser::{detect_browser, detect_os, BrowserFields, BrowserHost, BrowserPlatform, PageInfo};
pub use device::{DeviceIdentity, DEVICE_ID_KEY};
pub use miniprogram::{
    AccountInfo, EnterOptions, MiniProgramFields, MiniProgramHost, MiniProgramPlatform, SystemInfo,
};
pub use native::{NativeFields, NativePlatform};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{HttpTransport, LOG_API_VERSION};

/// Capability set every host adapter provides
#[async_trait]
pub trait Platform: Send + Sync {
    /// Short adapter name used in diagnostics
    fn name(&self) -> &'static str;

    /// Populate cached environment metadata.
    ///
    /// Idempotent and best-effort: each lookup degrades on its own.
    fn initialize(&self);

    /// Persisted device identifier, created on first use.
    ///
    /// Empty when the backing store is unusable.
    fn device_id(&self) -> String;

    /// Snapshot of the cached environment plus anything read per event
    fn environment(&self) -> EnvironmentFields;

    /// Adapter-owned part of an event, minted now
    fn build_event_fields(
        &self,
        message: &str,
        description: &str,
        level: &Level,
    ) -> Result<EventFields> {
        Ok(EventFields {
            logid: generate_id(),
            logtime: logtime_now(),
            msg: message.to_string(),
            desc: description.to_string(),
            level: level.clone(),
            device_id: self.device_id(),
            environment: self.environment(),
        })
    }

    /// Upload one batch to the endpoint
    async fn send(&self, events: &[Event], endpoint_url: &str) -> Result<()>;
}

/// Environment fields contributed by an adapter, flattened into the event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnvironmentFields {
    Native(NativeFields),
    MiniProgram(MiniProgramFields),
    Browser(BrowserFields),
    /// Free-form fields for adapters outside this crate
    Other(BTreeMap<String, String>),
}

impl Default for EnvironmentFields {
    fn default() -> Self {
        EnvironmentFields::Other(BTreeMap::new())
    }
}

/// Foreground/background state of the host application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AppState {
    /// No show/hide notification received yet
    #[default]
    Unknown,
    Foreground,
    Background,
}

impl AppState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppState::Unknown => "",
            AppState::Foreground => "foreground",
            AppState::Background => "background",
        }
    }
}

impl Serialize for AppState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Run one metadata lookup, logging and defaulting on failure
pub(crate) fn query<T: Default>(platform: &str, what: &str, f: impl FnOnce() -> Result<T>) -> T {
    match f() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(platform, field = what, error = %e, "Metadata lookup failed");
            T::default()
        }
    }
}

/// Read a cached value, ignoring lock poisoning
pub(crate) fn read_cached<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Replace a cached value, ignoring lock poisoning
pub(crate) fn write_cached<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}
