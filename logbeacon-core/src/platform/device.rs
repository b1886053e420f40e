//! Device identity: a persisted pseudo-random installation id

use std::sync::{Arc, Mutex, PoisonError};

use super::storage::KeyValueStore;
use crate::error::Result;
use crate::event::generate_id;

/// Storage key holding the device identifier
pub const DEVICE_ID_KEY: &str = "logbeacon_device_id";

/// Read-through cache over the platform store.
///
/// The first read loads the stored id, or creates and persists one when the
/// store has none. The id is never regenerated while a stored value exists.
pub struct DeviceIdentity {
    store: Arc<dyn KeyValueStore>,
    cached: Mutex<Option<String>>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cached: Mutex::new(None),
        }
    }

    /// Current device id; empty string when storage is unusable
    pub fn get(&self) -> String {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        match self.load_or_create() {
            Ok(id) => {
                *cached = Some(id.clone());
                id
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read or persist device id");
                String::new()
            }
        }
    }

    fn load_or_create(&self) -> Result<String> {
        if let Some(id) = self.store.get(DEVICE_ID_KEY)? {
            if !id.is_empty() {
                return Ok(id);
            }
        }

        let id = generate_id();
        self.store.set(DEVICE_ID_KEY, &id)?;
        tracing::debug!(device_id = %id, "Created device id");
        Ok(id)
    }
}
