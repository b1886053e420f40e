//! Adapter for a plain OS process host

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use super::device::DeviceIdentity;
use super::storage::KeyValueStore;
use super::transport::HttpTransport;
use super::{query, read_cached, write_cached, AppState, EnvironmentFields, Platform};
use crate::error::{Error, Result};
use crate::event::Event;

const PLATFORM: &str = "native";

/// Environment fields of a native process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NativeFields {
    pub os_name: String,
    pub os_family: String,
    pub os_arch: String,
    pub host_name: String,
    pub locale: String,
    pub process_id: String,
    pub process_name: String,
    pub state: AppState,
}

#[derive(Debug, Clone, Default)]
struct ProcessInfo {
    host_name: String,
    locale: String,
    process_name: String,
}

/// Adapter for a desktop or server process.
///
/// Compile-time facts (OS, family, architecture, pid) are always present;
/// host name, locale and executable name are read in [`Platform::initialize`].
pub struct NativePlatform {
    transport: HttpTransport,
    device: DeviceIdentity,
    info: RwLock<ProcessInfo>,
    state: RwLock<AppState>,
}

impl NativePlatform {
    pub fn new(transport: HttpTransport, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            transport,
            device: DeviceIdentity::new(store),
            info: RwLock::new(ProcessInfo::default()),
            state: RwLock::new(AppState::Unknown),
        }
    }

    /// Record a foreground/background transition
    pub fn set_app_state(&self, state: AppState) {
        write_cached(&self.state, state);
    }
}

fn read_host_name() -> Result<String> {
    for var in ["HOSTNAME", "COMPUTERNAME"] {
        if let Ok(name) = std::env::var(var) {
            if !name.is_empty() {
                return Ok(name);
            }
        }
    }
    let name = std::fs::read_to_string("/etc/hostname")?;
    Ok(name.trim().to_string())
}

fn read_locale() -> Result<String> {
    ["LC_ALL", "LC_MESSAGES", "LANG"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|value| !value.is_empty())
        .ok_or_else(|| Error::Platform("no locale variable set".to_string()))
}

fn read_process_name() -> Result<String> {
    let exe = std::env::current_exe()?;
    exe.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Platform(format!("executable path has no file name: {:?}", exe)))
}

#[async_trait]
impl Platform for NativePlatform {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    fn initialize(&self) {
        let info = ProcessInfo {
            host_name: query(PLATFORM, "host_name", read_host_name),
            locale: query(PLATFORM, "locale", read_locale),
            process_name: query(PLATFORM, "process_name", read_process_name),
        };
        write_cached(&self.info, info);

        // warm the device id cache so the first event does not touch storage
        let _ = self.device.get();
    }

    fn device_id(&self) -> String {
        self.device.get()
    }

    fn environment(&self) -> EnvironmentFields {
        let info = read_cached(&self.info);
        EnvironmentFields::Native(NativeFields {
            os_name: std::env::consts::OS.to_string(),
            os_family: std::env::consts::FAMILY.to_string(),
            os_arch: std::env::consts::ARCH.to_string(),
            host_name: info.host_name,
            locale: info.locale,
            process_id: std::process::id().to_string(),
            process_name: info.process_name,
            state: read_cached(&self.state),
        })
    }

    async fn send(&self, events: &[Event], endpoint_url: &str) -> Result<()> {
        self.transport.send(events, endpoint_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Level;
    use crate::platform::MemoryStore;
    use std::time::Duration;

    fn platform() -> NativePlatform {
        let transport = HttpTransport::new(Duration::from_secs(1)).unwrap();
        NativePlatform::new(transport, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_environment_has_static_fields() {
        let platform = platform();
        platform.initialize();

        let EnvironmentFields::Native(fields) = platform.environment() else {
            panic!("expected native fields");
        };
        assert_eq!(fields.os_name, std::env::consts::OS);
        assert_eq!(fields.os_arch, std::env::consts::ARCH);
        assert_eq!(fields.process_id, std::process::id().to_string());
        assert_eq!(fields.state, AppState::Unknown);
    }

    #[test]
    fn test_app_state_is_reported() {
        let platform = platform();
        platform.set_app_state(AppState::Background);

        let json = serde_json::to_value(platform.environment()).unwrap();
        assert_eq!(json["state"], "background");
        assert!(json.get("os_name").is_some());
    }

    #[test]
    fn test_event_fields_carry_device_id() {
        let platform = platform();
        platform.initialize();

        let fields = platform
            .build_event_fields("boom", "", &Level::Error)
            .unwrap();
        assert_eq!(fields.msg, "boom");
        assert_eq!(fields.device_id, platform.device_id());
        assert_eq!(fields.logid.len(), 32);
    }
}
