//! Adapter for a mini-program host
//!
//! The host's synchronous APIs (system info, account info, enter options,
//! page stack) are reached through [`MiniProgramHost`], implemented by the
//! embedding bridge. System and account info are cached at initialization.
//! Enter options and the current page are read on every event since they
//! change while the app runs.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use super::device::DeviceIdentity;
use super::storage::KeyValueStore;
use super::transport::HttpTransport;
use super::{query, read_cached, write_cached, AppState, EnvironmentFields, Platform};
use crate::error::Result;
use crate::event::Event;

const PLATFORM: &str = "miniprogram";

/// Result of the host's system info query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemInfo {
    pub brand: String,
    pub model: String,
    pub system: String,
    pub platform: String,
    pub cpu_type: String,
    pub memory_size: String,
    pub sdk_version: String,
    pub language: String,
    pub version: String,
    pub font_size_scale_factor: String,
    pub font_size_setting: String,
    pub enable_debug: Option<bool>,
}

/// Result of the host's account info query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub app_id: String,
    pub version: String,
    pub env_version: String,
}

/// How the mini-program was entered
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnterOptions {
    pub path: String,
    pub scene: Option<u32>,
    pub query: Option<BTreeMap<String, String>>,
    pub referrer_info: Option<serde_json::Value>,
}

/// Synchronous host APIs of a mini-program runtime
pub trait MiniProgramHost: Send + Sync {
    fn system_info(&self) -> Result<SystemInfo>;
    fn account_info(&self) -> Result<AccountInfo>;
    fn enter_options(&self) -> Result<EnterOptions>;
    /// Route of the top page on the page stack; empty when the stack is empty
    fn current_page(&self) -> Result<String>;
}

/// Environment fields of a mini-program host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MiniProgramFields {
    pub page_path: String,
    pub weapp_account_appid: String,
    pub weapp_account_env: String,
    pub weapp_account_version: String,
    pub device_brand: String,
    pub device_model: String,
    pub device_system: String,
    pub device_platform: String,
    pub device_cpu_type: String,
    pub device_memory_size: String,
    pub weapp_base_sdk_version: String,
    pub weapp_base_enable_debug: String,
    pub weapp_base_language: String,
    pub weapp_base_version: String,
    pub weapp_base_font_size_scale_factor: String,
    pub weapp_base_font_size_setting: String,
    pub weapp_enter_scene: String,
    pub weapp_enter_path: String,
    pub weapp_enter_query: String,
    pub weapp_enter_refer_info: String,
    pub weapp_state: AppState,
}

#[derive(Debug, Clone, Default)]
struct DeviceInfo {
    brand: String,
    model: String,
    system: String,
    platform: String,
    cpu_type: String,
    memory_size: String,
}

#[derive(Debug, Clone, Default)]
struct BaseInfo {
    sdk_version: String,
    language: String,
    version: String,
    font_size_scale_factor: String,
    font_size_setting: String,
    enable_debug: String,
}

#[derive(Debug, Clone, Default)]
struct EnterInfo {
    scene: String,
    path: String,
    query: String,
    referrer_info: String,
}

pub struct MiniProgramPlatform<H> {
    host: H,
    transport: HttpTransport,
    device: DeviceIdentity,
    device_info: RwLock<DeviceInfo>,
    account: RwLock<AccountInfo>,
    base_info: RwLock<BaseInfo>,
    state: RwLock<AppState>,
}

impl<H: MiniProgramHost> MiniProgramPlatform<H> {
    pub fn new(host: H, transport: HttpTransport, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            host,
            transport,
            device: DeviceIdentity::new(store),
            device_info: RwLock::new(DeviceInfo::default()),
            account: RwLock::new(AccountInfo::default()),
            base_info: RwLock::new(BaseInfo::default()),
            state: RwLock::new(AppState::Unknown),
        }
    }

    /// Hook for the host's show/hide notifications
    pub fn set_app_state(&self, state: AppState) {
        write_cached(&self.state, state);
    }

    fn read_device_info(&self) -> Result<DeviceInfo> {
        let info = self.host.system_info()?;
        Ok(DeviceInfo {
            brand: info.brand,
            model: info.model,
            system: info.system,
            platform: info.platform,
            cpu_type: info.cpu_type,
            memory_size: info.memory_size,
        })
    }

    fn read_base_info(&self) -> Result<BaseInfo> {
        let info = self.host.system_info()?;
        Ok(BaseInfo {
            sdk_version: info.sdk_version,
            language: info.language,
            version: info.version,
            font_size_scale_factor: info.font_size_scale_factor,
            font_size_setting: info.font_size_setting,
            enable_debug: info
                .enable_debug
                .map(|debug| debug.to_string())
                .unwrap_or_default(),
        })
    }

    fn read_enter_info(&self) -> Result<EnterInfo> {
        let options = self.host.enter_options()?;
        let query = match &options.query {
            Some(query) => serde_json::to_string(query)?,
            None => String::new(),
        };
        let referrer_info = match &options.referrer_info {
            Some(info) => serde_json::to_string(info)?,
            None => String::new(),
        };
        Ok(EnterInfo {
            scene: options.scene.map(|s| s.to_string()).unwrap_or_default(),
            path: options.path,
            query,
            referrer_info,
        })
    }
}

#[async_trait]
impl<H: MiniProgramHost> Platform for MiniProgramPlatform<H> {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    fn initialize(&self) {
        let device_info = query(PLATFORM, "device_info", || self.read_device_info());
        write_cached(&self.device_info, device_info);

        let account = query(PLATFORM, "account_info", || self.host.account_info());
        write_cached(&self.account, account);

        let base_info = query(PLATFORM, "app_base_info", || self.read_base_info());
        write_cached(&self.base_info, base_info);

        let _ = self.device.get();
    }

    fn device_id(&self) -> String {
        self.device.get()
    }

    fn environment(&self) -> EnvironmentFields {
        let device = read_cached(&self.device_info);
        let account = read_cached(&self.account);
        let base = read_cached(&self.base_info);
        let enter = query(PLATFORM, "enter_options", || self.read_enter_info());
        let page_path = query(PLATFORM, "current_page", || self.host.current_page());

        EnvironmentFields::MiniProgram(MiniProgramFields {
            page_path,
            weapp_account_appid: account.app_id,
            weapp_account_env: account.env_version,
            weapp_account_version: account.version,
            device_brand: device.brand,
            device_model: device.model,
            device_system: device.system,
            device_platform: device.platform,
            device_cpu_type: device.cpu_type,
            device_memory_size: device.memory_size,
            weapp_base_sdk_version: base.sdk_version,
            weapp_base_enable_debug: base.enable_debug,
            weapp_base_language: base.language,
            weapp_base_version: base.version,
            weapp_base_font_size_scale_factor: base.font_size_scale_factor,
            weapp_base_font_size_setting: base.font_size_setting,
            weapp_enter_scene: enter.scene,
            weapp_enter_path: enter.path,
            weapp_enter_query: enter.query,
            weapp_enter_refer_info: enter.referrer_info,
            weapp_state: read_cached(&self.state),
        })
    }

    async fn send(&self, events: &[Event], endpoint_url: &str) -> Result<()> {
        self.transport.send(events, endpoint_url).await
    }
}
