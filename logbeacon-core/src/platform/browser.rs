//! Adapter for a browser host
//!
//! Browser and OS are sniffed from the user agent once at initialization.
//! Page location is read on every event.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::Serialize;

use super::device::DeviceIdentity;
use super::storage::KeyValueStore;
use super::transport::HttpTransport;
use super::{query, read_cached, write_cached, EnvironmentFields, Platform};
use crate::error::Result;
use crate::event::Event;

const PLATFORM: &str = "browser";

const UNKNOWN: &str = "Unknown";

/// Current page as seen by the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    pub referrer: String,
}

/// Browser globals reachable from the embedding bridge
pub trait BrowserHost: Send + Sync {
    fn user_agent(&self) -> Result<String>;
    /// Screen width and height in CSS pixels
    fn screen_size(&self) -> Result<(u32, u32)>;
    fn network_type(&self) -> Result<String>;
    fn page(&self) -> Result<PageInfo>;
}

/// Environment fields of a browser host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrowserFields {
    pub browser_name: String,
    pub browser_version: String,
    pub os_name: String,
    pub os_version: String,
    pub screen_width: String,
    pub screen_height: String,
    pub page_url: String,
    pub page_title: String,
    pub page_referrer: String,
    pub network_type: String,
}

#[derive(Debug, Clone, Default)]
struct AgentInfo {
    browser_name: String,
    browser_version: String,
    os_name: String,
    os_version: String,
}

pub struct BrowserPlatform<H> {
    host: H,
    transport: HttpTransport,
    device: DeviceIdentity,
    agent: RwLock<AgentInfo>,
    screen: RwLock<(String, String)>,
    network_type: RwLock<String>,
}

impl<H: BrowserHost> BrowserPlatform<H> {
    pub fn new(host: H, transport: HttpTransport, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            host,
            transport,
            device: DeviceIdentity::new(store),
            agent: RwLock::new(AgentInfo::default()),
            screen: RwLock::new((String::new(), String::new())),
            network_type: RwLock::new("unknown".to_string()),
        }
    }

    /// Hook for the host's connection change notifications
    pub fn set_network_type(&self, network_type: impl Into<String>) {
        write_cached(&self.network_type, network_type.into());
    }

    fn read_agent(&self) -> Result<AgentInfo> {
        let ua = self.host.user_agent()?;
        let (browser_name, browser_version) = detect_browser(&ua);
        let (os_name, os_version) = detect_os(&ua);
        Ok(AgentInfo {
            browser_name,
            browser_version,
            os_name,
            os_version,
        })
    }
}

/// Digits and dots (or underscores, normalized to dots) right after `marker`
fn version_after(ua: &str, marker: &str) -> Option<String> {
    let start = ua.find(marker)? + marker.len();
    let version: String = ua[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '_')
        .map(|c| if c == '_' { '.' } else { c })
        .collect();
    let version = version.trim_end_matches('.').to_string();
    (!version.is_empty()).then_some(version)
}

/// Browser name and version from a user agent string
pub fn detect_browser(ua: &str) -> (String, String) {
    let (name, version) = if ua.contains("Firefox") {
        ("Firefox", version_after(ua, "Firefox/"))
    } else if ua.contains("Edg/") {
        ("Edge Chromium", version_after(ua, "Edg/"))
    } else if ua.contains("Edge/") {
        ("Edge Legacy", version_after(ua, "Edge/"))
    } else if ua.contains("Chrome") && ua.contains("Safari") {
        ("Chrome", version_after(ua, "Chrome/"))
    } else if ua.contains("Safari") {
        ("Safari", version_after(ua, "Version/"))
    } else if ua.contains("MSIE") || ua.contains("Trident") {
        (
            "Internet Explorer",
            version_after(ua, "MSIE ").or_else(|| version_after(ua, "rv:")),
        )
    } else {
        (UNKNOWN, None)
    };
    (name.to_string(), version.unwrap_or_default())
}

/// Operating system name and version from a user agent string
pub fn detect_os(ua: &str) -> (String, String) {
    let (name, version) = if ua.contains("Windows") {
        let version = [
            ("Windows NT 10.0", "10"),
            ("Windows NT 6.3", "8.1"),
            ("Windows NT 6.2", "8"),
            ("Windows NT 6.1", "7"),
            ("Windows NT 6.0", "Vista"),
            ("Windows NT 5.1", "XP"),
        ]
        .iter()
        .find(|(marker, _)| ua.contains(marker))
        .map(|(_, version)| version.to_string());
        ("Windows", version)
    } else if ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iOS") {
        // iOS agents also say "like Mac OS X", so they are matched first
        ("iOS", version_after(ua, "OS "))
    } else if ua.contains("Mac") {
        ("MacOS", version_after(ua, "Mac OS X "))
    } else if ua.contains("Android") {
        ("Android", version_after(ua, "Android "))
    } else if ua.contains("Linux") {
        ("Linux", None)
    } else {
        (UNKNOWN, None)
    };
    (
        name.to_string(),
        version.unwrap_or_else(|| UNKNOWN.to_string()),
    )
}

#[async_trait]
impl<H: BrowserHost> Platform for BrowserPlatform<H> {
    fn name(&self) -> &'static str {
        PLATFORM
    }

    fn initialize(&self) {
        let agent = query(PLATFORM, "user_agent", || self.read_agent());
        write_cached(&self.agent, agent);

        let screen = query(PLATFORM, "screen", || {
            let (width, height) = self.host.screen_size()?;
            Ok((width.to_string(), height.to_string()))
        });
        write_cached(&self.screen, screen);

        if let Some(network_type) = query(PLATFORM, "network_type", || {
            self.host.network_type().map(Some)
        }) {
            self.set_network_type(network_type);
        }

        let _ = self.device.get();
    }

    fn device_id(&self) -> String {
        self.device.get()
    }

    fn environment(&self) -> EnvironmentFields {
        let agent = read_cached(&self.agent);
        let (screen_width, screen_height) = read_cached(&self.screen);
        let page = query(PLATFORM, "page", || self.host.page());

        EnvironmentFields::Browser(BrowserFields {
            browser_name: agent.browser_name,
            browser_version: agent.browser_version,
            os_name: agent.os_name,
            os_version: agent.os_version,
            screen_width,
            screen_height,
            page_url: page.url,
            page_title: page.title,
            page_referrer: page.referrer,
            network_type: read_cached(&self.network_type),
        })
    }

    async fn send(&self, events: &[Event], endpoint_url: &str) -> Result<()> {
        self.transport.send(events, endpoint_url).await
    }
}
