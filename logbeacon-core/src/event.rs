//! Event record shipped to the collection endpoint
//!
//! An [`Event`] is built once, at the moment the caller logs something, and
//! is never touched again. The JSON shape is flat: the common fields, the
//! caller's user context and custom key slots, and whatever environment
//! fields the host adapter contributes all sit side by side.
//!
//! ```text
//! { "logid": "...", "logtime": "2025-01-01 12:00:00.000", "msg": "...",
//!   "desc": "", "type": "error", "appid": "...", "version": "...",
//!   "device_id": "...", "user": "", "user_key_1": "", ..., "os": "linux", ... }
//! ```

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::platform::EnvironmentFields;

/// Number of caller-settable custom key slots (`user_key_1`..`user_key_6`)
pub const CUSTOM_KEY_SLOTS: usize = 6;

const CUSTOM_KEY_NAMES: [&str; CUSTOM_KEY_SLOTS] = [
    "user_key_1",
    "user_key_2",
    "user_key_3",
    "user_key_4",
    "user_key_5",
    "user_key_6",
];

/// `logtime` format, local wall clock with millisecond precision
pub const LOGTIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Severity or category of an event, serialized as the `type` field
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Level {
    Error,
    Info,
    Warn,
    /// Caller-named custom event (e.g. `"purchase"`)
    Custom(String),
}

impl Level {
    pub fn as_str(&self) -> &str {
        match self {
            Level::Error => "error",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Custom(name) => name,
        }
    }

    /// Parse a level name; unknown names become custom levels
    pub fn parse(name: &str) -> Self {
        match name {
            "error" => Level::Error,
            "info" => Level::Info,
            "warn" | "warning" => Level::Warn,
            other => Level::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Level {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A raised error reduced to what the event needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub message: String,
    pub stack: Option<String>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Capture an error value, attaching a backtrace when the process has
    /// backtraces enabled (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`).
    ///
    /// The error's `source()` chain is folded into the message text.
    pub fn capture<E>(err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str("\nCaused by: ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        let backtrace = std::backtrace::Backtrace::capture();
        let stack = match backtrace.status() {
            std::backtrace::BacktraceStatus::Captured => {
                Some(format!("{}\n{}", message, backtrace))
            }
            _ => None,
        };

        Self { message, stack }
    }
}

/// Raw caller payload before normalization to text
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Text(String),
    Error(ErrorReport),
    /// Structured value; objects and arrays are sent as JSON text
    Value(serde_json::Value),
    /// A payload whose serialization already failed; building it drops the event
    Unserializable(String),
}

impl Message {
    /// Serialize any `Serialize` value into a structured message.
    ///
    /// Serialization is deferred to a value here; a failure is kept and
    /// surfaces when the event is built, where the event is dropped.
    pub fn serialized<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Message::Value(value),
            Err(e) => Message::Unserializable(e.to_string()),
        }
    }

    /// Reduce the payload to the `msg` text
    pub fn normalize(&self) -> Result<String> {
        match self {
            Message::Text(text) => Ok(text.clone()),
            Message::Error(report) => Ok(match &report.stack {
                Some(stack) if !stack.is_empty() => stack.clone(),
                _ => report.message.clone(),
            }),
            Message::Value(value) => coerce_to_text(value),
            Message::Unserializable(reason) => Err(Error::Build(format!(
                "message could not be serialized: {}",
                reason
            ))),
        }
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<ErrorReport> for Message {
    fn from(report: ErrorReport) -> Self {
        Message::Error(report)
    }
}

impl From<serde_json::Value> for Message {
    fn from(value: serde_json::Value) -> Self {
        Message::Value(value)
    }
}

/// Coerce a JSON value to event text: strings verbatim, objects and arrays
/// as JSON, other primitives via their JSON literal (`42`, `true`, `null`).
pub fn coerce_to_text(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            Ok(serde_json::to_string(value)?)
        }
        other => Ok(other.to_string()),
    }
}

/// Generate a 32-character event or device identifier
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Current local time in [`LOGTIME_FORMAT`]
pub fn logtime_now() -> String {
    chrono::Local::now().format(LOGTIME_FORMAT).to_string()
}

/// The caller's custom key slots, serialized as `user_key_1`..`user_key_6`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomKeys([String; CUSTOM_KEY_SLOTS]);

impl CustomKeys {
    /// Value of a slot, 1-based
    pub fn get(&self, index: usize) -> Option<&str> {
        let slot = index.checked_sub(1)?;
        self.0.get(slot).map(String::as_str)
    }

    /// Set a slot, 1-based
    pub fn set(&mut self, index: usize, value: String) -> Result<()> {
        let slot = index
            .checked_sub(1)
            .and_then(|slot| self.0.get_mut(slot))
            .ok_or_else(|| {
                Error::Config(format!(
                    "custom key index {} out of range 1..={}",
                    index, CUSTOM_KEY_SLOTS
                ))
            })?;
        *slot = value;
        Ok(())
    }
}

impl Serialize for CustomKeys {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CUSTOM_KEY_SLOTS))?;
        for (name, value) in CUSTOM_KEY_NAMES.iter().zip(self.0.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// The part of an event the host adapter is responsible for
#[derive(Debug, Clone, PartialEq)]
pub struct EventFields {
    pub logid: String,
    pub logtime: String,
    pub msg: String,
    pub desc: String,
    pub level: Level,
    pub device_id: String,
    pub environment: EnvironmentFields,
}

/// A fully built event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub logid: String,
    pub logtime: String,
    pub msg: String,
    pub desc: String,
    #[serde(rename = "type")]
    pub level: Level,
    pub appid: String,
    pub version: String,
    pub device_id: String,
    /// User context captured at build time
    pub user: String,
    #[serde(flatten)]
    pub custom_keys: CustomKeys,
    #[serde(flatten)]
    pub environment: EnvironmentFields,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Debug)]
    struct Inner;

    impl std::fmt::Display for Inner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl std::error::Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl std::fmt::Display for Outer {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "request failed")
        }
    }

    impl std::error::Error for Outer {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_level_names() {
        assert_eq!(Level::Error.as_str(), "error");
        assert_eq!(Level::Warn.to_string(), "warn");
        assert_eq!(Level::parse("info"), Level::Info);
        assert_eq!(Level::parse("warning"), Level::Warn);
        assert_eq!(
            Level::parse("purchase"),
            Level::Custom("purchase".to_string())
        );
        assert_eq!(
            serde_json::to_value(Level::Custom("login".into())).unwrap(),
            "login"
        );
    }

    #[test]
    fn test_error_prefers_stack() {
        let report = ErrorReport::new("boom").with_stack("boom\n  at main.rs:1");
        assert_eq!(
            Message::from(report).normalize().unwrap(),
            "boom\n  at main.rs:1"
        );

        let report = ErrorReport::new("boom");
        assert_eq!(Message::from(report).normalize().unwrap(), "boom");

        let report = ErrorReport::new("boom").with_stack("");
        assert_eq!(Message::from(report).normalize().unwrap(), "boom");
    }

    #[test]
    fn test_capture_folds_source_chain() {
        let report = ErrorReport::capture(&Outer(Inner));
        assert_eq!(report.message, "request failed\nCaused by: connection reset");
        if let Some(stack) = &report.stack {
            assert!(stack.starts_with("request failed"));
        }
    }

    #[test]
    fn test_object_is_serialized() {
        let message = Message::from(serde_json::json!({"code": 42, "reason": "timeout"}));
        assert_eq!(
            message.normalize().unwrap(),
            r#"{"code":42,"reason":"timeout"}"#
        );
    }

    #[test]
    fn test_primitives_are_coerced() {
        assert_eq!(Message::from(serde_json::json!(42)).normalize().unwrap(), "42");
        assert_eq!(Message::from(serde_json::json!(true)).normalize().unwrap(), "true");
        assert_eq!(Message::from(serde_json::json!(null)).normalize().unwrap(), "null");
        assert_eq!(Message::from(serde_json::json!("plain")).normalize().unwrap(), "plain");
        assert_eq!(Message::from("text").normalize().unwrap(), "text");
    }

    #[test]
    fn test_unserializable_payload_fails_to_build() {
        let mut map: HashMap<(u8, u8), u8> = HashMap::new();
        map.insert((1, 2), 3);
        let message = Message::serialized(&map);
        assert!(matches!(message, Message::Unserializable(_)));
        assert!(matches!(message.normalize(), Err(Error::Build(_))));
    }

    #[test]
    fn test_custom_keys_bounds() {
        let mut keys = CustomKeys::default();
        assert!(keys.set(1, "a".into()).is_ok());
        assert!(keys.set(6, "f".into()).is_ok());
        assert!(keys.set(0, "x".into()).is_err());
        assert!(keys.set(7, "x".into()).is_err());
        assert_eq!(keys.get(1), Some("a"));
        assert_eq!(keys.get(6), Some("f"));
        assert_eq!(keys.get(7), None);

        let json = serde_json::to_value(&keys).unwrap();
        assert_eq!(json["user_key_1"], "a");
        assert_eq!(json["user_key_2"], "");
        assert_eq!(json["user_key_6"], "f");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id();
        let b = generate_id();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_logtime_format() {
        let now = logtime_now();
        assert!(chrono::NaiveDateTime::parse_from_str(&now, LOGTIME_FORMAT).is_ok());
        // 2025-01-01 12:00:00.000
        assert_eq!(now.len(), 23);
    }
}
