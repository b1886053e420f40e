//! Event builder: caller payload + adapter environment + facade context

use std::sync::Arc;

use crate::config::ReporterConfig;
use crate::error::Result;
use crate::event::{CustomKeys, Event, Level, Message};
use crate::platform::Platform;

/// Caller-settable state merged into every event built after it changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReporterContext {
    pub user: String,
    pub custom_keys: CustomKeys,
}

pub struct EventBuilder {
    platform: Arc<dyn Platform>,
    app_id: String,
    app_version: String,
}

impl EventBuilder {
    pub fn new(platform: Arc<dyn Platform>, config: &ReporterConfig) -> Self {
        Self {
            platform,
            app_id: config.app_id.clone(),
            app_version: config.app_version.clone(),
        }
    }

    /// Build an event now, snapshotting the environment and `context`
    pub fn build(
        &self,
        message: &Message,
        description: Option<&str>,
        level: Level,
        context: &ReporterContext,
    ) -> Result<Event> {
        let msg = message.normalize()?;
        let fields =
            self.platform
                .build_event_fields(&msg, description.unwrap_or_default(), &level)?;

        Ok(Event {
            logid: fields.logid,
            logtime: fields.logtime,
            msg: fields.msg,
            desc: fields.desc,
            level: fields.level,
            appid: self.app_id.clone(),
            version: self.app_version.clone(),
            device_id: fields.device_id,
            user: context.user.clone(),
            custom_keys: context.custom_keys.clone(),
            environment: fields.environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::event::{ErrorReport, EventFields};
    use crate::platform::EnvironmentFields;
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct FixedPlatform {
        broken: bool,
    }

    #[async_trait]
    impl Platform for FixedPlatform {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn initialize(&self) {}

        fn device_id(&self) -> String {
            "device-1".to_string()
        }

        fn environment(&self) -> EnvironmentFields {
            let mut fields = BTreeMap::new();
            fields.insert("runtime".to_string(), "test".to_string());
            EnvironmentFields::Other(fields)
        }

        fn build_event_fields(
            &self,
            message: &str,
            description: &str,
            level: &Level,
        ) -> Result<EventFields> {
            if self.broken {
                return Err(Error::Platform("host went away".into()));
            }
            Ok(EventFields {
                logid: "log-1".to_string(),
                logtime: "2025-01-01 00:00:00.000".to_string(),
                msg: message.to_string(),
                desc: description.to_string(),
                level: level.clone(),
                device_id: self.device_id(),
                environment: self.environment(),
            })
        }

        async fn send(&self, _events: &[Event], _endpoint_url: &str) -> Result<()> {
            Ok(())
        }
    }

    fn builder(broken: bool) -> EventBuilder {
        let config = ReporterConfig::new("https://logs.example.com", "app-7", "3.1.0");
        EventBuilder::new(Arc::new(FixedPlatform { broken }), &config)
    }

    #[test]
    fn test_build_merges_all_sources() {
        let mut context = ReporterContext {
            user: "alice".to_string(),
            ..Default::default()
        };
        context.custom_keys.set(2, "vip".to_string()).unwrap();

        let event = builder(false)
            .build(&Message::from("boom"), Some("checkout"), Level::Error, &context)
            .unwrap();

        assert_eq!(event.msg, "boom");
        assert_eq!(event.desc, "checkout");
        assert_eq!(event.appid, "app-7");
        assert_eq!(event.version, "3.1.0");
        assert_eq!(event.device_id, "device-1");
        assert_eq!(event.user, "alice");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["user_key_2"], "vip");
        assert_eq!(json["runtime"], "test");
        assert_eq!(json["logid"], "log-1");
    }

    #[test]
    fn test_missing_description_is_empty() {
        let event = builder(false)
            .build(
                &Message::from(ErrorReport::new("bad")),
                None,
                Level::Warn,
                &ReporterContext::default(),
            )
            .unwrap();
        assert_eq!(event.desc, "");
        assert_eq!(event.msg, "bad");
    }

    #[test]
    fn test_adapter_failure_is_returned() {
        let result = builder(true).build(
            &Message::from("x"),
            None,
            Level::Info,
            &ReporterContext::default(),
        );
        assert!(matches!(result, Err(Error::Platform(_))));
    }
}
