//! Connection settings: typed config, flat property keys, and YAML loading.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::transport::{ConnectionProperties, keys};
use crate::types::{Encoding, Error};

// Flat property keys recognized by `Settings::from_properties`.

/// Broker host name or address. Required.
pub const HOST_NAME: &str = "Host name";
/// Broker listener port, parsed as `u16`. Required.
pub const PORT: &str = "Port";
/// Server-connection channel name. Required.
pub const CHANNEL_SRV_NAME: &str = "Channel server name";
/// Queue manager to connect to. Required.
pub const MQ_MANAGER: &str = "MQ Manager";
/// User id; omitted from the connection when blank.
pub const USER_ID: &str = "User id";
/// Password; omitted from the connection when blank.
pub const PASSWORD: &str = "Password";
/// Topic to subscribe to. Required.
pub const TOPIC_NAME: &str = "Topic name";
/// Payload charset name. Defaults to US-ASCII.
pub const ENCODING: &str = "Encoding";

/// Where and how to reach a queue manager.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub channel: String,
    pub manager: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        channel: impl Into<String>,
        manager: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            channel: channel.into(),
            manager: manager.into(),
            user_id: None,
            password: None,
        }
    }

    pub fn with_credentials(
        mut self,
        user_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.user_id = Some(user_id.into());
        self.password = Some(password.into());
        self
    }

    /// Check that every mandatory field is present.
    pub fn validate(&self) -> Result<(), Error> {
        let required = [
            ("host", &self.host),
            ("channel", &self.channel),
            ("manager", &self.manager),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{name} must not be empty")));
            }
        }
        if self.port == 0 {
            return Err(Error::Config("port must not be 0".to_string()));
        }
        Ok(())
    }

    /// Build the transport property set.
    ///
    /// Authentication is always requested; user id and password are only
    /// included when non-empty, each on its own.
    pub fn to_properties(&self) -> ConnectionProperties {
        let mut props = ConnectionProperties::new();
        props.insert(keys::HOST_NAME, self.host.as_str());
        props.insert(keys::PORT, self.port);
        props.insert(keys::CHANNEL, self.channel.as_str());
        props.insert(keys::USE_CSP_AUTHENTICATION, true);
        if let Some(user_id) = non_blank(self.user_id.as_deref()) {
            props.insert(keys::USER_ID, user_id);
        }
        if let Some(password) = non_blank(self.password.as_deref()) {
            props.insert(keys::PASSWORD, password);
        }
        props
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("channel", &self.channel)
            .field("manager", &self.manager)
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Everything a subscriber needs: connection, topic, and payload encoding.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub topic: String,
    #[serde(default)]
    pub encoding: Encoding,
}

impl Settings {
    /// Build settings from a flat key/value property set.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, Error> {
        let required = |key: &str| {
            props
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::Config(format!("missing property '{key}'")))
        };
        let optional = |key: &str| {
            props
                .get(key)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string)
        };

        let port = required(PORT)?;
        let port = port
            .parse::<u16>()
            .map_err(|e| Error::Config(format!("invalid property '{PORT}' ({port}): {e}")))?;
        let encoding = match props.get(ENCODING).map(|v| v.trim()) {
            Some(name) if !name.is_empty() => name.parse::<Encoding>()?,
            _ => Encoding::default(),
        };

        let settings = Self {
            connection: ConnectionConfig {
                host: required(HOST_NAME)?.to_string(),
                port,
                channel: required(CHANNEL_SRV_NAME)?.to_string(),
                manager: required(MQ_MANAGER)?.to_string(),
                user_id: optional(USER_ID),
                password: optional(PASSWORD),
            },
            topic: required(TOPIC_NAME)?.to_string(),
            encoding,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Check the connection fields and that a topic is set.
    pub fn validate(&self) -> Result<(), Error> {
        self.connection.validate()?;
        if self.topic.trim().is_empty() {
            return Err(Error::Config("topic must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Load and validate settings from a YAML file.
pub async fn load(path: &Path) -> Result<Settings, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
    let settings: Settings = serde_yaml_ng::from_str(&content)
        .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_properties() -> HashMap<String, String> {
        [
            (HOST_NAME, "broker.local"),
            (PORT, "1414"),
            (CHANNEL_SRV_NAME, "SYSTEM.DEF.SVRCONN"),
            (MQ_MANAGER, "QM1"),
            (TOPIC_NAME, "orders/new"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn from_properties_full() {
        let mut props = base_properties();
        props.insert(USER_ID.into(), "app".into());
        props.insert(PASSWORD.into(), "secret".into());
        props.insert(ENCODING.into(), "ISO-8859-1".into());

        let settings = Settings::from_properties(&props).unwrap();
        assert_eq!(settings.connection.host, "broker.local");
        assert_eq!(settings.connection.port, 1414);
        assert_eq!(settings.connection.channel, "SYSTEM.DEF.SVRCONN");
        assert_eq!(settings.connection.manager, "QM1");
        assert_eq!(settings.connection.user_id.as_deref(), Some("app"));
        assert_eq!(settings.connection.password.as_deref(), Some("secret"));
        assert_eq!(settings.topic, "orders/new");
        assert_eq!(settings.encoding, Encoding::Latin1);
    }

    #[test]
    fn from_properties_defaults() {
        let settings = Settings::from_properties(&base_properties()).unwrap();
        assert_eq!(settings.encoding, Encoding::Ascii);
        assert!(settings.connection.user_id.is_none());
        assert!(settings.connection.password.is_none());
    }

    #[test]
    fn from_properties_blank_credentials_are_absent() {
        let mut props = base_properties();
        props.insert(USER_ID.into(), String::new());
        props.insert(PASSWORD.into(), String::new());
        let settings = Settings::from_properties(&props).unwrap();
        assert!(settings.connection.user_id.is_none());
        assert!(settings.connection.password.is_none());
    }

    #[test]
    fn from_properties_missing_manager() {
        let mut props = base_properties();
        props.remove(MQ_MANAGER);
        let err = Settings::from_properties(&props).unwrap_err();
        assert!(err.to_string().contains("MQ Manager"), "got: {err}");
    }

    #[test]
    fn from_properties_bad_port() {
        let mut props = base_properties();
        props.insert(PORT.into(), "not-a-port".into());
        let err = Settings::from_properties(&props).unwrap_err();
        assert!(err.to_string().contains("Port"), "got: {err}");
    }

    #[test]
    fn from_properties_unknown_encoding() {
        let mut props = base_properties();
        props.insert(ENCODING.into(), "EBCDIC".into());
        let err = Settings::from_properties(&props).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn properties_always_request_authentication() {
        let config = ConnectionConfig::new("broker.local", 1414, "SYSTEM.DEF.SVRCONN", "QM1");
        let props = config.to_properties();
        assert_eq!(props.text(keys::HOST_NAME), Some("broker.local"));
        assert_eq!(props.int(keys::PORT), Some(1414));
        assert_eq!(props.text(keys::CHANNEL), Some("SYSTEM.DEF.SVRCONN"));
        assert_eq!(props.flag(keys::USE_CSP_AUTHENTICATION), Some(true));
        assert!(!props.contains_key(keys::USER_ID));
        assert!(!props.contains_key(keys::PASSWORD));
    }

    #[test]
    fn properties_omit_blank_credentials_independently() {
        let config = ConnectionConfig::new("h", 1, "c", "m").with_credentials("", "pw");
        let props = config.to_properties();
        assert!(!props.contains_key(keys::USER_ID));
        assert_eq!(props.text(keys::PASSWORD), Some("pw"));

        let config = ConnectionConfig::new("h", 1, "c", "m").with_credentials("app", "");
        let props = config.to_properties();
        assert_eq!(props.text(keys::USER_ID), Some("app"));
        assert!(!props.contains_key(keys::PASSWORD));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(ConnectionConfig::new("", 1414, "c", "m").validate().is_err());
        assert!(ConnectionConfig::new("h", 0, "c", "m").validate().is_err());
        assert!(ConnectionConfig::new("h", 1414, "c", " ").validate().is_err());
        assert!(ConnectionConfig::new("h", 1414, "c", "m").validate().is_ok());
    }

    #[test]
    fn debug_hides_password() {
        let config = ConnectionConfig::new("h", 1, "c", "m").with_credentials("app", "hunter2");
        let out = format!("{config:?}");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("app"));
    }

    #[tokio::test]
    async fn load_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriber.yaml");
        let yaml = r#"
connection:
  host: broker.local
  port: 1414
  channel: SYSTEM.DEF.SVRCONN
  manager: QM1
  user_id: app
topic: orders/new
encoding: UTF-8
"#;
        tokio::fs::write(&path, yaml).await.unwrap();

        let settings = load(&path).await.unwrap();
        assert_eq!(settings.connection.manager, "QM1");
        assert_eq!(settings.connection.user_id.as_deref(), Some("app"));
        assert!(settings.connection.password.is_none());
        assert_eq!(settings.topic, "orders/new");
        assert_eq!(settings.encoding, Encoding::Utf8);
    }

    #[tokio::test]
    async fn load_yaml_default_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriber.yaml");
        let yaml = r#"
connection:
  host: broker.local
  port: 1414
  channel: SYSTEM.DEF.SVRCONN
  manager: QM1
topic: orders/new
"#;
        tokio::fs::write(&path, yaml).await.unwrap();

        let settings = load(&path).await.unwrap();
        assert_eq!(settings.encoding, Encoding::Ascii);
    }

    #[tokio::test]
    async fn load_rejects_empty_topic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subscriber.yaml");
        let yaml = r#"
connection:
  host: broker.local
  port: 1414
  channel: SYSTEM.DEF.SVRCONN
  manager: QM1
topic: ""
"#;
        tokio::fs::write(&path, yaml).await.unwrap();

        let err = load(&path).await.unwrap_err();
        assert!(err.to_string().contains("topic"), "got: {err}");
    }

    #[tokio::test]
    async fn load_missing_file() {
        let err = load(Path::new("/nonexistent/subscriber.yaml"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("read"), "got: {err}");
    }
}
