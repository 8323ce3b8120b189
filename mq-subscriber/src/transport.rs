//! Broker capability boundary.
//!
//! The client never talks to a network directly. It drives a [`Broker`], which
//! hands out a [`BrokerConnection`], which in turn opens [`BrokerSubscription`]s.
//! [`GatewayBroker`](crate::GatewayBroker) is the bundled WebSocket
//! implementation; tests plug in their own.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite;

/// Keys of the property set handed to [`Broker::connect`].
pub mod keys {
    pub const HOST_NAME: &str = "hostname";
    pub const PORT: &str = "port";
    pub const CHANNEL: &str = "channel";
    pub const USE_CSP_AUTHENTICATION: &str = "useCSPAuthentication";
    pub const USER_ID: &str = "userID";
    pub const PASSWORD: &str = "password";
}

/// A typed connection property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Int(i64),
    Flag(bool),
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::Text(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::Text(s)
    }
}

impl From<u16> for PropertyValue {
    fn from(n: u16) -> Self {
        PropertyValue::Int(i64::from(n))
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Flag(b)
    }
}

/// Connection properties for the transport layer.
///
/// `Debug` redacts the password.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectionProperties(BTreeMap<String, PropertyValue>);

impl ConnectionProperties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key`, replacing any previous value.
    pub fn insert(&mut self, key: &str, value: impl Into<PropertyValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value of `key` if it is text. `int` and `flag` work the same way.
    pub fn text(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(PropertyValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(PropertyValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(PropertyValue::Flag(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, PropertyValue> {
        self.0
    }
}

impl fmt::Debug for ConnectionProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.0 {
            if k == keys::PASSWORD {
                map.entry(k, &"<redacted>");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

/// How a topic is opened as a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Create the subscription if it does not exist.
    pub create: bool,
    /// Fail immediately instead of blocking while the broker is quiescing.
    pub fail_if_quiescing: bool,
    /// Let the broker manage the backing storage.
    pub managed: bool,
    /// Survive the end of the subscribing session.
    pub durable: bool,
}

impl SubscribeOptions {
    /// The only mode the client uses: create, fail-if-quiescing, managed, non-durable.
    pub const fn managed_non_durable() -> Self {
        Self {
            create: true,
            fail_if_quiescing: true,
            managed: true,
            durable: false,
        }
    }
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self::managed_non_durable()
    }
}

/// Errors raised by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tungstenite::Error>),

    #[error("frame encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("frame decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("broker error: reason={reason}, {message}")]
    Broker { reason: i32, message: String },

    #[error("missing connection property: {0}")]
    MissingProperty(&'static str),

    #[error("connection broken: {0}")]
    ConnectionBroken(String),

    #[error("connection already closed")]
    ConnectionClosed,

    #[error("handle already closed")]
    AlreadyClosed,

    #[error("timed out: {0}")]
    Timeout(String),
}

impl From<tungstenite::Error> for TransportError {
    fn from(e: tungstenite::Error) -> Self {
        TransportError::WebSocket(Box::new(e))
    }
}

impl TransportError {
    /// Broker reason code, when the broker supplied one.
    pub fn reason(&self) -> Option<i32> {
        match self {
            TransportError::Broker { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// True when the underlying link is gone and the session cannot be reused.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            TransportError::WebSocket(_)
                | TransportError::ConnectionBroken(_)
                | TransportError::ConnectionClosed
        )
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Entry point of a transport: opens sessions to a named queue manager.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn connect(
        &self,
        manager: &str,
        properties: &ConnectionProperties,
    ) -> TransportResult<Box<dyn BrokerConnection>>;
}

/// A live session to a queue manager.
#[async_trait]
pub trait BrokerConnection: Send {
    async fn open_topic(
        &mut self,
        topic: &str,
        options: SubscribeOptions,
    ) -> TransportResult<Box<dyn BrokerSubscription>>;

    /// Close the session. Subscriptions opened on it become unusable.
    async fn close(&mut self) -> TransportResult<()>;
}

/// An open subscription on a [`BrokerConnection`].
#[async_trait]
pub trait BrokerSubscription: Send {
    /// Pull the next message payload, waiting without a time limit.
    async fn get(&mut self) -> TransportResult<Vec<u8>>;

    async fn close(&mut self) -> TransportResult<()>;
}
