//! Broker gateway wire protocol: frame types, constants, and MessagePack encode/decode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::transport::{PropertyValue, SubscribeOptions, TransportError};

// ---------------------------------------------------------------------------
// Protocol action constants
// ---------------------------------------------------------------------------

pub mod action {
    pub const CONNECT: i32 = 1;
    pub const CONNECTED: i32 = 2;
    pub const SUBSCRIBE: i32 = 3;
    pub const SUBSCRIBED: i32 = 4;
    pub const GET: i32 = 5;
    pub const MESSAGE: i32 = 6;
    pub const CLOSE_SUBSCRIPTION: i32 = 7;
    pub const SUBSCRIPTION_CLOSED: i32 = 8;
    pub const DISCONNECT: i32 = 9;
    pub const DISCONNECTED: i32 = 10;
    pub const ERROR: i32 = 11;
}

/// Broker reason codes carried in ERROR frames.
pub mod reason {
    pub const CONNECTION_BROKEN: i32 = 2009;
    pub const NO_MSG_AVAILABLE: i32 = 2033;
    pub const NOT_AUTHORIZED: i32 = 2035;
    pub const Q_MGR_QUIESCING: i32 = 2161;
}

pub mod open_flags {
    pub const CREATE: i32 = 2;
    pub const DURABLE: i32 = 8;
    pub const MANAGED: i32 = 32;
    pub const FAIL_IF_QUIESCING: i32 = 8192;
}

/// `wait_ms` value asking the gateway to wait without limit.
pub const WAIT_UNLIMITED: i64 = -1;

// ---------------------------------------------------------------------------
// Wire types (MessagePack)
// ---------------------------------------------------------------------------

// NOTE: no `skip_serializing_if` here; rmp_serde fails to deserialize structs
// with skipped Option fields: https://github.com/3Hren/msgpack-rust/issues/86
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Frame {
    pub action: i32,
    pub manager: Option<String>,
    pub properties: Option<BTreeMap<String, PropertyValue>>,
    pub topic: Option<String>,
    pub options: Option<i32>,
    pub subscription_id: Option<u64>,
    pub wait_ms: Option<i64>,
    pub payload: Option<Vec<u8>>,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ErrorInfo {
    pub reason: i32,
    pub message: String,
}

impl Frame {
    pub fn new(action: i32) -> Self {
        Self {
            action,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Encode / decode helpers
// ---------------------------------------------------------------------------

pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>, TransportError> {
    Ok(rmp_serde::to_vec_named(frame)?)
}

pub fn decode_frame(data: &[u8]) -> Result<Frame, TransportError> {
    Ok(rmp_serde::from_slice(data)?)
}

pub fn encode_open_options(options: SubscribeOptions) -> i32 {
    let mut flags = 0;
    if options.create {
        flags |= open_flags::CREATE;
    }
    if options.durable {
        flags |= open_flags::DURABLE;
    }
    if options.managed {
        flags |= open_flags::MANAGED;
    }
    if options.fail_if_quiescing {
        flags |= open_flags::FAIL_IF_QUIESCING;
    }
    flags
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

pub fn build_connect(manager: &str, properties: BTreeMap<String, PropertyValue>) -> Frame {
    Frame {
        action: action::CONNECT,
        manager: Some(manager.to_string()),
        properties: Some(properties),
        ..Default::default()
    }
}

pub fn build_subscribe(topic: &str, options: SubscribeOptions) -> Frame {
    Frame {
        action: action::SUBSCRIBE,
        topic: Some(topic.to_string()),
        options: Some(encode_open_options(options)),
        ..Default::default()
    }
}

pub fn build_get(subscription_id: u64) -> Frame {
    Frame {
        action: action::GET,
        subscription_id: Some(subscription_id),
        wait_ms: Some(WAIT_UNLIMITED),
        ..Default::default()
    }
}

pub fn build_close_subscription(subscription_id: u64) -> Frame {
    Frame {
        action: action::CLOSE_SUBSCRIPTION,
        subscription_id: Some(subscription_id),
        ..Default::default()
    }
}
