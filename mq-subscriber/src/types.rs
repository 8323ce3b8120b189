//! Public types for the mq-subscriber crate.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::transport::TransportError;

/// Text encoding used to decode message payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Encoding {
    /// US-ASCII. Bytes above 0x7F decode to U+FFFD.
    #[default]
    Ascii,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
    /// UTF-8. Invalid sequences decode to U+FFFD.
    Utf8,
}

impl Encoding {
    /// Decode a raw payload into text. Never fails; unmappable input is replaced.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Ascii => bytes
                .iter()
                .map(|&b| {
                    if b.is_ascii() {
                        char::from(b)
                    } else {
                        char::REPLACEMENT_CHARACTER
                    }
                })
                .collect(),
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    /// Canonical charset name.
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Ascii => "US-ASCII",
            Encoding::Latin1 => "ISO-8859-1",
            Encoding::Utf8 => "UTF-8",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported encoding: {0}")]
pub struct UnsupportedEncoding(pub String);

impl FromStr for Encoding {
    type Err = UnsupportedEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_uppercase())
            .collect();
        match normalized.as_str() {
            "ASCII" | "USASCII" | "ASCII7" | "646" => Ok(Encoding::Ascii),
            "ISO88591" | "LATIN1" | "ISOLATIN1" | "88591" | "CP819" | "L1" => Ok(Encoding::Latin1),
            "UTF8" => Ok(Encoding::Utf8),
            _ => Err(UnsupportedEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for Encoding {
    type Error = UnsupportedEncoding;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A message pulled from the subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Decoded payload.
    pub text: String,
    /// Encoding the payload was decoded with.
    pub encoding: Encoding,
}

impl InboundMessage {
    pub(crate) fn decode(bytes: &[u8], encoding: Encoding) -> Self {
        Self {
            text: encoding.decode(bytes),
            encoding,
        }
    }

    /// Take the decoded text, dropping the encoding tag.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Observable lifecycle state of a [`SubscriptionClient`](crate::SubscriptionClient).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No connection is open. The initial state, and the state after
    /// `disconnect` or a failed receive.
    Disconnected,
    /// A connection is open but no topic is subscribed.
    Connected,
    /// A connection and a subscription are open; messages can be received.
    Subscribed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connected => "connected",
            ClientState::Subscribed => "subscribed",
        })
    }
}

/// Client operation, used to report precondition violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// [`SubscriptionClient::connect`](crate::SubscriptionClient::connect)
    Connect,
    /// [`SubscriptionClient::subscribe`](crate::SubscriptionClient::subscribe)
    Subscribe,
    /// [`SubscriptionClient::receive_message`](crate::SubscriptionClient::receive_message)
    Receive,
    /// [`SubscriptionClient::unsubscribe`](crate::SubscriptionClient::unsubscribe)
    Unsubscribe,
    /// [`SubscriptionClient::disconnect`](crate::SubscriptionClient::disconnect)
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Connect => "connect",
            Operation::Subscribe => "subscribe",
            Operation::Receive => "receive",
            Operation::Unsubscribe => "unsubscribe",
            Operation::Disconnect => "disconnect",
        })
    }
}

/// Errors returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: Operation,
        state: ClientState,
    },

    #[error("connect to queue manager {manager} failed: {source}")]
    Connect {
        manager: String,
        source: TransportError,
    },

    #[error("subscribe to topic {topic} failed: {source}")]
    Subscribe {
        topic: String,
        source: TransportError,
    },

    #[error("receive on topic {topic} failed: {source}")]
    Receive {
        topic: String,
        source: TransportError,
    },

    #[error("unsubscribe from topic {topic} failed: {source}")]
    Unsubscribe {
        topic: String,
        source: TransportError,
    },

    #[error("disconnect failed: {source}")]
    Disconnect { source: TransportError },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// True when `unsubscribe`/`disconnect` found nothing left to close.
    pub fn is_already_closed(&self) -> bool {
        matches!(
            self,
            Error::InvalidState {
                operation: Operation::Unsubscribe | Operation::Disconnect,
                ..
            }
        )
    }

    /// The underlying transport failure, if any.
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            Error::Connect { source, .. }
            | Error::Subscribe { source, .. }
            | Error::Receive { source, .. }
            | Error::Unsubscribe { source, .. }
            | Error::Disconnect { source } => Some(source),
            Error::InvalidState { .. } | Error::Config(_) => None,
        }
    }
}

impl From<UnsupportedEncoding> for Error {
    fn from(e: UnsupportedEncoding) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_decodes_plain_bytes() {
        assert_eq!(Encoding::default().decode(&[72, 101, 108, 108, 111]), "Hello");
    }

    #[test]
    fn ascii_replaces_high_bytes() {
        assert_eq!(Encoding::Ascii.decode(&[0x41, 0xE9, 0x42]), "A\u{FFFD}B");
    }

    #[test]
    fn latin1_maps_high_bytes() {
        assert_eq!(Encoding::Latin1.decode(&[0x63, 0x61, 0x66, 0xE9]), "café");
    }

    #[test]
    fn utf8_is_lossy() {
        assert_eq!(Encoding::Utf8.decode("café".as_bytes()), "café");
        assert_eq!(Encoding::Utf8.decode(&[0x61, 0xFF]), "a\u{FFFD}");
    }

    #[test]
    fn empty_payload_decodes_to_empty_text() {
        assert_eq!(Encoding::Ascii.decode(&[]), "");
    }

    #[test]
    fn encoding_names_parse() {
        assert_eq!("ASCII".parse::<Encoding>(), Ok(Encoding::Ascii));
        assert_eq!("us-ascii".parse::<Encoding>(), Ok(Encoding::Ascii));
        assert_eq!("ISO-8859-1".parse::<Encoding>(), Ok(Encoding::Latin1));
        assert_eq!("latin1".parse::<Encoding>(), Ok(Encoding::Latin1));
        assert_eq!("utf_8".parse::<Encoding>(), Ok(Encoding::Utf8));
        assert_eq!(
            "EBCDIC".parse::<Encoding>(),
            Err(UnsupportedEncoding("EBCDIC".to_string()))
        );
    }

    #[test]
    fn encoding_display_round_trips() {
        for enc in [Encoding::Ascii, Encoding::Latin1, Encoding::Utf8] {
            assert_eq!(enc.to_string().parse::<Encoding>(), Ok(enc));
        }
    }

    #[test]
    fn already_closed_only_for_close_operations() {
        let unsub = Error::InvalidState {
            operation: Operation::Unsubscribe,
            state: ClientState::Connected,
        };
        let recv = Error::InvalidState {
            operation: Operation::Receive,
            state: ClientState::Disconnected,
        };
        assert!(unsub.is_already_closed());
        assert!(!recv.is_already_closed());
        assert_eq!(unsub.to_string(), "cannot unsubscribe while connected");
    }
}
