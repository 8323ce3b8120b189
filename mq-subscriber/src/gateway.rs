//! WebSocket transport: talks to a broker gateway using MessagePack frames.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite;

use crate::protocol::{
    Frame, action, build_close_subscription, build_connect, build_get, build_subscribe,
    decode_frame, encode_frame,
};
use crate::transport::{
    Broker, BrokerConnection, BrokerSubscription, ConnectionProperties, SubscribeOptions,
    TransportError, TransportResult, keys,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub(crate) const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Type aliases for WebSocket split halves
// ---------------------------------------------------------------------------

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

type WsRead = futures_util::stream::SplitStream<WsStream>;
type WsWrite = futures_util::stream::SplitSink<WsStream, tungstenite::Message>;

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn build_ws_url(tls: bool, host: &str, port: i64, channel: &str) -> Result<String, TransportError> {
    let scheme = if tls { "wss" } else { "ws" };
    // IPv6 literals need brackets in the authority.
    let mut u = if host.contains(':') && !host.starts_with('[') {
        url::Url::parse(&format!("{scheme}://[{host}]:{port}/"))?
    } else {
        url::Url::parse(&format!("{scheme}://{host}:{port}/"))?
    };
    u.query_pairs_mut().append_pair("channel", channel);
    Ok(u.to_string())
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// [`Broker`] backed by a WebSocket gateway.
///
/// Host, port and channel are taken from the connection properties; the
/// remaining properties travel to the gateway in the CONNECT frame.
#[derive(Debug, Clone)]
pub struct GatewayBroker {
    tls: bool,
    handshake_timeout: Duration,
}

impl GatewayBroker {
    /// Plain `ws://` with the default handshake timeout.
    pub fn new() -> Self {
        Self {
            tls: false,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    /// Use `wss://` instead of `ws://`.
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Bound on socket setup plus the CONNECT/CONNECTED exchange.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    async fn handshake(
        &self,
        url: &str,
        manager: &str,
        properties: &ConnectionProperties,
    ) -> TransportResult<Link> {
        let (ws, _resp) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws.split();
        let mut link = Link {
            write,
            read,
            closed: false,
        };
        link.request(
            &build_connect(manager, properties.clone().into_inner()),
            action::CONNECTED,
            None,
        )
        .await?;
        Ok(link)
    }
}

impl Default for GatewayBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for GatewayBroker {
    async fn connect(
        &self,
        manager: &str,
        properties: &ConnectionProperties,
    ) -> TransportResult<Box<dyn BrokerConnection>> {
        let host = properties
            .text(keys::HOST_NAME)
            .ok_or(TransportError::MissingProperty(keys::HOST_NAME))?;
        let port = properties
            .int(keys::PORT)
            .ok_or(TransportError::MissingProperty(keys::PORT))?;
        let channel = properties
            .text(keys::CHANNEL)
            .ok_or(TransportError::MissingProperty(keys::CHANNEL))?;
        let url = build_ws_url(self.tls, host, port, channel)?;

        let link = tokio::time::timeout(
            self.handshake_timeout,
            self.handshake(&url, manager, properties),
        )
        .await
        .map_err(|_| {
            TransportError::Timeout(format!(
                "handshake with {host}:{port} after {}ms",
                self.handshake_timeout.as_millis()
            ))
        })??;

        tracing::debug!(manager, host, port, channel, "Gateway session established");
        Ok(Box::new(GatewayConnection {
            link: Arc::new(Mutex::new(link)),
        }))
    }
}

// ---------------------------------------------------------------------------
// Shared socket
// ---------------------------------------------------------------------------

/// One WebSocket shared by a connection and its subscriptions.
struct Link {
    write: WsWrite,
    read: WsRead,
    closed: bool,
}

impl Link {
    async fn send(&mut self, frame: &Frame) -> TransportResult<()> {
        let data = encode_frame(frame)?;
        self.write
            .send(tungstenite::Message::Binary(data.into()))
            .await?;
        Ok(())
    }

    /// Wait for a frame with `want` action (and matching subscription id, if given).
    async fn expect(&mut self, want: i32, subscription_id: Option<u64>) -> TransportResult<Frame> {
        while let Some(frame) = self.read.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    self.closed = true;
                    return Err(e.into());
                }
            };
            match frame {
                tungstenite::Message::Binary(data) => {
                    let msg = decode_frame(&data)?;
                    if msg.action == action::ERROR {
                        let err = msg.error.unwrap_or_default();
                        return Err(TransportError::Broker {
                            reason: err.reason,
                            message: err.message,
                        });
                    }
                    if msg.action == want
                        && (subscription_id.is_none() || msg.subscription_id == subscription_id)
                    {
                        return Ok(msg);
                    }
                    tracing::debug!(
                        action = msg.action,
                        expected = want,
                        "Ignoring unexpected frame"
                    );
                }
                tungstenite::Message::Close(_) => break,
                _ => {
                    // Ignore text, ping, pong frames
                }
            }
        }
        self.closed = true;
        Err(TransportError::ConnectionBroken(
            "gateway closed the socket".to_string(),
        ))
    }

    async fn request(
        &mut self,
        frame: &Frame,
        want: i32,
        subscription_id: Option<u64>,
    ) -> TransportResult<Frame> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.send(frame).await?;
        self.expect(want, subscription_id).await
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

struct GatewayConnection {
    link: Arc<Mutex<Link>>,
}

#[async_trait]
impl BrokerConnection for GatewayConnection {
    async fn open_topic(
        &mut self,
        topic: &str,
        options: SubscribeOptions,
    ) -> TransportResult<Box<dyn BrokerSubscription>> {
        let mut link = self.link.lock().await;
        let reply = link
            .request(&build_subscribe(topic, options), action::SUBSCRIBED, None)
            .await?;
        let id = reply.subscription_id.ok_or_else(|| TransportError::Broker {
            reason: 0,
            message: "SUBSCRIBED frame without subscription id".to_string(),
        })?;
        Ok(Box::new(GatewaySubscription {
            link: Arc::clone(&self.link),
            id,
            closed: false,
        }))
    }

    async fn close(&mut self) -> TransportResult<()> {
        let mut link = self.link.lock().await;
        if link.closed {
            return Err(TransportError::AlreadyClosed);
        }
        let result = link
            .request(&Frame::new(action::DISCONNECT), action::DISCONNECTED, None)
            .await;
        // The socket is finished either way.
        let _ = link.write.close().await;
        link.closed = true;
        result.map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

struct GatewaySubscription {
    link: Arc<Mutex<Link>>,
    id: u64,
    closed: bool,
}

#[async_trait]
impl BrokerSubscription for GatewaySubscription {
    async fn get(&mut self) -> TransportResult<Vec<u8>> {
        if self.closed {
            return Err(TransportError::AlreadyClosed);
        }
        let mut link = self.link.lock().await;
        let reply = link
            .request(
                &build_get(self.id),
                action::MESSAGE,
                Some(self.id),
            )
            .await?;
        Ok(reply.payload.unwrap_or_default())
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::AlreadyClosed);
        }
        self.closed = true;
        let mut link = self.link.lock().await;
        link.request(
            &build_close_subscription(self.id),
            action::SUBSCRIPTION_CLOSED,
            Some(self.id),
        )
        .await
        .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
