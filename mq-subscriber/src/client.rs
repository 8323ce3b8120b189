//! The subscription lifecycle: connect, subscribe, receive, unsubscribe, disconnect.

use crate::config::ConnectionConfig;
use crate::transport::{Broker, BrokerConnection, BrokerSubscription, SubscribeOptions};
use crate::types::{ClientState, Encoding, Error, InboundMessage, Operation};

/// An open connection and, optionally, the subscription built on it.
struct Session {
    manager: String,
    connection: Box<dyn BrokerConnection>,
    subscription: Option<Subscribed>,
}

struct Subscribed {
    topic: String,
    handle: Box<dyn BrokerSubscription>,
}

/// Caller-driven client for one topic subscription.
///
/// Operations must follow `connect` → `subscribe` → `receive_message`* →
/// `unsubscribe` → `disconnect`. Calling one out of order returns
/// [`Error::InvalidState`] and leaves the client untouched.
///
/// A failed [`receive_message`](Self::receive_message) tears the whole session
/// down; the client is then [`ClientState::Disconnected`] and must reconnect.
/// The same happens when [`subscribe`](Self::subscribe) fails because the
/// link to the broker is gone.
///
/// The client is meant for a single driver task. To stop a pending receive,
/// drop its future (e.g. in `tokio::select!`) and then call
/// [`close`](Self::close).
pub struct SubscriptionClient {
    broker: Box<dyn Broker>,
    encoding: Encoding,
    session: Option<Session>,
}

impl SubscriptionClient {
    /// Create a disconnected client that reaches queue managers through `broker`.
    pub fn new(broker: impl Broker + 'static) -> Self {
        Self {
            broker: Box::new(broker),
            encoding: Encoding::default(),
            session: None,
        }
    }

    /// Payload encoding used by [`receive_message`](Self::receive_message).
    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Encoding applied to received payloads.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Lifecycle state, derived from which handles are currently open.
    pub fn state(&self) -> ClientState {
        match &self.session {
            None => ClientState::Disconnected,
            Some(Session {
                subscription: None, ..
            }) => ClientState::Connected,
            Some(Session {
                subscription: Some(_),
                ..
            }) => ClientState::Subscribed,
        }
    }

    /// Topic of the open subscription, if any.
    pub fn topic(&self) -> Option<&str> {
        self.session
            .as_ref()
            .and_then(|s| s.subscription.as_ref())
            .map(|s| s.topic.as_str())
    }

    fn invalid_state(&self, operation: Operation) -> Error {
        Error::InvalidState {
            operation,
            state: self.state(),
        }
    }

    /// Open a session to the queue manager named in `config`.
    pub async fn connect(&mut self, config: &ConnectionConfig) -> Result<(), Error> {
        if self.session.is_some() {
            return Err(self.invalid_state(Operation::Connect));
        }
        config.validate()?;

        let properties = config.to_properties();
        match self.broker.connect(&config.manager, &properties).await {
            Ok(connection) => {
                tracing::info!(
                    manager = %config.manager,
                    host = %config.host,
                    port = config.port,
                    channel = %config.channel,
                    "Connected"
                );
                self.session = Some(Session {
                    manager: config.manager.clone(),
                    connection,
                    subscription: None,
                });
                Ok(())
            }
            Err(source) => {
                tracing::warn!(manager = %config.manager, error = %source, "Connect failed");
                Err(Error::Connect {
                    manager: config.manager.clone(),
                    source,
                })
            }
        }
    }

    /// Open `topic` as a managed, non-durable subscription.
    ///
    /// A refusal from the broker keeps the client connected. A lost link
    /// closes the session and leaves the client disconnected.
    pub async fn subscribe(&mut self, topic: &str) -> Result<(), Error> {
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidState {
                operation: Operation::Subscribe,
                state,
            });
        };
        if session.subscription.is_some() {
            return Err(Error::InvalidState {
                operation: Operation::Subscribe,
                state,
            });
        }

        let result = session
            .connection
            .open_topic(topic, SubscribeOptions::managed_non_durable())
            .await;
        match result {
            Ok(handle) => {
                tracing::info!(manager = %session.manager, topic, "Subscribed");
                session.subscription = Some(Subscribed {
                    topic: topic.to_string(),
                    handle,
                });
                Ok(())
            }
            Err(source) => {
                if source.is_connection_lost() {
                    tracing::warn!(topic, error = %source, "Subscribe failed, closing session");
                    self.teardown().await;
                } else {
                    tracing::warn!(topic, error = %source, "Subscribe failed");
                }
                Err(Error::Subscribe {
                    topic: topic.to_string(),
                    source,
                })
            }
        }
    }

    /// Wait, without a time limit, for the next message on the subscribed topic.
    ///
    /// On failure the subscription and connection are closed before the
    /// error is returned.
    pub async fn receive_message(&mut self) -> Result<InboundMessage, Error> {
        let state = self.state();
        let Some(Subscribed { topic, handle }) = self
            .session
            .as_mut()
            .and_then(|s| s.subscription.as_mut())
        else {
            return Err(Error::InvalidState {
                operation: Operation::Receive,
                state,
            });
        };

        let result = handle.get().await;
        match result {
            Ok(payload) => {
                tracing::trace!(topic = %topic, bytes = payload.len(), "Message received");
                Ok(InboundMessage::decode(&payload, self.encoding))
            }
            Err(source) => {
                let topic = topic.clone();
                tracing::warn!(topic = %topic, error = %source, "Receive failed, closing session");
                self.teardown().await;
                Err(Error::Receive { topic, source })
            }
        }
    }

    /// Close the subscription, keeping the connection open.
    ///
    /// The subscription handle is released even when closing it fails.
    pub async fn unsubscribe(&mut self) -> Result<(), Error> {
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return Err(Error::InvalidState {
                operation: Operation::Unsubscribe,
                state,
            });
        };
        let Some(mut subscribed) = session.subscription.take() else {
            return Err(Error::InvalidState {
                operation: Operation::Unsubscribe,
                state,
            });
        };

        let result = subscribed.handle.close().await;
        match result {
            Ok(()) => {
                tracing::info!(topic = %subscribed.topic, "Unsubscribed");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(topic = %subscribed.topic, error = %source, "Unsubscribe failed");
                Err(Error::Unsubscribe {
                    topic: subscribed.topic,
                    source,
                })
            }
        }
    }

    /// Close the connection, closing an open subscription first.
    ///
    /// The client is disconnected afterwards whether or not the close succeeded.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        let state = self.state();
        let Some(mut session) = self.session.take() else {
            return Err(Error::InvalidState {
                operation: Operation::Disconnect,
                state,
            });
        };

        if let Some(mut subscribed) = session.subscription.take()
            && let Err(e) = subscribed.handle.close().await
        {
            tracing::warn!(topic = %subscribed.topic, error = %e, "Unsubscribe during disconnect failed");
        }

        match session.connection.close().await {
            Ok(()) => {
                tracing::info!(manager = %session.manager, "Disconnected");
                Ok(())
            }
            Err(source) => {
                tracing::warn!(manager = %session.manager, error = %source, "Disconnect failed");
                Err(Error::Disconnect { source })
            }
        }
    }

    /// Release whatever is open. A no-op when already disconnected.
    pub async fn close(&mut self) -> Result<(), Error> {
        if self.session.is_none() {
            return Ok(());
        }
        self.disconnect().await
    }

    /// Best-effort close for failures that invalidate the session; errors are only logged.
    async fn teardown(&mut self) {
        if let Err(e) = self.disconnect().await {
            tracing::warn!(error = %e, "Session teardown incomplete");
        }
    }
}

impl Drop for SubscriptionClient {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            tracing::error!(
                manager = %session.manager,
                "SubscriptionClient dropped with an open session; call close() before dropping"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
