//! Topic subscriber for queue-manager style message brokers.
//!
//! A [`SubscriptionClient`] walks one subscription through its lifecycle:
//! connect to a queue manager, open a topic as a managed non-durable
//! subscription, pull messages one at a time, then unsubscribe and disconnect.
//! Every step returns a `Result`; a failed receive closes the session.
//!
//! The network side is pluggable through the [`Broker`] trait family.
//! [`GatewayBroker`] speaks MessagePack frames to a broker gateway over WebSocket.
//!
//! # Example
//! ```no_run
//! # async fn example() -> Result<(), mq_subscriber::Error> {
//! use mq_subscriber::{ConnectionConfig, GatewayBroker, SubscriptionClient};
//!
//! let config = ConnectionConfig::new("broker.local", 1414, "SYSTEM.DEF.SVRCONN", "QM1");
//! let mut client = SubscriptionClient::new(GatewayBroker::new());
//!
//! client.connect(&config).await?;
//! client.subscribe("orders/new").await?;
//! loop {
//!     match client.receive_message().await {
//!         Ok(msg) => println!("got: {}", msg.text),
//!         Err(e) => {
//!             eprintln!("receive failed: {e}");
//!             break;
//!         }
//!     }
//! }
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod config;
mod gateway;
pub mod protocol;
pub mod transport;
mod types;

pub use client::SubscriptionClient;
pub use config::{ConnectionConfig, Settings};
pub use gateway::GatewayBroker;
pub use transport::{
    Broker, BrokerConnection, BrokerSubscription, ConnectionProperties, PropertyValue,
    SubscribeOptions, TransportError, TransportResult,
};
pub use types::{ClientState, Encoding, Error, InboundMessage, Operation, UnsupportedEncoding};
