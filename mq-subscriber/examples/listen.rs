//! Listen on a broker topic and print every message to stdout.
//!
//! ```sh
//! cargo run -p mq-subscriber --example listen -- --config subscriber.yaml
//! ```
//!
//! `subscriber.yaml`:
//! ```yaml
//! connection:
//!   host: broker.local
//!   port: 1414
//!   channel: SYSTEM.DEF.SVRCONN
//!   manager: QM1
//!   user_id: app
//! topic: orders/new
//! encoding: ISO-8859-1
//! ```
//!
//! The password is best passed via `MQ_PASSWORD`. Ctrl-C unsubscribes and disconnects.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use mq_subscriber::{Encoding, GatewayBroker, SubscriptionClient, config};

#[derive(Parser)]
#[command(name = "listen")]
struct Cli {
    /// Path to the subscriber YAML config
    #[arg(long, short)]
    config: PathBuf,
    /// Topic to subscribe to (overrides config)
    #[arg(long, short)]
    topic: Option<String>,
    /// Payload encoding (overrides config)
    #[arg(long, short)]
    encoding: Option<Encoding>,
    /// Queue manager password (overrides config)
    #[arg(long, env = "MQ_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Connect to the gateway over wss://
    #[arg(long)]
    tls: bool,
}

async fn run(cli: Cli) -> Result<(), mq_subscriber::Error> {
    let mut settings = config::load(&cli.config).await?;
    if let Some(topic) = cli.topic {
        settings.topic = topic;
    }
    if let Some(encoding) = cli.encoding {
        settings.encoding = encoding;
    }
    if let Some(password) = cli.password {
        settings.connection.password = Some(password);
    }
    settings.validate()?;

    let broker = GatewayBroker::new().with_tls(cli.tls);
    let mut client = SubscriptionClient::new(broker).with_encoding(settings.encoding);

    client.connect(&settings.connection).await?;
    if let Err(e) = client.subscribe(&settings.topic).await {
        client.close().await?;
        return Err(e);
    }
    eprintln!("listening on '{}' ...", settings.topic);

    let result = loop {
        tokio::select! {
            received = client.receive_message() => match received {
                Ok(msg) => println!("{}", msg.text),
                // The client has already disconnected.
                Err(e) => break Err(e),
            },
            _ = tokio::signal::ctrl_c() => {
                eprintln!("interrupted, closing");
                break Ok(());
            }
        }
    };

    client.close().await?;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
