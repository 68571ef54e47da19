//! Quietbox server binary.
//!
//! # Usage
//!
//! ```bash
//! # Local development
//! quietbox-server --bind 127.0.0.1:7341
//!
//! # Behind an authenticated tunnel, with a smaller request limit
//! quietbox-server --bind 0.0.0.0:7341 --max-message-size 1048576
//! ```

use clap::Parser;
use quietbox_server::{MemoryStorage, Server, ServerConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Quietbox mailbox server
#[derive(Parser, Debug)]
#[command(name = "quietbox-server")]
#[command(about = "Pseudonymous mailbox server for the quietbox protocol")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "127.0.0.1:7341")]
    bind: String,

    /// Largest request body accepted, in bytes
    #[arg(long, default_value_t = quietbox_proto::MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Largest number of items in one batch request
    #[arg(long, default_value = "4096")]
    max_batch: usize,

    /// Maximum number of stored values (unbounded if omitted)
    #[arg(long)]
    max_entries: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Quietbox server starting");
    tracing::info!("Binding to {}", args.bind);
    tracing::warn!("Transport is unencrypted; run behind an authenticated tunnel");

    let config = ServerConfig {
        bind_address: args.bind,
        max_message_size: args.max_message_size,
        max_batch: args.max_batch,
    };
    let storage = args.max_entries.map_or_else(MemoryStorage::new, MemoryStorage::with_limit);

    let server = Server::bind(config, storage).await?;
    server.run().await?;

    Ok(())
}
