//! Server configuration.

use quietbox_proto::MAX_MESSAGE_SIZE;

/// Runtime configuration for the mailbox server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "127.0.0.1:7341")
    pub bind_address: String,
    /// Largest request body accepted, in bytes
    pub max_message_size: usize,
    /// Largest number of items in one batch request
    pub max_batch: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:7341".to_string(),
            max_message_size: MAX_MESSAGE_SIZE,
            max_batch: 4096,
        }
    }
}
