//! In-process transport wired straight into a [`MailboxServer`].

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use quietbox_core::Transport;
use quietbox_server::{MailboxServer, MailboxStorage, MemoryStorage};
use tracing::debug;

/// Transport that hands request bytes to a server handler in the same
/// process.
///
/// Clones share the server and the link state, so one clone can be given to
/// a client while the test keeps another to flip the link or count requests.
#[derive(Clone)]
pub struct LoopbackTransport<S: MailboxStorage = MemoryStorage> {
    server: MailboxServer<S>,
    online: Arc<AtomicBool>,
    requests: Arc<AtomicUsize>,
}

impl LoopbackTransport<MemoryStorage> {
    /// Loopback to a fresh in-memory server.
    pub fn new() -> Self {
        Self::with_server(MailboxServer::new(MemoryStorage::new()))
    }
}

impl Default for LoopbackTransport<MemoryStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: MailboxStorage> LoopbackTransport<S> {
    /// Loopback to an existing server.
    pub fn with_server(server: MailboxServer<S>) -> Self {
        Self {
            server,
            online: Arc::new(AtomicBool::new(true)),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The server behind the link.
    pub fn server(&self) -> &MailboxServer<S> {
        &self.server
    }

    /// Bring the link up or down. A down link fails every exchange with
    /// `NotConnected`.
    pub fn set_online(&self, online: bool) {
        debug!(online, "loopback link toggled");
        self.online.store(online, Ordering::SeqCst);
    }

    /// Exchanges that reached the server.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl<S: MailboxStorage> Transport for LoopbackTransport<S> {
    fn transceive(&mut self, request: &[u8]) -> io::Result<Vec<u8>> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "loopback link is down"));
        }

        self.requests.fetch_add(1, Ordering::SeqCst);
        self.server.handle_bytes(request).map_err(|e| io::Error::other(e.to_string()))
    }
}
