//! Tokio TCP runtime.
//!
//! Each connection carries a sequence of frames, each a u32 big-endian length
//! followed by a CBOR request. Every request gets exactly one response frame
//! in the same format. Connections are served by independent tasks sharing
//! one handler.

use std::{io, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    config::ServerConfig, error::ServerError, handler::MailboxServer, storage::MailboxStorage,
};

/// Bound mailbox server.
pub struct Server<S: MailboxStorage> {
    listener: TcpListener,
    handler: Arc<MailboxServer<S>>,
    max_message_size: usize,
}

impl<S: MailboxStorage> Server<S> {
    /// Bind to `config.bind_address`.
    pub async fn bind(config: ServerConfig, storage: S) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address)
            .await
            .map_err(|e| ServerError::Config(format!("cannot bind {}: {e}", config.bind_address)))?;

        Ok(Self {
            listener,
            handler: Arc::new(MailboxServer::with_config(storage, &config)),
            max_message_size: config.max_message_size,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = Arc::clone(&self.handler);
                    let max = self.max_message_size;

                    tokio::spawn(async move {
                        tracing::debug!("New connection: {}", peer);
                        if let Err(e) = handle_connection(stream, handler, max).await {
                            tracing::debug!("Connection error from {}: {}", peer, e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {}", e);
                },
            }
        }
    }
}

/// Serve frames on one connection until the peer closes it.
async fn handle_connection<S: MailboxStorage>(
    mut stream: TcpStream,
    handler: Arc<MailboxServer<S>>,
    max_message_size: usize,
) -> Result<(), ServerError> {
    stream.set_nodelay(true)?;

    loop {
        let len = match stream.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if len > max_message_size {
            return Err(ServerError::Protocol(format!(
                "frame of {len} bytes exceeds limit of {max_message_size}"
            )));
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await?;

        let reply = handler.handle_bytes(&body)?;
        let reply_len = u32::try_from(reply.len())
            .map_err(|_| ServerError::Protocol("response exceeds u32 length".to_string()))?;

        stream.write_u32(reply_len).await?;
        stream.write_all(&reply).await?;
        stream.flush().await?;
    }
}
