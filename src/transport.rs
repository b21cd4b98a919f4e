use crate::codec;
use crate::error::{Result, SoundbarError};
use crate::frame;
use crate::protocol::{Command, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Connection state of a [`Transport`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Receives everything the receive loop reads from the device
pub trait InboundHandler: Send + Sync + 'static {
    /// A frame was decoded
    fn on_response(&self, response: Response);

    /// The device closed the connection or reading failed
    fn on_closed(&self);
}

/// An open connection
struct Link {
    writer: OwnedWriteHalf,
    reader: JoinHandle<()>,
}

impl Link {
    async fn close(mut self) {
        self.reader.abort();
        let _ = self.writer.shutdown().await;
    }
}

/// State shared with the receive loop
struct Shared {
    state: watch::Sender<LinkState>,
    /// Incremented for every new link so a stale loop cannot mark a newer one closed
    generation: AtomicU64,
}

/// Single TCP connection to one soundbar
pub struct Transport {
    address: String,
    connect_timeout: Duration,
    /// Held for the whole write of a frame, so frames never interleave
    link: Mutex<Option<Link>>,
    shared: Arc<Shared>,
    handler: Arc<dyn InboundHandler>,
}

impl Transport {
    /// Create a disconnected transport for `host:port`
    pub fn new(address: impl Into<String>, connect_timeout: Duration, handler: Arc<dyn InboundHandler>) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            address: address.into(),
            connect_timeout,
            link: Mutex::new(None),
            shared: Arc::new(Shared {
                state,
                generation: AtomicU64::new(0),
            }),
            handler,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn state(&self) -> LinkState {
        *self.shared.state.borrow()
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.shared.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == LinkState::Connected
    }

    /// Connect unless already connected
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.link.lock().await;
        self.connect_locked(&mut link).await
    }

    async fn connect_locked(&self, link: &mut Option<Link>) -> Result<()> {
        if link.is_some() && self.is_connected() {
            return Ok(());
        }
        if let Some(stale) = link.take() {
            stale.close().await;
        }

        tracing::debug!("Connecting to {}", self.address);
        self.shared.state.send_replace(LinkState::Connecting);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.shared.state.send_replace(LinkState::Disconnected);
                return Err(SoundbarError::Connect {
                    address: self.address.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                self.shared.state.send_replace(LinkState::Disconnected);
                return Err(SoundbarError::Connect {
                    address: self.address.clone(),
                    reason: format!("timed out after {:?}", self.connect_timeout),
                });
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Failed to set TCP_NODELAY: {}", e);
        }

        let (reader, writer) = stream.into_split();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        // Mark connected before the loop starts so an immediate close is not overwritten
        self.shared.state.send_replace(LinkState::Connected);
        let reader = tokio::spawn(receive_loop(
            reader,
            self.handler.clone(),
            self.shared.clone(),
            generation,
        ));

        *link = Some(Link { writer, reader });
        tracing::info!("Connected to {}", self.address);
        Ok(())
    }

    /// Close the connection if open. Idempotent.
    pub async fn disconnect(&self) {
        let mut link = self.link.lock().await;
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(open) = link.take() {
            open.close().await;
            tracing::info!("Disconnected from {}", self.address);
        }
        self.shared.state.send_replace(LinkState::Disconnected);
    }

    /// Encode and send a command, reconnecting and resending once on failure
    pub async fn send(&self, command: &Command) -> Result<()> {
        let frame = codec::encode(command)?;
        let mut link = self.link.lock().await;

        match self.write_frame(&mut link, &frame).await {
            Ok(()) => {
                tracing::trace!("Sent {} {:?}", command.msg, command.cmd);
                return Ok(());
            }
            Err(e) => {
                tracing::debug!("Sending {} failed ({}), reconnecting", command.msg, e);
            }
        }

        if let Some(stale) = link.take() {
            stale.close().await;
        }
        self.connect_locked(&mut link)
            .await
            .map_err(|e| SoundbarError::Send(e.to_string()))?;
        self.write_frame(&mut link, &frame)
            .await
            .map_err(|e| SoundbarError::Send(e.to_string()))
    }

    async fn write_frame(&self, link: &mut Option<Link>, frame: &[u8]) -> Result<()> {
        let Some(open) = link.as_mut() else {
            return Err(SoundbarError::ConnectionClosed);
        };
        if !self.is_connected() {
            return Err(SoundbarError::ConnectionClosed);
        }
        open.writer.write_all(frame).await?;
        open.writer.flush().await?;
        Ok(())
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(open) = self.link.get_mut().take() {
            open.reader.abort();
        }
    }
}

/// Read frames until the device closes the connection or an I/O error occurs
async fn receive_loop(
    reader: OwnedReadHalf,
    handler: Arc<dyn InboundHandler>,
    shared: Arc<Shared>,
    generation: u64,
) {
    let mut reader = BufReader::new(reader);

    loop {
        match frame::read_frame(&mut reader).await {
            Ok(Some(payload)) => match codec::decode(&payload) {
                Ok(response) => {
                    tracing::trace!("Received {}", response.msg);
                    handler.on_response(response);
                }
                Err(e) => tracing::warn!("Discarding undecodable frame: {}", e),
            },
            Ok(None) => {
                tracing::info!("Connection closed by device");
                break;
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Discarding malformed frame: {}", e);
            }
            Err(e) => {
                tracing::error!("Receive error: {}", e);
                break;
            }
        }
    }

    if shared.generation.load(Ordering::SeqCst) == generation {
        shared.state.send_replace(LinkState::Disconnected);
        handler.on_closed();
    }
}
