//! Unix domain socket server for IPC
//!
//! Provides request-response communication and pushes mute change
//! notifications to subscribed clients, in the order they were accepted.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::control::ControlError;
use crate::events::ChangeEvent;
use crate::reconcile::Subscription;
use crate::service::MuteService;

use super::protocol::{Notification, Request, Response};

const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// A decoded request, or the reason it couldn't be decoded
type Incoming = std::result::Result<Request, serde_json::Error>;

/// Aborts the wrapped task when dropped, including when the owning
/// future is cancelled
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    service: Arc<MuteService>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, service: Arc<MuteService>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            service,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let service = Arc::clone(&self.service);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, service) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, service: Arc<MuteService>) -> Result<()> {
        let (mut reader, mut writer) = stream.into_split();

        // Frames are read on their own task so a half-read frame is never
        // dropped when a notification wins the select below
        let (request_tx, mut requests) = mpsc::channel::<Incoming>(8);
        let _reader = AbortOnDrop(tokio::spawn(async move {
            loop {
                match Self::read_message(&mut reader).await {
                    Ok(Some(incoming)) => {
                        if request_tx.send(incoming).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(?e, "failed to read from client");
                        break;
                    }
                }
            }
        }));

        Self::serve(&mut writer, &mut requests, &service).await
    }

    async fn serve(
        writer: &mut OwnedWriteHalf,
        requests: &mut mpsc::Receiver<Incoming>,
        service: &MuteService,
    ) -> Result<()> {
        let mut subscription: Option<Subscription> = None;

        loop {
            tokio::select! {
                incoming = requests.recv() => {
                    let request = match incoming {
                        Some(Ok(request)) => request,
                        Some(Err(e)) => {
                            let response = Response::Error {
                                code: "bad_request".to_string(),
                                message: e.to_string(),
                            };
                            Self::send_message(writer, &response).await?;
                            continue;
                        }
                        None => {
                            debug!("client disconnected");
                            return Ok(());
                        }
                    };

                    debug!(?request, "received request");

                    let (response, subscribe) = Self::process_request(request, service);
                    if subscribe && subscription.is_none() {
                        subscription = Some(service.subscribe());
                        debug!("client subscribed to notifications");
                    }

                    Self::send_message(writer, &response).await?;
                }

                Some(event) = next_event(&mut subscription) => {
                    Self::send_message(writer, &Notification::from(event)).await?;
                }
            }
        }
    }

    /// Read one length-prefixed frame. `None` on clean disconnect.
    async fn read_message(reader: &mut OwnedReadHalf) -> Result<Option<Incoming>> {
        let mut len_buf = [0u8; 4];

        // Read message length (4-byte little-endian)
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_LEN {
            warn!(len, "message too large, disconnecting");
            return Ok(None);
        }

        // Read message body
        let mut msg_buf = vec![0u8; len];
        reader.read_exact(&mut msg_buf).await?;

        Ok(Some(serde_json::from_slice(&msg_buf)))
    }

    /// Send a length-prefixed JSON message
    async fn send_message<T: serde::Serialize>(writer: &mut OwnedWriteHalf, msg: &T) -> Result<()> {
        let msg_bytes = serde_json::to_vec(msg)?;
        let msg_len = (msg_bytes.len() as u32).to_le_bytes();

        writer.write_all(&msg_len).await?;
        writer.write_all(&msg_bytes).await?;

        Ok(())
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    fn process_request(request: Request, service: &MuteService) -> (Response, bool) {
        let control = service.control();

        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => (Response::Status(service.status().into()), false),

            Request::Query => (Response::MuteState { muted: control.query() }, false),

            Request::Toggle => match control.toggle() {
                Ok(muted) => (Response::MuteState { muted }, false),
                Err(e) => (control_error(&e), false),
            },

            Request::SetMuted { muted } => match control.set(muted) {
                Ok(_) => (Response::MuteState { muted: control.query() }, false),
                Err(e) => (control_error(&e), false),
            },

            Request::ListDevices => {
                let registry = service.registry();
                let response = Response::Devices {
                    devices: registry.devices(),
                    binding: registry.binding(),
                };
                (response, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

fn control_error(error: &ControlError) -> Response {
    let code = match error {
        ControlError::SetFailure { .. } => "set_failed",
    };
    Response::Error {
        code: code.to_string(),
        message: error.to_string(),
    }
}

/// Next event for a subscribed client; never resolves otherwise
async fn next_event(subscription: &mut Option<Subscription>) -> Option<ChangeEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
