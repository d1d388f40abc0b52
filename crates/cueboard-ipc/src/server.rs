//! IPC server implementation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, info, warn};

use crate::error::IpcResult;
use crate::events::Event;
use crate::messages::{ErrorInfo, Request, Response};

/// Longest accepted request line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Queued events per connection before new ones are dropped.
pub const EVENT_BUFFER: usize = 32;

/// A request read from a client connection.
#[derive(Debug)]
pub struct IncomingRequest {
    pub client_id: u64,
    pub peer: SocketAddr,
    pub request: Request,
    /// Where to send the response
    pub reply: mpsc::Sender<Response>,
    /// Outbound event channel of the connection the request came from
    pub events: mpsc::Sender<Event>,
}

/// Messages from the server to the request handler.
#[derive(Debug)]
pub enum ServerMessage {
    Request(IncomingRequest),
    /// A client connection closed
    Disconnected { client_id: u64 },
}

/// IPC server that listens for client connections.
pub struct IpcServer {
    listener: TcpListener,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    message_tx: mpsc::Sender<ServerMessage>,
}

impl IpcServer {
    /// Create a new IPC server bound to `addr`.
    ///
    /// # Errors
    /// Returns an error if the address cannot be bound.
    pub async fn bind(addr: impl ToSocketAddrs) -> IpcResult<(Self, mpsc::Receiver<ServerMessage>)> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (message_tx, message_rx) = mpsc::channel(64);

        Ok((Self { listener, next_client_id: AtomicU64::new(1), event_tx, message_tx }, message_rx))
    }

    /// Address the server is listening on.
    ///
    /// # Errors
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> IpcResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, %peer, "Client connected");

                    let event_rx = self.event_tx.subscribe();
                    let message_tx = self.message_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(client_id, peer, stream, event_rx, message_tx.clone()).await
                        {
                            error!(client_id, error = %e, "Client error");
                        }
                        let _ = message_tx.send(ServerMessage::Disconnected { client_id }).await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Send an event to every connected client.
    pub fn broadcast(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }

    async fn handle_client(
        client_id: u64,
        peer: SocketAddr,
        stream: TcpStream,
        mut event_rx: broadcast::Receiver<Event>,
        message_tx: mpsc::Sender<ServerMessage>,
    ) -> IpcResult<()> {
        let (reader, writer) = stream.into_split();
        let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
        let mut sink = FramedWrite::new(writer, LinesCodec::new());

        let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);
        let (outbox_tx, mut outbox_rx) = mpsc::channel::<Event>(EVENT_BUFFER);

        loop {
            tokio::select! {
                // Read request from client
                line = lines.next() => {
                    match line {
                        None => {
                            debug!(client_id, "Client disconnected");
                            break;
                        }
                        Some(Ok(line)) if line.trim().is_empty() => {}
                        Some(Ok(line)) => match serde_json::from_str::<Request>(&line) {
                            Ok(request) => {
                                debug!(client_id, request_id = request.id, "Received request");
                                let incoming = IncomingRequest {
                                    client_id,
                                    peer,
                                    request,
                                    reply: response_tx.clone(),
                                    events: outbox_tx.clone(),
                                };
                                if message_tx.send(ServerMessage::Request(incoming)).await.is_err() {
                                    warn!(client_id, "Request handler gone");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(client_id, error = %e, "Invalid request format");
                                let id = serde_json::from_str::<Value>(&line)
                                    .ok()
                                    .and_then(|v| v.get("id").and_then(Value::as_u64))
                                    .unwrap_or(0);
                                let response = Response::err(id, ErrorInfo::invalid_request(e.to_string()));
                                sink.send(serde_json::to_string(&response)?).await?;
                            }
                        },
                        Some(Err(e)) => {
                            warn!(client_id, error = %e, "Read error");
                            break;
                        }
                    }
                }

                // Send response to client
                Some(response) = response_rx.recv() => {
                    sink.send(serde_json::to_string(&response)?).await?;
                }

                // Session events routed to this connection
                Some(event) = outbox_rx.recv() => {
                    sink.send(serde_json::to_string(&event)?).await?;
                }

                // Events for every connection
                event = event_rx.recv() => {
                    match event {
                        Ok(event) => sink.send(serde_json::to_string(&event)?).await?,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(client_id, skipped, "Client lagging behind broadcast events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }

        info!(client_id, "Client handler exiting");
        Ok(())
    }
}
