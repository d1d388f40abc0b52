//! IPC client implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, error, warn};

use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Method, Request, Response};
use crate::server::MAX_LINE_LENGTH;

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Events buffered for the caller before new ones are dropped.
const EVENT_BUFFER: usize = 64;

/// IPC client for connecting to the Cueboard daemon.
pub struct IpcClient {
    writer: Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
    next_id: AtomicU64,
    pending: Pending,
    event_rx: mpsc::Receiver<Event>,
}

impl IpcClient {
    /// Connect to the daemon at `addr`.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(addr: impl ToSocketAddrs) -> IpcResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        // Spawn reader task
        let pending_clone = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

            while let Some(line) = lines.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                };
                // Try to parse as response first
                if let Ok(response) = serde_json::from_str::<Response>(&line) {
                    if let Some(tx) = pending_clone.lock().await.remove(&response.id) {
                        let _ = tx.send(response);
                    }
                }
                // Then as event. A caller that stops draining events loses
                // them but keeps getting responses.
                else if let Ok(event) = serde_json::from_str::<Event>(&line) {
                    if let Err(TrySendError::Full(event)) = event_tx.try_send(event) {
                        warn!(event = ?event.event, "Event buffer full, dropping event");
                    }
                } else {
                    warn!("Unknown message format");
                }
            }
            debug!("Connection closed");
            pending_clone.lock().await.clear();
        });

        Ok(Self {
            writer: Mutex::new(FramedWrite::new(writer, LinesCodec::new())),
            next_id: AtomicU64::new(1),
            pending,
            event_rx,
        })
    }

    /// Send a request and wait for a response.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent or the connection
    /// closes before the response arrives.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, method };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let json = serde_json::to_string(&request)?;
        self.writer.lock().await.send(json).await?;

        rx.await.map_err(|_| IpcError::ConnectionClosed)
    }

    /// Send a request and decode its successful result.
    ///
    /// # Errors
    /// Returns [`IpcError::Server`] when the daemon answers with an error.
    pub async fn call<T: DeserializeOwned>(&self, method: Method) -> IpcResult<T> {
        let response = self.request(method).await?;
        let value = response.result.map_err(IpcError::Server)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Get the event receiver for incoming events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }
}
