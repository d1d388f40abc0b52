//! Cueboard IPC - Line-delimited JSON over TCP and client library.
//!
//! This crate defines the protocol spoken between the daemon and its
//! clients, and provides a client library for connecting to the daemon.

pub mod client;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use error::{IpcError, IpcResult};
pub use events::{ChangeKind, ConfigErrorData, ConfigurationChangedData, Event, EventType};
pub use messages::{ErrorInfo, HealthReport, Method, Registered, Request, Response, ServerInfo, SourceVisibilityReply};
pub use server::{IncomingRequest, IpcServer, ServerMessage};

/// Default listen address of the daemon.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
