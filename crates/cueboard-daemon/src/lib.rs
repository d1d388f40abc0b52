//! Cueboard daemon library.
//!
//! Composes the core components into a running service: action dispatch,
//! status broadcasting, idle session sweeping and IPC request routing.

pub mod broadcaster;
pub mod config;
pub mod daemon;
pub mod dispatcher;
pub mod router;
pub mod signals;
pub mod sweeper;

pub use broadcaster::{BroadcasterConfig, StatusBroadcaster};
pub use config::{Config, load_config};
pub use daemon::Daemon;
pub use dispatcher::ActionDispatcher;
pub use router::{RequestContext, RequestRouter};
pub use sweeper::SessionSweeper;
