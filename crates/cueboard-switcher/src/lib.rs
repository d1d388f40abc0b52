//! Cueboard Switcher - Control connection to the production switcher.
//!
//! [`SwitcherConnection`] owns the single session to the switcher, gates
//! every call through it and keeps it alive with a reconnect loop. Concrete
//! switchers plug in through [`SwitcherBackend`].

pub mod backend;
pub mod connection;
pub mod error;
pub mod obs;
pub mod sim;

pub use backend::{SwitcherBackend, SwitcherSession};
pub use connection::{Backoff, ConnectionConfig, SwitcherConnection};
pub use error::{SwitcherError, SwitcherResult};
pub use obs::ObsBackend;
pub use sim::SimulatedSwitcher;
