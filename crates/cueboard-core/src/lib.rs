//! Cueboard Core - Buttons, configurations, sessions and switcher status.
//!
//! This crate holds the domain model and the in-memory components that the
//! daemon composes: the configuration store, the resolver and the session
//! registry.

pub mod button;
pub mod command;
pub mod configuration;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod status;
pub mod store;

pub use button::{ActionKind, Button, ButtonAction, ButtonDraft, RawAction};
pub use command::{Output, Switch, SwitcherCommand};
pub use configuration::{
    Configuration, ConfigurationDraft, GridConfig, Position, ResolvedButton, ResolvedConfiguration,
};
pub use error::{Error, Result};
pub use registry::SessionRegistry;
pub use resolver::{ConfigurationResolver, TrackedSource};
pub use session::{ClientSession, SessionPhase, SessionState};
pub use status::{LinkState, SourceKey, SourceVisibility, StatusField, StatusUpdate, SwitcherStatus};
pub use store::{ConfigurationStore, DeletedConfiguration};
