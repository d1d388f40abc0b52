//! The seam between the connection manager and a concrete switcher.

use async_trait::async_trait;
use cueboard_core::{SwitcherCommand, SwitcherStatus};
use tokio_util::sync::CancellationToken;

use crate::error::SwitcherResult;

/// Opens control sessions against a switcher.
#[async_trait]
pub trait SwitcherBackend: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Open a new, fully handshaken session.
    async fn connect(&self) -> SwitcherResult<Box<dyn SwitcherSession>>;
}

/// One live control session.
///
/// Methods take `&mut self`: callers hold exclusive access for the whole
/// duration of a call, so a multi-request command is never interleaved with
/// another caller's requests.
#[async_trait]
pub trait SwitcherSession: Send {
    /// Carry out one primitive command.
    async fn execute(&mut self, command: &SwitcherCommand) -> SwitcherResult<()>;

    /// Output and scene state. `sources` is left empty.
    async fn status(&mut self) -> SwitcherResult<SwitcherStatus>;

    /// Whether `source` is enabled in `scene`.
    async fn source_visible(&mut self, scene: &str, source: &str) -> SwitcherResult<bool>;

    async fn list_scenes(&mut self) -> SwitcherResult<Vec<String>>;

    async fn list_inputs(&mut self) -> SwitcherResult<Vec<String>>;

    /// Cancelled when the underlying transport goes away.
    fn closed(&self) -> CancellationToken;
}
