//! Switcher status snapshots and field-level diffs.

use serde::{Deserialize, Serialize};

/// State of the control connection to the switcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// A `(scene, source)` pair whose visibility is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub scene: String,
    pub source: String,
}

impl SourceKey {
    #[must_use]
    pub fn new(scene: &str, source: &str) -> Self {
        Self { scene: scene.to_string(), source: source.to_string() }
    }
}

/// Visibility of one tracked source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVisibility {
    pub scene: String,
    pub source: String,
    pub visible: bool,
}

/// A field of [`SwitcherStatus`] that can change between snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusField {
    Connected,
    Streaming,
    Recording,
    CurrentScene,
    VirtualCamActive,
    ReplayBufferActive,
    StudioModeActive,
    Sources,
}

/// Transient snapshot of the switcher's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SwitcherStatus {
    pub connected: bool,
    pub streaming: bool,
    pub recording: bool,
    pub current_scene: Option<String>,
    pub virtual_cam_active: bool,
    pub replay_buffer_active: bool,
    pub studio_mode_active: bool,
    /// Sorted by scene, then source
    #[serde(default)]
    pub sources: Vec<SourceVisibility>,
}

impl SwitcherStatus {
    /// The well-formed snapshot served while the switcher is unreachable.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Replace the tracked source visibilities, keeping them sorted.
    #[must_use]
    pub fn with_sources(mut self, sources: impl IntoIterator<Item = (SourceKey, bool)>) -> Self {
        let mut sources: Vec<_> = sources
            .into_iter()
            .map(|(key, visible)| SourceVisibility { scene: key.scene, source: key.source, visible })
            .collect();
        sources.sort_by(|a, b| (&a.scene, &a.source).cmp(&(&b.scene, &b.source)));
        sources.dedup_by(|a, b| a.scene == b.scene && a.source == b.source);
        self.sources = sources;
        self
    }

    /// Cached visibility of a tracked source.
    #[must_use]
    pub fn source_visibility(&self, scene: &str, source: &str) -> Option<bool> {
        self.sources
            .binary_search_by(|s| (s.scene.as_str(), s.source.as_str()).cmp(&(scene, source)))
            .ok()
            .map(|idx| self.sources[idx].visible)
    }

    /// Fields that differ between `previous` and `self`.
    #[must_use]
    pub fn changed_fields(&self, previous: &Self) -> Vec<StatusField> {
        let mut changed = Vec::new();
        if self.connected != previous.connected {
            changed.push(StatusField::Connected);
        }
        if self.streaming != previous.streaming {
            changed.push(StatusField::Streaming);
        }
        if self.recording != previous.recording {
            changed.push(StatusField::Recording);
        }
        if self.current_scene != previous.current_scene {
            changed.push(StatusField::CurrentScene);
        }
        if self.virtual_cam_active != previous.virtual_cam_active {
            changed.push(StatusField::VirtualCamActive);
        }
        if self.replay_buffer_active != previous.replay_buffer_active {
            changed.push(StatusField::ReplayBufferActive);
        }
        if self.studio_mode_active != previous.studio_mode_active {
            changed.push(StatusField::StudioModeActive);
        }
        if self.sources != previous.sources {
            changed.push(StatusField::Sources);
        }
        changed
    }
}

/// Payload of a `status_update` push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Monotonic sequence number of published snapshots
    pub sequence: u64,
    pub changed: Vec<StatusField>,
    pub status: SwitcherStatus,
}
