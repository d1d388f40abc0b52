//! In-process simulated switcher.
//!
//! Keeps a small model of a production switcher, records every command it
//! receives in order, and can be made slow, drop its connection, or refuse
//! new connections. Used by `backend = "simulated"` and by tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cueboard_core::{Output, SourceKey, Switch, SwitcherCommand, SwitcherStatus};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{SwitcherBackend, SwitcherSession};
use crate::error::{SwitcherError, SwitcherResult};

const CODE_NOT_FOUND: i64 = 600;
const CODE_NOT_ACTIVE: i64 = 501;
const CODE_STUDIO_MODE_OFF: i64 = 506;
const CODE_NOT_READY: i64 = 207;

#[derive(Debug)]
struct SimState {
    scenes: Vec<String>,
    program_scene: String,
    preview_scene: Option<String>,
    /// Input name to `(volume_db, muted)`
    inputs: BTreeMap<String, (f64, bool)>,
    items: HashMap<SourceKey, bool>,
    filters: HashMap<(String, String), bool>,
    transition: String,
    transition_duration_ms: u64,
    streaming: bool,
    recording: bool,
    record_paused: bool,
    replay_buffer: bool,
    virtual_cam: bool,
    studio_mode: bool,
    screenshots: Vec<(String, String)>,

    commands: Vec<SwitcherCommand>,
    delay: Duration,
    in_flight: usize,
    max_in_flight: usize,
    connect_attempts: usize,
    connects: usize,
    refuse: bool,
    reject_status: bool,
    live: Option<CancellationToken>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            scenes: vec!["Scene A".to_string(), "Scene B".to_string()],
            program_scene: "Scene A".to_string(),
            preview_scene: None,
            inputs: BTreeMap::from([("Desktop Audio".to_string(), (0.0, false)), ("Mic".to_string(), (0.0, false))]),
            items: HashMap::new(),
            filters: HashMap::new(),
            transition: "Fade".to_string(),
            transition_duration_ms: 300,
            streaming: false,
            recording: false,
            record_paused: false,
            replay_buffer: false,
            virtual_cam: false,
            studio_mode: false,
            screenshots: Vec::new(),
            commands: Vec::new(),
            delay: Duration::ZERO,
            in_flight: 0,
            max_in_flight: 0,
            connect_attempts: 0,
            connects: 0,
            refuse: false,
            reject_status: false,
            live: None,
        }
    }
}

fn rejected(command: &SwitcherCommand, code: i64, comment: impl Into<String>) -> SwitcherError {
    let request = serde_json::to_value(command)
        .ok()
        .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(str::to_string))
        .unwrap_or_default();
    SwitcherError::Rejected { request, code, comment: comment.into() }
}

impl SimState {
    fn apply(&mut self, command: &SwitcherCommand) -> SwitcherResult<()> {
        match command {
            SwitcherCommand::SetProgramScene { scene } => {
                self.require_scene(command, scene)?;
                self.program_scene.clone_from(scene);
            }
            SwitcherCommand::SetPreviewScene { scene } => {
                if !self.studio_mode {
                    return Err(rejected(command, CODE_STUDIO_MODE_OFF, "Studio mode is not active"));
                }
                self.require_scene(command, scene)?;
                self.preview_scene = Some(scene.clone());
            }
            SwitcherCommand::SetOutput { output, switch } => {
                let flag = match output {
                    Output::Stream => &mut self.streaming,
                    Output::Record => &mut self.recording,
                    Output::ReplayBuffer => &mut self.replay_buffer,
                    Output::VirtualCam => &mut self.virtual_cam,
                };
                *flag = switch.apply(*flag);
                if !self.recording {
                    self.record_paused = false;
                }
            }
            SwitcherCommand::PauseRecord | SwitcherCommand::ResumeRecord => {
                if !self.recording {
                    return Err(rejected(command, CODE_NOT_ACTIVE, "Recording is not active"));
                }
                self.record_paused = matches!(command, SwitcherCommand::PauseRecord);
            }
            SwitcherCommand::SaveReplayBuffer => {
                if !self.replay_buffer {
                    return Err(rejected(command, CODE_NOT_ACTIVE, "Replay buffer is not active"));
                }
            }
            SwitcherCommand::SetStudioMode { switch } => {
                self.studio_mode = switch.apply(self.studio_mode);
                if self.studio_mode && self.preview_scene.is_none() {
                    self.preview_scene = Some(self.program_scene.clone());
                }
            }
            SwitcherCommand::TriggerStudioTransition => {
                if !self.studio_mode {
                    return Err(rejected(command, CODE_STUDIO_MODE_OFF, "Studio mode is not active"));
                }
                if let Some(preview) = self.preview_scene.replace(self.program_scene.clone()) {
                    self.program_scene = preview;
                }
            }
            SwitcherCommand::SetCurrentTransition { transition } => self.transition.clone_from(transition),
            SwitcherCommand::SetTransitionDuration { duration_ms } => self.transition_duration_ms = *duration_ms,
            SwitcherCommand::SetInputVolume { input, volume_db } => {
                let entry = self.input_mut(command, input)?;
                entry.0 = *volume_db;
            }
            SwitcherCommand::SetInputMute { input, switch } => {
                let entry = self.input_mut(command, input)?;
                entry.1 = switch.apply(entry.1);
            }
            SwitcherCommand::SetSourceVisibility { scene, source, switch } => {
                let key = SourceKey::new(scene.as_deref().unwrap_or(self.program_scene.as_str()), source);
                let visible = self
                    .items
                    .get_mut(&key)
                    .ok_or_else(|| rejected(command, CODE_NOT_FOUND, format!("No scene item {source} in {}", key.scene)))?;
                *visible = switch.apply(*visible);
            }
            SwitcherCommand::SetSourceFilter { source, filter, switch } => {
                let enabled = self
                    .filters
                    .get_mut(&(source.clone(), filter.clone()))
                    .ok_or_else(|| rejected(command, CODE_NOT_FOUND, format!("No filter {filter} on {source}")))?;
                *enabled = switch.apply(*enabled);
            }
            SwitcherCommand::SaveScreenshot { source, file_path } => {
                let known = self.scenes.contains(source) || self.inputs.contains_key(source);
                if !known {
                    return Err(rejected(command, CODE_NOT_FOUND, format!("No source {source}")));
                }
                self.screenshots.push((source.clone(), file_path.clone()));
            }
        }
        Ok(())
    }

    fn require_scene(&self, command: &SwitcherCommand, scene: &str) -> SwitcherResult<()> {
        if self.scenes.iter().any(|s| s == scene) {
            Ok(())
        } else {
            Err(rejected(command, CODE_NOT_FOUND, format!("No scene {scene}")))
        }
    }

    fn input_mut(&mut self, command: &SwitcherCommand, input: &str) -> SwitcherResult<&mut (f64, bool)> {
        self.inputs.get_mut(input).ok_or_else(|| rejected(command, CODE_NOT_FOUND, format!("No input {input}")))
    }

    fn status(&self) -> SwitcherStatus {
        SwitcherStatus {
            connected: true,
            streaming: self.streaming,
            recording: self.recording,
            current_scene: Some(self.program_scene.clone()),
            virtual_cam_active: self.virtual_cam,
            replay_buffer_active: self.replay_buffer,
            studio_mode_active: self.studio_mode,
            sources: Vec::new(),
        }
    }
}

/// Handle to a simulated switcher. Clones share the same switcher.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSwitcher {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSwitcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scene.
    #[must_use]
    pub fn with_scene(self, scene: &str) -> Self {
        {
            let mut state = self.state.lock();
            if !state.scenes.iter().any(|s| s == scene) {
                state.scenes.push(scene.to_string());
            }
        }
        self
    }

    /// Add an audio input at 0 dB, unmuted.
    #[must_use]
    pub fn with_input(self, input: &str) -> Self {
        self.state.lock().inputs.entry(input.to_string()).or_insert((0.0, false));
        self
    }

    /// Place `source` in `scene`, adding the scene if needed.
    #[must_use]
    pub fn with_source(self, scene: &str, source: &str, visible: bool) -> Self {
        let this = self.with_scene(scene);
        this.state.lock().items.insert(SourceKey::new(scene, source), visible);
        this
    }

    #[must_use]
    pub fn with_filter(self, source: &str, filter: &str, enabled: bool) -> Self {
        self.state.lock().filters.insert((source.to_string(), filter.to_string()), enabled);
        self
    }

    /// Make every command take `delay` to complete.
    #[must_use]
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    /// Commands received so far, in arrival order.
    #[must_use]
    pub fn commands(&self) -> Vec<SwitcherCommand> {
        self.state.lock().commands.clone()
    }

    /// Highest number of calls ever in progress at once.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.state.lock().max_in_flight
    }

    /// Successful connections so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state.lock().connects
    }

    /// Connection attempts so far, refused ones included.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.lock().connect_attempts
    }

    /// Sever the live session, if any.
    pub fn drop_connection(&self) {
        if let Some(token) = self.state.lock().live.take() {
            debug!("Simulated switcher dropping connection");
            token.cancel();
        }
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Answer status requests with a rejection while keeping the link up.
    pub fn reject_status(&self, reject: bool) {
        self.state.lock().reject_status = reject;
    }

    /// Change the stream state from outside, as an operator at the switcher would.
    pub fn set_streaming(&self, streaming: bool) {
        self.state.lock().streaming = streaming;
    }

    pub fn set_recording(&self, recording: bool) {
        self.state.lock().recording = recording;
    }

    pub fn set_source_visible(&self, scene: &str, source: &str, visible: bool) {
        self.state.lock().items.insert(SourceKey::new(scene, source), visible);
    }

    #[must_use]
    pub fn program_scene(&self) -> String {
        self.state.lock().program_scene.clone()
    }

    #[must_use]
    pub fn input_volume(&self, input: &str) -> Option<f64> {
        self.state.lock().inputs.get(input).map(|(volume, _)| *volume)
    }

    #[must_use]
    pub fn input_muted(&self, input: &str) -> Option<bool> {
        self.state.lock().inputs.get(input).map(|(_, muted)| *muted)
    }

    #[must_use]
    pub fn filter_enabled(&self, source: &str, filter: &str) -> Option<bool> {
        self.state.lock().filters.get(&(source.to_string(), filter.to_string())).copied()
    }

    /// Current transition name and duration in milliseconds.
    #[must_use]
    pub fn transition(&self) -> (String, u64) {
        let state = self.state.lock();
        (state.transition.clone(), state.transition_duration_ms)
    }

    #[must_use]
    pub fn record_paused(&self) -> bool {
        self.state.lock().record_paused
    }

    /// Screenshots taken, as `(source, file_path)`.
    #[must_use]
    pub fn screenshots(&self) -> Vec<(String, String)> {
        self.state.lock().screenshots.clone()
    }
}

#[async_trait]
impl SwitcherBackend for SimulatedSwitcher {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn connect(&self) -> SwitcherResult<Box<dyn SwitcherSession>> {
        let mut state = self.state.lock();
        state.connect_attempts += 1;
        if state.refuse {
            return Err(SwitcherError::ConnectionLost("connection refused".to_string()));
        }
        state.connects += 1;

        let closed = CancellationToken::new();
        if let Some(previous) = state.live.replace(closed.clone()) {
            previous.cancel();
        }
        Ok(Box::new(SimSession { state: Arc::clone(&self.state), closed }))
    }
}

struct SimSession {
    state: Arc<Mutex<SimState>>,
    closed: CancellationToken,
}

/// Counts a call as in progress until dropped.
struct InFlight(Arc<Mutex<SimState>>);

impl InFlight {
    fn enter(state: &Arc<Mutex<SimState>>) -> Self {
        let mut guard = state.lock();
        guard.in_flight += 1;
        guard.max_in_flight = guard.max_in_flight.max(guard.in_flight);
        Self(Arc::clone(state))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.lock().in_flight -= 1;
    }
}

impl SimSession {
    fn check_open(&self) -> SwitcherResult<()> {
        if self.closed.is_cancelled() {
            Err(SwitcherError::ConnectionLost("simulated switcher closed the connection".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SwitcherSession for SimSession {
    async fn execute(&mut self, command: &SwitcherCommand) -> SwitcherResult<()> {
        self.check_open()?;
        let _in_flight = InFlight::enter(&self.state);
        let delay = {
            let mut state = self.state.lock();
            state.commands.push(command.clone());
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.check_open()?;
        self.state.lock().apply(command)
    }

    async fn status(&mut self) -> SwitcherResult<SwitcherStatus> {
        self.check_open()?;
        let _in_flight = InFlight::enter(&self.state);
        let state = self.state.lock();
        if state.reject_status {
            return Err(SwitcherError::Rejected {
                request: "GetStreamStatus".to_string(),
                code: CODE_NOT_READY,
                comment: "Switcher is not ready".to_string(),
            });
        }
        Ok(state.status())
    }

    async fn source_visible(&mut self, scene: &str, source: &str) -> SwitcherResult<bool> {
        self.check_open()?;
        let state = self.state.lock();
        state.items.get(&SourceKey::new(scene, source)).copied().ok_or_else(|| SwitcherError::Rejected {
            request: "GetSceneItemEnabled".to_string(),
            code: CODE_NOT_FOUND,
            comment: format!("No scene item {source} in {scene}"),
        })
    }

    async fn list_scenes(&mut self) -> SwitcherResult<Vec<String>> {
        self.check_open()?;
        Ok(self.state.lock().scenes.clone())
    }

    async fn list_inputs(&mut self) -> SwitcherResult<Vec<String>> {
        self.check_open()?;
        Ok(self.state.lock().inputs.keys().cloned().collect())
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    async fn session(sim: &SimulatedSwitcher) -> Box<dyn SwitcherSession> {
        sim.connect().await.unwrap()
    }

    #[tokio::test]
    async fn test_toggle_and_set_outputs() {
        let sim = SimulatedSwitcher::new();
        let mut s = session(&sim).await;

        s.execute(&SwitcherCommand::SetOutput { output: Output::Stream, switch: Switch::Toggle }).await.unwrap();
        s.execute(&SwitcherCommand::SetOutput { output: Output::Record, switch: Switch::On }).await.unwrap();
        s.execute(&SwitcherCommand::PauseRecord).await.unwrap();

        let status = s.status().await.unwrap();
        assert!(status.streaming);
        assert!(status.recording);
        assert!(sim.record_paused());
        assert_eq!(sim.commands().len(), 3);

        s.execute(&SwitcherCommand::SetOutput { output: Output::Record, switch: Switch::Off }).await.unwrap();
        assert!(!sim.record_paused());
    }

    #[tokio::test]
    async fn test_transition_settings() {
        let sim = SimulatedSwitcher::new();
        let mut s = session(&sim).await;

        s.execute(&SwitcherCommand::SetCurrentTransition { transition: "Cut".into() }).await.unwrap();
        s.execute(&SwitcherCommand::SetTransitionDuration { duration_ms: 750 }).await.unwrap();
        assert_eq!(sim.transition(), ("Cut".to_string(), 750));
    }

    #[tokio::test]
    async fn test_unknown_scene_is_rejected_but_recorded() {
        let sim = SimulatedSwitcher::new();
        let mut s = session(&sim).await;
        let command = SwitcherCommand::SetProgramScene { scene: "Nope".into() };

        assert_matches!(
            s.execute(&command).await,
            Err(SwitcherError::Rejected { ref request, code: CODE_NOT_FOUND, .. }) if request == "set_program_scene"
        );
        assert_eq!(sim.commands(), vec![command]);
        assert_eq!(sim.program_scene(), "Scene A");
    }

    #[tokio::test]
    async fn test_visibility_defaults_to_program_scene() {
        let sim = SimulatedSwitcher::new().with_source("Scene A", "Cam", false);
        let mut s = session(&sim).await;

        s.execute(&SwitcherCommand::SetSourceVisibility { scene: None, source: "Cam".into(), switch: Switch::Toggle })
            .await
            .unwrap();
        assert!(s.source_visible("Scene A", "Cam").await.unwrap());
    }

    #[tokio::test]
    async fn test_studio_transition_swaps_scenes() {
        let sim = SimulatedSwitcher::new();
        let mut s = session(&sim).await;

        assert!(s.execute(&SwitcherCommand::TriggerStudioTransition).await.is_err());
        s.execute(&SwitcherCommand::SetStudioMode { switch: Switch::On }).await.unwrap();
        s.execute(&SwitcherCommand::SetPreviewScene { scene: "Scene B".into() }).await.unwrap();
        s.execute(&SwitcherCommand::TriggerStudioTransition).await.unwrap();
        assert_eq!(sim.program_scene(), "Scene B");
    }

    #[tokio::test]
    async fn test_dropped_session_fails_with_connection_loss() {
        let sim = SimulatedSwitcher::new();
        let mut s = session(&sim).await;
        let closed = s.closed();

        sim.drop_connection();
        assert!(closed.is_cancelled());
        let err = s.status().await.unwrap_err();
        assert!(err.is_connection_loss());
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let sim = SimulatedSwitcher::new();
        sim.refuse_connections(true);
        assert!(sim.connect().await.is_err());
        assert_eq!(sim.connect_attempts(), 1);
        assert_eq!(sim.connect_count(), 0);
    }
}
