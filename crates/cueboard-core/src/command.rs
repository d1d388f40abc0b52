//! Primitive switcher commands.
//!
//! Every button action maps to exactly one command. A command runs as one
//! unit under the connection gate, even when the switcher needs several
//! requests to carry it out (a toggle reads the current value first).

use serde::{Deserialize, Serialize};

use crate::button::ButtonAction;

/// Output controlled by start/stop/toggle commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Output {
    Stream,
    Record,
    ReplayBuffer,
    VirtualCam,
}

/// How to change an on/off setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Switch {
    On,
    Off,
    Toggle,
}

/// A single primitive call against the switcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "command")]
pub enum SwitcherCommand {
    SetProgramScene { scene: String },
    SetPreviewScene { scene: String },
    SetOutput { output: Output, switch: Switch },
    PauseRecord,
    ResumeRecord,
    SaveReplayBuffer,
    SetStudioMode { switch: Switch },
    TriggerStudioTransition,
    SetCurrentTransition { transition: String },
    SetTransitionDuration { duration_ms: u64 },
    SetInputVolume { input: String, volume_db: f64 },
    SetInputMute { input: String, switch: Switch },
    /// `scene` of `None` targets the current program scene
    SetSourceVisibility { scene: Option<String>, source: String, switch: Switch },
    SetSourceFilter { source: String, filter: String, switch: Switch },
    SaveScreenshot { source: String, file_path: String },
}

impl From<&ButtonAction> for SwitcherCommand {
    fn from(action: &ButtonAction) -> Self {
        use ButtonAction as A;

        let output = |output, switch| Self::SetOutput { output, switch };
        let visibility = |scene: &str, source: &str, switch| Self::SetSourceVisibility {
            scene: Some(scene.to_string()),
            source: source.to_string(),
            switch,
        };
        let mute = |input: &str, switch| Self::SetInputMute { input: input.to_string(), switch };
        let filter = |source: &str, name: &str, switch| Self::SetSourceFilter {
            source: source.to_string(),
            filter: name.to_string(),
            switch,
        };

        match action {
            A::SwitchScene(p) => Self::SetProgramScene { scene: p.scene_name.clone() },
            A::SetPreviewScene(p) => Self::SetPreviewScene { scene: p.scene_name.clone() },
            A::ToggleStream => output(Output::Stream, Switch::Toggle),
            A::StartStream => output(Output::Stream, Switch::On),
            A::StopStream => output(Output::Stream, Switch::Off),
            A::ToggleRecord => output(Output::Record, Switch::Toggle),
            A::StartRecord => output(Output::Record, Switch::On),
            A::StopRecord => output(Output::Record, Switch::Off),
            A::PauseRecord => Self::PauseRecord,
            A::ResumeRecord => Self::ResumeRecord,
            A::ToggleReplayBuffer => output(Output::ReplayBuffer, Switch::Toggle),
            A::StartReplayBuffer => output(Output::ReplayBuffer, Switch::On),
            A::StopReplayBuffer => output(Output::ReplayBuffer, Switch::Off),
            A::SaveReplayBuffer => Self::SaveReplayBuffer,
            A::ToggleVirtualCam => output(Output::VirtualCam, Switch::Toggle),
            A::StartVirtualCam => output(Output::VirtualCam, Switch::On),
            A::StopVirtualCam => output(Output::VirtualCam, Switch::Off),
            A::ToggleStudioMode => Self::SetStudioMode { switch: Switch::Toggle },
            A::EnableStudioMode => Self::SetStudioMode { switch: Switch::On },
            A::DisableStudioMode => Self::SetStudioMode { switch: Switch::Off },
            A::TriggerTransition => Self::TriggerStudioTransition,
            A::SetCurrentTransition(p) => Self::SetCurrentTransition { transition: p.transition_name.clone() },
            A::SetTransitionDuration(p) => Self::SetTransitionDuration { duration_ms: p.duration_ms },
            A::SetInputVolume(p) => Self::SetInputVolume { input: p.input_name.clone(), volume_db: p.volume_db },
            A::ToggleInputMute(p) => mute(p.input_name.as_str(), Switch::Toggle),
            A::MuteInput(p) => mute(p.input_name.as_str(), Switch::On),
            A::UnmuteInput(p) => mute(p.input_name.as_str(), Switch::Off),
            A::ToggleSourceVisibility(p) => visibility(p.scene_name.as_str(), p.source_name.as_str(), Switch::Toggle),
            A::ShowSource(p) => visibility(p.scene_name.as_str(), p.source_name.as_str(), Switch::On),
            A::HideSource(p) => visibility(p.scene_name.as_str(), p.source_name.as_str(), Switch::Off),
            A::SetSourceVisibility(p) => Self::SetSourceVisibility {
                scene: p.scene_name.clone(),
                source: p.source_name.clone(),
                switch: if p.visible { Switch::On } else { Switch::Off },
            },
            A::ToggleSourceFilter(p) => filter(p.source_name.as_str(), p.filter_name.as_str(), Switch::Toggle),
            A::EnableSourceFilter(p) => filter(p.source_name.as_str(), p.filter_name.as_str(), Switch::On),
            A::DisableSourceFilter(p) => filter(p.source_name.as_str(), p.filter_name.as_str(), Switch::Off),
            A::TakeScreenshot(p) => {
                Self::SaveScreenshot { source: p.source_name.clone(), file_path: p.file_path.clone() }
            }
        }
    }
}

impl Switch {
    /// Resolve against the current value.
    #[must_use]
    pub fn apply(self, current: bool) -> bool {
        match self {
            Self::On => true,
            Self::Off => false,
            Self::Toggle => !current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::button::{InputVolumeParams, SourceVisibilityParams};

    #[test]
    fn test_volume_maps_to_single_command() {
        let action = ButtonAction::SetInputVolume(InputVolumeParams { input_name: "Mic".into(), volume_db: -6.0 });
        assert_eq!(
            SwitcherCommand::from(&action),
            SwitcherCommand::SetInputVolume { input: "Mic".into(), volume_db: -6.0 }
        );
    }

    #[test]
    fn test_visibility_keeps_optional_scene() {
        let action = ButtonAction::SetSourceVisibility(SourceVisibilityParams {
            scene_name: None,
            source_name: "Cam".into(),
            visible: true,
        });
        assert_eq!(
            SwitcherCommand::from(&action),
            SwitcherCommand::SetSourceVisibility { scene: None, source: "Cam".into(), switch: Switch::On }
        );
    }

    #[test]
    fn test_switch_apply() {
        assert!(Switch::On.apply(false));
        assert!(!Switch::Off.apply(true));
        assert!(Switch::Toggle.apply(false));
        assert!(!Switch::Toggle.apply(true));
    }
}
