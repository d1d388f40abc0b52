//! Button definitions and the closed set of switcher actions they trigger.
//!
//! On the wire an action is `{"type": "<tag>", "params": {...}}`. Parsing goes
//! through [`RawAction`] so that an unknown tag or a missing parameter is
//! rejected with a validation error naming the offending field, at the point
//! where the action enters the system rather than when it is dispatched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Lowest input volume the switcher accepts, in dB.
pub const MIN_VOLUME_DB: f64 = -100.0;
/// Highest input volume the switcher accepts, in dB.
pub const MAX_VOLUME_DB: f64 = 26.0;

/// Tag of a [`ButtonAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    SwitchScene,
    SetPreviewScene,
    ToggleStream,
    StartStream,
    StopStream,
    ToggleRecord,
    StartRecord,
    StopRecord,
    PauseRecord,
    ResumeRecord,
    ToggleReplayBuffer,
    StartReplayBuffer,
    StopReplayBuffer,
    SaveReplayBuffer,
    ToggleVirtualCam,
    StartVirtualCam,
    StopVirtualCam,
    ToggleStudioMode,
    EnableStudioMode,
    DisableStudioMode,
    TriggerTransition,
    SetCurrentTransition,
    SetTransitionDuration,
    SetInputVolume,
    ToggleInputMute,
    MuteInput,
    UnmuteInput,
    ToggleSourceVisibility,
    ShowSource,
    HideSource,
    SetSourceVisibility,
    ToggleSourceFilter,
    EnableSourceFilter,
    DisableSourceFilter,
    TakeScreenshot,
}

impl ActionKind {
    /// Every recognized tag.
    pub const ALL: [ActionKind; 35] = [
        Self::SwitchScene,
        Self::SetPreviewScene,
        Self::ToggleStream,
        Self::StartStream,
        Self::StopStream,
        Self::ToggleRecord,
        Self::StartRecord,
        Self::StopRecord,
        Self::PauseRecord,
        Self::ResumeRecord,
        Self::ToggleReplayBuffer,
        Self::StartReplayBuffer,
        Self::StopReplayBuffer,
        Self::SaveReplayBuffer,
        Self::ToggleVirtualCam,
        Self::StartVirtualCam,
        Self::StopVirtualCam,
        Self::ToggleStudioMode,
        Self::EnableStudioMode,
        Self::DisableStudioMode,
        Self::TriggerTransition,
        Self::SetCurrentTransition,
        Self::SetTransitionDuration,
        Self::SetInputVolume,
        Self::ToggleInputMute,
        Self::MuteInput,
        Self::UnmuteInput,
        Self::ToggleSourceVisibility,
        Self::ShowSource,
        Self::HideSource,
        Self::SetSourceVisibility,
        Self::ToggleSourceFilter,
        Self::EnableSourceFilter,
        Self::DisableSourceFilter,
        Self::TakeScreenshot,
    ];

    /// Wire tag for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SwitchScene => "switch_scene",
            Self::SetPreviewScene => "set_preview_scene",
            Self::ToggleStream => "toggle_stream",
            Self::StartStream => "start_stream",
            Self::StopStream => "stop_stream",
            Self::ToggleRecord => "toggle_record",
            Self::StartRecord => "start_record",
            Self::StopRecord => "stop_record",
            Self::PauseRecord => "pause_record",
            Self::ResumeRecord => "resume_record",
            Self::ToggleReplayBuffer => "toggle_replay_buffer",
            Self::StartReplayBuffer => "start_replay_buffer",
            Self::StopReplayBuffer => "stop_replay_buffer",
            Self::SaveReplayBuffer => "save_replay_buffer",
            Self::ToggleVirtualCam => "toggle_virtual_cam",
            Self::StartVirtualCam => "start_virtual_cam",
            Self::StopVirtualCam => "stop_virtual_cam",
            Self::ToggleStudioMode => "toggle_studio_mode",
            Self::EnableStudioMode => "enable_studio_mode",
            Self::DisableStudioMode => "disable_studio_mode",
            Self::TriggerTransition => "trigger_transition",
            Self::SetCurrentTransition => "set_current_transition",
            Self::SetTransitionDuration => "set_transition_duration",
            Self::SetInputVolume => "set_input_volume",
            Self::ToggleInputMute => "toggle_input_mute",
            Self::MuteInput => "mute_input",
            Self::UnmuteInput => "unmute_input",
            Self::ToggleSourceVisibility => "toggle_source_visibility",
            Self::ShowSource => "show_source",
            Self::HideSource => "hide_source",
            Self::SetSourceVisibility => "set_source_visibility",
            Self::ToggleSourceFilter => "toggle_source_filter",
            Self::EnableSourceFilter => "enable_source_filter",
            Self::DisableSourceFilter => "disable_source_filter",
            Self::TakeScreenshot => "take_screenshot",
        }
    }

    /// Look up a kind by its wire tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Parameters that must be present for this kind.
    #[must_use]
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::SwitchScene | Self::SetPreviewScene => &["scene_name"],
            Self::SetCurrentTransition => &["transition_name"],
            Self::SetTransitionDuration => &["duration_ms"],
            Self::SetInputVolume => &["input_name", "volume_db"],
            Self::ToggleInputMute | Self::MuteInput | Self::UnmuteInput => &["input_name"],
            Self::ToggleSourceVisibility | Self::ShowSource | Self::HideSource => {
                &["scene_name", "source_name"]
            }
            Self::SetSourceVisibility => &["source_name", "visible"],
            Self::ToggleSourceFilter | Self::EnableSourceFilter | Self::DisableSourceFilter => {
                &["source_name", "filter_name"]
            }
            Self::TakeScreenshot => &["source_name", "file_path"],
            _ => &[],
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Untyped wire form of an action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl RawAction {
    /// Build a raw action from a tag and a JSON object of params.
    #[must_use]
    pub fn new(kind: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { kind: kind.to_string(), params }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneParams {
    pub scene_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionParams {
    pub transition_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionDurationParams {
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputVolumeParams {
    pub input_name: String,
    pub volume_db: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputParams {
    pub input_name: String,
}

/// A source placed in a specific scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneItemParams {
    pub scene_name: String,
    pub source_name: String,
}

/// Absent `scene_name` targets the current program scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVisibilityParams {
    pub scene_name: Option<String>,
    pub source_name: String,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterParams {
    pub source_name: String,
    pub filter_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotParams {
    pub source_name: String,
    pub file_path: String,
}

/// A validated switcher action with one concrete parameter record per tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub enum ButtonAction {
    SwitchScene(SceneParams),
    SetPreviewScene(SceneParams),
    ToggleStream,
    StartStream,
    StopStream,
    ToggleRecord,
    StartRecord,
    StopRecord,
    PauseRecord,
    ResumeRecord,
    ToggleReplayBuffer,
    StartReplayBuffer,
    StopReplayBuffer,
    SaveReplayBuffer,
    ToggleVirtualCam,
    StartVirtualCam,
    StopVirtualCam,
    ToggleStudioMode,
    EnableStudioMode,
    DisableStudioMode,
    TriggerTransition,
    SetCurrentTransition(TransitionParams),
    SetTransitionDuration(TransitionDurationParams),
    SetInputVolume(InputVolumeParams),
    ToggleInputMute(InputParams),
    MuteInput(InputParams),
    UnmuteInput(InputParams),
    ToggleSourceVisibility(SceneItemParams),
    ShowSource(SceneItemParams),
    HideSource(SceneItemParams),
    SetSourceVisibility(SourceVisibilityParams),
    ToggleSourceFilter(FilterParams),
    EnableSourceFilter(FilterParams),
    DisableSourceFilter(FilterParams),
    TakeScreenshot(ScreenshotParams),
}

impl ButtonAction {
    /// Tag of this action.
    #[must_use]
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::SwitchScene(_) => ActionKind::SwitchScene,
            Self::SetPreviewScene(_) => ActionKind::SetPreviewScene,
            Self::ToggleStream => ActionKind::ToggleStream,
            Self::StartStream => ActionKind::StartStream,
            Self::StopStream => ActionKind::StopStream,
            Self::ToggleRecord => ActionKind::ToggleRecord,
            Self::StartRecord => ActionKind::StartRecord,
            Self::StopRecord => ActionKind::StopRecord,
            Self::PauseRecord => ActionKind::PauseRecord,
            Self::ResumeRecord => ActionKind::ResumeRecord,
            Self::ToggleReplayBuffer => ActionKind::ToggleReplayBuffer,
            Self::StartReplayBuffer => ActionKind::StartReplayBuffer,
            Self::StopReplayBuffer => ActionKind::StopReplayBuffer,
            Self::SaveReplayBuffer => ActionKind::SaveReplayBuffer,
            Self::ToggleVirtualCam => ActionKind::ToggleVirtualCam,
            Self::StartVirtualCam => ActionKind::StartVirtualCam,
            Self::StopVirtualCam => ActionKind::StopVirtualCam,
            Self::ToggleStudioMode => ActionKind::ToggleStudioMode,
            Self::EnableStudioMode => ActionKind::EnableStudioMode,
            Self::DisableStudioMode => ActionKind::DisableStudioMode,
            Self::TriggerTransition => ActionKind::TriggerTransition,
            Self::SetCurrentTransition(_) => ActionKind::SetCurrentTransition,
            Self::SetTransitionDuration(_) => ActionKind::SetTransitionDuration,
            Self::SetInputVolume(_) => ActionKind::SetInputVolume,
            Self::ToggleInputMute(_) => ActionKind::ToggleInputMute,
            Self::MuteInput(_) => ActionKind::MuteInput,
            Self::UnmuteInput(_) => ActionKind::UnmuteInput,
            Self::ToggleSourceVisibility(_) => ActionKind::ToggleSourceVisibility,
            Self::ShowSource(_) => ActionKind::ShowSource,
            Self::HideSource(_) => ActionKind::HideSource,
            Self::SetSourceVisibility(_) => ActionKind::SetSourceVisibility,
            Self::ToggleSourceFilter(_) => ActionKind::ToggleSourceFilter,
            Self::EnableSourceFilter(_) => ActionKind::EnableSourceFilter,
            Self::DisableSourceFilter(_) => ActionKind::DisableSourceFilter,
            Self::TakeScreenshot(_) => ActionKind::TakeScreenshot,
        }
    }

    /// The `(scene, source)` pair whose visibility this action drives, if any.
    ///
    /// A `None` scene means "whatever the current program scene is".
    #[must_use]
    pub fn visibility_target(&self) -> Option<(Option<&str>, &str)> {
        match self {
            Self::ToggleSourceVisibility(p) | Self::ShowSource(p) | Self::HideSource(p) => {
                Some((Some(p.scene_name.as_str()), p.source_name.as_str()))
            }
            Self::SetSourceVisibility(p) => Some((p.scene_name.as_deref(), p.source_name.as_str())),
            _ => None,
        }
    }

    /// Parse and validate a raw action.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] naming the offending field when the tag is
    /// unknown or a required parameter is missing or malformed.
    pub fn parse(raw: &RawAction) -> Result<Self> {
        let kind = ActionKind::from_tag(&raw.kind).ok_or_else(|| {
            if raw.kind.is_empty() {
                Error::validation("type", "action type is required")
            } else {
                Error::validation("type", format!("unknown action type '{}'", raw.kind))
            }
        })?;
        let p = Params { map: &raw.params };

        let action = match kind {
            ActionKind::SwitchScene => Self::SwitchScene(SceneParams { scene_name: p.text("scene_name")? }),
            ActionKind::SetPreviewScene => {
                Self::SetPreviewScene(SceneParams { scene_name: p.text("scene_name")? })
            }
            ActionKind::ToggleStream => Self::ToggleStream,
            ActionKind::StartStream => Self::StartStream,
            ActionKind::StopStream => Self::StopStream,
            ActionKind::ToggleRecord => Self::ToggleRecord,
            ActionKind::StartRecord => Self::StartRecord,
            ActionKind::StopRecord => Self::StopRecord,
            ActionKind::PauseRecord => Self::PauseRecord,
            ActionKind::ResumeRecord => Self::ResumeRecord,
            ActionKind::ToggleReplayBuffer => Self::ToggleReplayBuffer,
            ActionKind::StartReplayBuffer => Self::StartReplayBuffer,
            ActionKind::StopReplayBuffer => Self::StopReplayBuffer,
            ActionKind::SaveReplayBuffer => Self::SaveReplayBuffer,
            ActionKind::ToggleVirtualCam => Self::ToggleVirtualCam,
            ActionKind::StartVirtualCam => Self::StartVirtualCam,
            ActionKind::StopVirtualCam => Self::StopVirtualCam,
            ActionKind::ToggleStudioMode => Self::ToggleStudioMode,
            ActionKind::EnableStudioMode => Self::EnableStudioMode,
            ActionKind::DisableStudioMode => Self::DisableStudioMode,
            ActionKind::TriggerTransition => Self::TriggerTransition,
            ActionKind::SetCurrentTransition => Self::SetCurrentTransition(TransitionParams {
                transition_name: p.text("transition_name")?,
            }),
            ActionKind::SetTransitionDuration => Self::SetTransitionDuration(
                TransitionDurationParams { duration_ms: p.millis("duration_ms")? },
            ),
            ActionKind::SetInputVolume => Self::SetInputVolume(InputVolumeParams {
                input_name: p.text("input_name")?,
                volume_db: p.volume_db("volume_db")?,
            }),
            ActionKind::ToggleInputMute => {
                Self::ToggleInputMute(InputParams { input_name: p.text("input_name")? })
            }
            ActionKind::MuteInput => Self::MuteInput(InputParams { input_name: p.text("input_name")? }),
            ActionKind::UnmuteInput => {
                Self::UnmuteInput(InputParams { input_name: p.text("input_name")? })
            }
            ActionKind::ToggleSourceVisibility => Self::ToggleSourceVisibility(p.scene_item()?),
            ActionKind::ShowSource => Self::ShowSource(p.scene_item()?),
            ActionKind::HideSource => Self::HideSource(p.scene_item()?),
            ActionKind::SetSourceVisibility => Self::SetSourceVisibility(SourceVisibilityParams {
                scene_name: p.optional_text("scene_name")?,
                source_name: p.text("source_name")?,
                visible: p.flag("visible")?,
            }),
            ActionKind::ToggleSourceFilter => Self::ToggleSourceFilter(p.filter()?),
            ActionKind::EnableSourceFilter => Self::EnableSourceFilter(p.filter()?),
            ActionKind::DisableSourceFilter => Self::DisableSourceFilter(p.filter()?),
            ActionKind::TakeScreenshot => Self::TakeScreenshot(ScreenshotParams {
                source_name: p.text("source_name")?,
                file_path: p.text("file_path")?,
            }),
        };
        Ok(action)
    }

    /// Convert back to the wire form.
    #[must_use]
    pub fn to_raw(&self) -> RawAction {
        let mut params = Map::new();
        let mut put = |key: &str, value: Value| {
            params.insert(key.to_string(), value);
        };

        match self {
            Self::SwitchScene(p) | Self::SetPreviewScene(p) => put("scene_name", p.scene_name.clone().into()),
            Self::SetCurrentTransition(p) => put("transition_name", p.transition_name.clone().into()),
            Self::SetTransitionDuration(p) => put("duration_ms", p.duration_ms.into()),
            Self::SetInputVolume(p) => {
                put("input_name", p.input_name.clone().into());
                put("volume_db", p.volume_db.into());
            }
            Self::ToggleInputMute(p) | Self::MuteInput(p) | Self::UnmuteInput(p) => {
                put("input_name", p.input_name.clone().into());
            }
            Self::ToggleSourceVisibility(p) | Self::ShowSource(p) | Self::HideSource(p) => {
                put("scene_name", p.scene_name.clone().into());
                put("source_name", p.source_name.clone().into());
            }
            Self::SetSourceVisibility(p) => {
                if let Some(scene) = &p.scene_name {
                    put("scene_name", scene.clone().into());
                }
                put("source_name", p.source_name.clone().into());
                put("visible", p.visible.into());
            }
            Self::ToggleSourceFilter(p) | Self::EnableSourceFilter(p) | Self::DisableSourceFilter(p) => {
                put("source_name", p.source_name.clone().into());
                put("filter_name", p.filter_name.clone().into());
            }
            Self::TakeScreenshot(p) => {
                put("source_name", p.source_name.clone().into());
                put("file_path", p.file_path.clone().into());
            }
            _ => {}
        }

        RawAction { kind: self.kind().as_str().to_string(), params }
    }
}

impl TryFrom<RawAction> for ButtonAction {
    type Error = Error;

    fn try_from(raw: RawAction) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<ButtonAction> for RawAction {
    fn from(action: ButtonAction) -> Self {
        action.to_raw()
    }
}

/// Typed accessors over an action's params map.
struct Params<'a> {
    map: &'a Map<String, Value>,
}

impl Params<'_> {
    fn field(key: &str) -> String {
        format!("params.{key}")
    }

    fn get(&self, key: &str) -> Result<&Value> {
        match self.map.get(key) {
            Some(Value::Null) | None => Err(Error::validation(Self::field(key), "is required")),
            Some(value) => Ok(value),
        }
    }

    fn text(&self, key: &str) -> Result<String> {
        match self.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Ok(s.clone()),
            Value::String(_) => Err(Error::validation(Self::field(key), "must not be empty")),
            _ => Err(Error::validation(Self::field(key), "must be a string")),
        }
    }

    fn optional_text(&self, key: &str) -> Result<Option<String>> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(_) => self.text(key).map(Some),
        }
    }

    /// Numbers arrive either as JSON numbers or as numeric strings.
    fn number(&self, key: &str) -> Result<f64> {
        let value = match self.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::validation(Self::field(key), "must be a number"))
    }

    fn volume_db(&self, key: &str) -> Result<f64> {
        let db = self.number(key)?;
        if (MIN_VOLUME_DB..=MAX_VOLUME_DB).contains(&db) {
            Ok(db)
        } else {
            Err(Error::validation(
                Self::field(key),
                format!("must be between {MIN_VOLUME_DB} and {MAX_VOLUME_DB} dB"),
            ))
        }
    }

    fn millis(&self, key: &str) -> Result<u64> {
        let value = self.number(key)?;
        if value < 0.0 || value.fract() != 0.0 || value > 3_600_000.0 {
            return Err(Error::validation(
                Self::field(key),
                "must be a whole number of milliseconds up to one hour",
            ));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Ok(value as u64)
    }

    fn flag(&self, key: &str) -> Result<bool> {
        match self.get(key)? {
            Value::Bool(b) => Ok(*b),
            Value::String(s) if s == "true" => Ok(true),
            Value::String(s) if s == "false" => Ok(false),
            _ => Err(Error::validation(Self::field(key), "must be a boolean")),
        }
    }

    fn scene_item(&self) -> Result<SceneItemParams> {
        Ok(SceneItemParams { scene_name: self.text("scene_name")?, source_name: self.text("source_name")? })
    }

    fn filter(&self) -> Result<FilterParams> {
        Ok(FilterParams { source_name: self.text("source_name")?, filter_name: self.text("filter_name")? })
    }
}

/// A reusable button in the library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Button {
    /// Unique identifier, fixed at creation
    pub id: String,
    /// Label shown on the button face
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Icon identifier
    #[serde(default)]
    pub icon: String,
    /// Color hex code
    #[serde(default)]
    pub color: String,
    /// What pressing the button does
    pub action: ButtonAction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable content of a button, as submitted by clients.
///
/// The action stays in its raw form here so that the store can report
/// validation failures with a field name instead of a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ButtonDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    pub action: RawAction,
}

impl ButtonDraft {
    /// Convenience constructor used by seeding code and tests.
    #[must_use]
    pub fn new(name: &str, action: &ButtonAction) -> Self {
        Self { name: name.to_string(), action: action.to_raw(), ..Self::default() }
    }

    /// Validate the draft, returning its parsed action.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an empty name or an invalid action.
    pub fn validate(&self) -> Result<ButtonAction> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        ButtonAction::parse(&self.action)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn parse(value: Value) -> Result<ButtonAction> {
        let raw: RawAction = serde_json::from_value(value).expect("raw action shape");
        ButtonAction::parse(&raw)
    }

    #[test]
    fn test_switch_scene_parses() {
        let action = parse(json!({"type": "switch_scene", "params": {"scene_name": "Scene A"}})).unwrap();
        assert_eq!(action, ButtonAction::SwitchScene(SceneParams { scene_name: "Scene A".into() }));
        assert_eq!(action.kind(), ActionKind::SwitchScene);
    }

    #[test]
    fn test_unit_actions_accept_missing_or_empty_params() {
        assert_eq!(parse(json!({"type": "start_stream"})).unwrap(), ButtonAction::StartStream);
        assert_eq!(parse(json!({"type": "toggle_record", "params": {}})).unwrap(), ButtonAction::ToggleRecord);
    }

    #[test]
    fn test_unknown_tag_names_type_field() {
        let err = parse(json!({"type": "launch_rocket"})).unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "type");
    }

    #[test]
    fn test_missing_param_names_field() {
        let err = parse(json!({"type": "set_input_volume", "params": {"input_name": "Mic"}})).unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "params.volume_db");

        let err = parse(json!({"type": "switch_scene", "params": {"scene_name": "  "}})).unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "params.scene_name");
    }

    #[test]
    fn test_volume_accepts_numeric_string() {
        let action =
            parse(json!({"type": "set_input_volume", "params": {"input_name": "Mic", "volume_db": "-6"}})).unwrap();
        assert_matches!(action, ButtonAction::SetInputVolume(ref p) if (p.volume_db + 6.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_volume_out_of_range_rejected() {
        let err =
            parse(json!({"type": "set_input_volume", "params": {"input_name": "Mic", "volume_db": 40}})).unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "params.volume_db");
    }

    #[test]
    fn test_set_source_visibility_scene_is_optional() {
        let action = parse(
            json!({"type": "set_source_visibility", "params": {"source_name": "Cam", "visible": false}}),
        )
        .unwrap();
        assert_eq!(action.visibility_target(), Some((None, "Cam")));

        let err = parse(json!({"type": "set_source_visibility", "params": {"source_name": "Cam", "visible": 3}}))
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref field, .. } if field == "params.visible");
    }

    #[test]
    fn test_every_kind_lists_its_required_params() {
        for kind in ActionKind::ALL {
            let err = ButtonAction::parse(&RawAction { kind: kind.as_str().into(), params: Map::new() });
            match kind.required_params().first() {
                Some(first) => {
                    assert_matches!(err, Err(Error::Validation { ref field, .. }) if field == &format!("params.{first}"));
                }
                None => assert!(err.is_ok(), "{kind} should not need params"),
            }
        }
    }

    #[test]
    fn test_serialized_shape_is_type_and_params() {
        let action = ButtonAction::SetInputVolume(InputVolumeParams { input_name: "Mic".into(), volume_db: -6.0 });
        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(value, json!({"type": "set_input_volume", "params": {"input_name": "Mic", "volume_db": -6.0}}));

        let back: ButtonAction = serde_json::from_value(value).unwrap();
        assert_eq!(back, action);
    }

    #[test]
    fn test_draft_requires_name() {
        let draft = ButtonDraft { name: String::new(), action: RawAction::new("start_stream", json!({})), ..Default::default() };
        assert_matches!(draft.validate(), Err(Error::Validation { ref field, .. }) if field == "name");
    }
}
