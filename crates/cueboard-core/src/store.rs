//! In-memory store for buttons and configurations.
//!
//! Buttons and configurations share one lock so that a resolve always sees a
//! consistent pairing of a configuration and the buttons it references.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::button::{Button, ButtonAction, ButtonDraft, InputParams, SceneParams};
use crate::configuration::{Configuration, ConfigurationDraft, GridConfig, Position};
use crate::error::{Error, Result};

/// Buttons placed on the first-run layout, with their slots.
fn starter_buttons() -> Vec<(Position, ButtonDraft)> {
    let starter = |name: &str, description: &str, icon: &str, color: &str, action: ButtonAction| ButtonDraft {
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        color: color.to_string(),
        action: action.to_raw(),
    };
    vec![
        (Position::new(0, 0), starter("Go Live", "Start streaming", "video", "#e74c3c", ButtonAction::StartStream)),
        (
            Position::new(0, 1),
            starter("Stop Stream", "Stop streaming", "stop-circle", "#95a5a6", ButtonAction::StopStream),
        ),
        (Position::new(1, 0), starter("Start Record", "Start recording", "circle", "#e74c3c", ButtonAction::StartRecord)),
        (
            Position::new(1, 1),
            starter("Stop Record", "Stop recording", "stop-circle", "#95a5a6", ButtonAction::StopRecord),
        ),
        (
            Position::new(2, 0),
            starter(
                "Mute Mic",
                "Mute microphone",
                "mic-off",
                "#e67e22",
                ButtonAction::ToggleInputMute(InputParams { input_name: "Mic/Aux".to_string() }),
            ),
        ),
        (
            Position::new(2, 1),
            starter(
                "Scene",
                "Switch to main scene",
                "layout",
                "#3498db",
                ButtonAction::SwitchScene(SceneParams { scene_name: "Scene".to_string() }),
            ),
        ),
    ]
}

/// Buttons and configurations keyed by id.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    pub(crate) buttons: HashMap<String, Button>,
    pub(crate) configurations: HashMap<String, Configuration>,
}

impl Catalog {
    fn clear_default_except(&mut self, keep: &str) {
        for config in self.configurations.values_mut() {
            if config.id != keep {
                config.is_default = false;
            }
        }
    }
}

/// Result of deleting a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DeletedConfiguration {
    pub configuration: Configuration,
    /// Configuration that took over the default flag, if the deleted one held it
    pub promoted: Option<String>,
    /// Default configuration after the deletion, if any
    pub default_id: Option<String>,
}

/// Owns button and configuration definitions.
#[derive(Debug, Default)]
pub struct ConfigurationStore {
    catalog: RwLock<Catalog>,
}

impl ConfigurationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared read access for consistent multi-entity reads.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read()
    }

    /// Create the "Default" configuration and its starter buttons when no
    /// configuration exists yet.
    ///
    /// Starter buttons whose slot lies outside `grid` are still added to the
    /// library but left unplaced. Returns the id of the seeded configuration,
    /// or `None` if the store already held configurations.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if `grid` is out of bounds.
    pub fn seed_default(&self, grid: GridConfig) -> Result<Option<String>> {
        if !self.catalog.read().configurations.is_empty() {
            return Ok(None);
        }
        grid.validate()?;

        let mut draft = ConfigurationDraft::new("Default", grid).make_default();
        draft.description = "Default button layout".to_string();
        for (position, button) in starter_buttons() {
            let button = self.create_button(button)?;
            if grid.contains(position) {
                draft = draft.with_button(position, &button.id);
            }
        }
        let placed = draft.buttons.len();
        let config = self.create_configuration(draft)?;
        info!(config_id = %config.id, rows = grid.rows, cols = grid.cols, placed, "Seeded default configuration");
        Ok(Some(config.id))
    }

    // Buttons

    /// Add a button to the library.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the draft is invalid.
    pub fn create_button(&self, draft: ButtonDraft) -> Result<Button> {
        let action = draft.validate()?;
        let now = Utc::now();
        let button = Button {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            icon: draft.icon,
            color: draft.color,
            action,
            created_at: now,
            updated_at: now,
        };

        self.catalog.write().buttons.insert(button.id.clone(), button.clone());
        debug!(button_id = %button.id, action = %button.action.kind(), "Button created");
        Ok(button)
    }

    /// Replace a button's content, keeping its identity.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an invalid draft or
    /// [`Error::NotFound`] for an unknown id.
    pub fn update_button(&self, id: &str, draft: ButtonDraft) -> Result<Button> {
        let action = draft.validate()?;
        let mut catalog = self.catalog.write();
        let button = catalog.buttons.get_mut(id).ok_or_else(|| Error::not_found("button", id))?;

        button.name = draft.name;
        button.description = draft.description;
        button.icon = draft.icon;
        button.color = draft.color;
        button.action = action;
        button.updated_at = Utc::now();

        debug!(button_id = %id, "Button updated");
        Ok(button.clone())
    }

    /// Remove a button. Configurations that place it keep a dangling reference.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn delete_button(&self, id: &str) -> Result<Button> {
        let removed = self.catalog.write().buttons.remove(id);
        let button = removed.ok_or_else(|| Error::not_found("button", id))?;
        debug!(button_id = %id, "Button deleted");
        Ok(button)
    }

    /// Look up a button.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn get_button(&self, id: &str) -> Result<Button> {
        self.catalog.read().buttons.get(id).cloned().ok_or_else(|| Error::not_found("button", id))
    }

    /// All buttons, ordered by name then id.
    #[must_use]
    pub fn list_buttons(&self) -> Vec<Button> {
        let mut buttons: Vec<_> = self.catalog.read().buttons.values().cloned().collect();
        buttons.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        buttons
    }

    // Configurations

    /// Add a configuration. A draft marked default takes the flag from any
    /// other configuration.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] if the draft is invalid.
    pub fn create_configuration(&self, draft: ConfigurationDraft) -> Result<Configuration> {
        let buttons = draft.validate()?;
        let now = Utc::now();
        let config = Configuration {
            id: Uuid::new_v4().to_string(),
            name: draft.name,
            description: draft.description,
            grid: draft.grid,
            buttons,
            is_default: draft.is_default.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };

        let mut catalog = self.catalog.write();
        if config.is_default {
            catalog.clear_default_except(&config.id);
        }
        catalog.configurations.insert(config.id.clone(), config.clone());
        debug!(config_id = %config.id, is_default = config.is_default, "Configuration created");
        Ok(config)
    }

    /// Replace a configuration's content, keeping its identity.
    ///
    /// A draft without `is_default` keeps the current flag. The default can
    /// only move by marking another configuration default, never by clearing
    /// the flag on the current one.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an invalid draft or an attempt to
    /// clear the default flag, and [`Error::NotFound`] for an unknown id.
    pub fn update_configuration(&self, id: &str, draft: ConfigurationDraft) -> Result<Configuration> {
        let buttons = draft.validate()?;
        let mut catalog = self.catalog.write();
        let was_default = catalog
            .configurations
            .get(id)
            .map(|c| c.is_default)
            .ok_or_else(|| Error::not_found("configuration", id))?;
        let is_default = draft.is_default.unwrap_or(was_default);
        if was_default && !is_default {
            return Err(Error::validation(
                "is_default",
                "the default configuration changes only by making another configuration the default",
            ));
        }
        if is_default && !was_default {
            catalog.clear_default_except(id);
        }

        let config = catalog.configurations.get_mut(id).ok_or_else(|| Error::not_found("configuration", id))?;
        config.name = draft.name;
        config.description = draft.description;
        config.grid = draft.grid;
        config.buttons = buttons;
        config.is_default = is_default;
        config.updated_at = Utc::now();

        debug!(config_id = %id, "Configuration updated");
        Ok(config.clone())
    }

    /// Remove a configuration.
    ///
    /// Removing the default configuration requires `promote`, the id of
    /// another configuration that becomes the new default.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id or promotion target, and
    /// [`Error::Validation`] when the default is deleted without a valid
    /// promotion target.
    pub fn delete_configuration(&self, id: &str, promote: Option<&str>) -> Result<DeletedConfiguration> {
        let mut catalog = self.catalog.write();
        let is_default = catalog
            .configurations
            .get(id)
            .map(|c| c.is_default)
            .ok_or_else(|| Error::not_found("configuration", id))?;

        if is_default {
            let target = promote.ok_or_else(|| {
                Error::validation("is_default", "deleting the default configuration requires promoting another one")
            })?;
            if target == id {
                return Err(Error::validation("promote", "cannot promote the configuration being deleted"));
            }
            let promoted = catalog
                .configurations
                .get_mut(target)
                .ok_or_else(|| Error::not_found("configuration", target))?;
            promoted.is_default = true;
            promoted.updated_at = Utc::now();
            info!(deleted = %id, promoted = %target, "Default configuration promoted");
        }
        let promoted = if is_default { promote.map(str::to_string) } else { None };

        let configuration =
            catalog.configurations.remove(id).ok_or_else(|| Error::not_found("configuration", id))?;
        let default_id = catalog.configurations.values().find(|c| c.is_default).map(|c| c.id.clone());
        debug!(config_id = %id, "Configuration deleted");
        Ok(DeletedConfiguration { configuration, promoted, default_id })
    }

    /// Make `id` the single default configuration.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn set_default(&self, id: &str) -> Result<Configuration> {
        let mut catalog = self.catalog.write();
        if !catalog.configurations.contains_key(id) {
            return Err(Error::not_found("configuration", id));
        }
        catalog.clear_default_except(id);
        let config = catalog.configurations.get_mut(id).ok_or_else(|| Error::not_found("configuration", id))?;
        if !config.is_default {
            config.is_default = true;
            config.updated_at = Utc::now();
        }
        info!(config_id = %id, "Default configuration set");
        Ok(config.clone())
    }

    /// Look up a configuration.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] for an unknown id.
    pub fn get_configuration(&self, id: &str) -> Result<Configuration> {
        self.catalog
            .read()
            .configurations
            .get(id)
            .cloned()
            .ok_or_else(|| Error::not_found("configuration", id))
    }

    /// Whether a configuration with `id` exists.
    #[must_use]
    pub fn contains_configuration(&self, id: &str) -> bool {
        self.catalog.read().configurations.contains_key(id)
    }

    /// The current default configuration, if one is set.
    #[must_use]
    pub fn default_configuration(&self) -> Option<Configuration> {
        self.catalog.read().configurations.values().find(|c| c.is_default).cloned()
    }

    /// All configurations, default first, then by name.
    #[must_use]
    pub fn list_configurations(&self) -> Vec<Configuration> {
        let mut configs: Vec<_> = self.catalog.read().configurations.values().cloned().collect();
        configs.sort_by(|a, b| {
            b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)).then_with(|| a.id.cmp(&b.id))
        });
        configs
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::button::RawAction;

    fn scene_button(store: &ConfigurationStore, name: &str) -> Button {
        let action = ButtonAction::SwitchScene(SceneParams { scene_name: name.into() });
        store.create_button(ButtonDraft::new(name, &action)).unwrap()
    }

    fn default_count(store: &ConfigurationStore) -> usize {
        store.list_configurations().iter().filter(|c| c.is_default).count()
    }

    #[test]
    fn test_create_button_rejects_unknown_action() {
        let store = ConfigurationStore::new();
        let draft = ButtonDraft { name: "Go".into(), action: RawAction::new("explode", json!({})), ..Default::default() };
        assert_matches!(store.create_button(draft), Err(Error::Validation { ref field, .. }) if field == "type");
        assert!(store.list_buttons().is_empty());
    }

    #[test]
    fn test_update_button_keeps_identity() {
        let store = ConfigurationStore::new();
        let button = scene_button(&store, "Intro");
        let draft = ButtonDraft::new("Outro", &ButtonAction::StopStream);

        let updated = store.update_button(&button.id, draft).unwrap();
        assert_eq!(updated.id, button.id);
        assert_eq!(updated.created_at, button.created_at);
        assert_eq!(updated.name, "Outro");
        assert!(updated.updated_at >= button.updated_at);

        assert_matches!(
            store.update_button("missing", ButtonDraft::new("X", &ButtonAction::StopStream)),
            Err(Error::NotFound { kind: "button", .. })
        );
    }

    #[test]
    fn test_delete_button_leaves_configuration_intact() {
        let store = ConfigurationStore::new();
        let button = scene_button(&store, "Intro");
        let config = store
            .create_configuration(
                ConfigurationDraft::new("Host", GridConfig::new(2, 2)).with_button(Position::new(0, 0), &button.id),
            )
            .unwrap();

        store.delete_button(&button.id).unwrap();
        let config = store.get_configuration(&config.id).unwrap();
        assert_eq!(config.buttons.get("0-0"), Some(&button.id));
    }

    #[test]
    fn test_configuration_grid_bounds() {
        let store = ConfigurationStore::new();
        assert!(store.create_configuration(ConfigurationDraft::new("Min", GridConfig::new(1, 1))).is_ok());
        assert!(store.create_configuration(ConfigurationDraft::new("Max", GridConfig::new(10, 10))).is_ok());
        assert_matches!(
            store.create_configuration(ConfigurationDraft::new("Big", GridConfig::new(11, 1))),
            Err(Error::Validation { ref field, .. }) if field == "grid.rows"
        );
    }

    #[test]
    fn test_at_most_one_default() {
        let store = ConfigurationStore::new();
        let mut draft = ConfigurationDraft::new("A", GridConfig::default()).make_default();
        let a = store.create_configuration(draft.clone()).unwrap();
        draft.name = "B".into();
        let b = store.create_configuration(draft).unwrap();

        assert_eq!(default_count(&store), 1);
        assert_eq!(store.default_configuration().unwrap().id, b.id);

        store.set_default(&a.id).unwrap();
        assert_eq!(default_count(&store), 1);
        assert_eq!(store.default_configuration().unwrap().id, a.id);
    }

    #[test]
    fn test_delete_default_requires_promotion() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let other = store.create_configuration(ConfigurationDraft::new("Other", GridConfig::default())).unwrap();

        assert_matches!(
            store.delete_configuration(&default_id, None),
            Err(Error::Validation { ref field, .. }) if field == "is_default"
        );
        assert_matches!(
            store.delete_configuration(&default_id, Some("nope")),
            Err(Error::NotFound { kind: "configuration", .. })
        );
        assert!(store.contains_configuration(&default_id));

        let deleted = store.delete_configuration(&default_id, Some(&other.id)).unwrap();
        assert_eq!(deleted.default_id.as_deref(), Some(other.id.as_str()));
        assert_eq!(default_count(&store), 1);
    }

    #[test]
    fn test_delete_non_default_reports_current_default() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let other = store.create_configuration(ConfigurationDraft::new("Other", GridConfig::default())).unwrap();

        let deleted = store.delete_configuration(&other.id, None).unwrap();
        assert_eq!(deleted.default_id, Some(default_id));
        assert_matches!(store.get_configuration(&other.id), Err(Error::NotFound { .. }));
    }

    #[test]
    fn test_update_without_flag_keeps_default() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let draft: ConfigurationDraft =
            serde_json::from_value(json!({ "name": "Main", "grid": { "rows": 2, "cols": 2 } })).unwrap();
        assert_eq!(draft.is_default, None);

        let renamed = store.update_configuration(&default_id, draft).unwrap();
        assert_eq!(renamed.name, "Main");
        assert!(renamed.is_default);
        assert_eq!(default_count(&store), 1);
        assert_eq!(store.default_configuration().unwrap().id, default_id);
    }

    #[test]
    fn test_update_cannot_clear_default() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let mut draft = ConfigurationDraft::new("Main", GridConfig::default());
        draft.is_default = Some(false);

        assert_matches!(
            store.update_configuration(&default_id, draft),
            Err(Error::Validation { ref field, .. }) if field == "is_default"
        );
        let current = store.get_configuration(&default_id).unwrap();
        assert_eq!(current.name, "Default");
        assert!(current.is_default);
    }

    #[test]
    fn test_update_can_move_default() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let other = store.create_configuration(ConfigurationDraft::new("Other", GridConfig::default())).unwrap();

        let other = store
            .update_configuration(&other.id, ConfigurationDraft::new("Other", GridConfig::default()).make_default())
            .unwrap();
        assert!(other.is_default);
        assert!(!store.get_configuration(&default_id).unwrap().is_default);
        assert_eq!(default_count(&store), 1);
    }

    #[test]
    fn test_delete_reports_promotion_only_for_default() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::default()).unwrap().unwrap();
        let a = store.create_configuration(ConfigurationDraft::new("A", GridConfig::default())).unwrap();
        let b = store.create_configuration(ConfigurationDraft::new("B", GridConfig::default())).unwrap();

        let deleted = store.delete_configuration(&a.id, Some(&b.id)).unwrap();
        assert_eq!(deleted.promoted, None);
        assert_eq!(deleted.default_id.as_deref(), Some(default_id.as_str()));
        assert!(!store.get_configuration(&b.id).unwrap().is_default);

        let deleted = store.delete_configuration(&default_id, Some(&b.id)).unwrap();
        assert_eq!(deleted.promoted.as_deref(), Some(b.id.as_str()));
    }

    #[test]
    fn test_seed_places_starter_buttons() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::new(3, 4)).unwrap().unwrap();
        let config = store.get_configuration(&default_id).unwrap();
        assert_eq!(config.buttons.len(), 6);
        assert_eq!(store.list_buttons().len(), 6);

        let mute = store.get_button(&config.buttons["2-0"]).unwrap();
        assert_eq!(mute.name, "Mute Mic");
        assert_eq!(mute.action, ButtonAction::ToggleInputMute(InputParams { input_name: "Mic/Aux".into() }));
        let live = store.get_button(&config.buttons["0-0"]).unwrap();
        assert_eq!(live.action, ButtonAction::StartStream);
        assert_eq!(live.color, "#e74c3c");
    }

    #[test]
    fn test_seed_skips_slots_outside_small_grid() {
        let store = ConfigurationStore::new();
        let default_id = store.seed_default(GridConfig::new(2, 2)).unwrap().unwrap();
        let config = store.get_configuration(&default_id).unwrap();
        let keys: Vec<_> = config.buttons.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0-0", "0-1", "1-0", "1-1"]);
        assert_eq!(store.list_buttons().len(), 6);

        let empty = ConfigurationStore::new();
        assert!(empty.seed_default(GridConfig::new(0, 4)).is_err());
        assert!(empty.list_buttons().is_empty());
    }

    #[test]
    fn test_seed_only_when_empty() {
        let store = ConfigurationStore::new();
        assert!(store.seed_default(GridConfig::default()).unwrap().is_some());
        assert!(store.seed_default(GridConfig::default()).unwrap().is_none());
        assert_eq!(store.list_configurations().len(), 1);
    }

    #[test]
    fn test_list_puts_default_first() {
        let store = ConfigurationStore::new();
        store.create_configuration(ConfigurationDraft::new("Alpha", GridConfig::default())).unwrap();
        store.seed_default(GridConfig::default()).unwrap();
        // seed is skipped because a configuration already exists
        assert!(store.default_configuration().is_none());

        store.create_configuration(ConfigurationDraft::new("Zulu", GridConfig::default()).make_default()).unwrap();
        let names: Vec<_> = store.list_configurations().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Zulu", "Alpha"]);
    }
}
