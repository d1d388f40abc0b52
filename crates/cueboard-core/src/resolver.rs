//! Expands configurations into concrete button grids.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::configuration::{Position, ResolvedButton, ResolvedConfiguration};
use crate::error::{Error, Result};
use crate::store::ConfigurationStore;

/// A source whose visibility some placed button drives.
///
/// `scene` of `None` follows the current program scene.
pub type TrackedSource = (Option<String>, String);

/// Turns a configuration id into the grid a client renders.
#[derive(Debug, Clone)]
pub struct ConfigurationResolver {
    store: Arc<ConfigurationStore>,
}

impl ConfigurationResolver {
    #[must_use]
    pub fn new(store: Arc<ConfigurationStore>) -> Self {
        Self { store }
    }

    /// Resolve `config_id` against the current button library.
    ///
    /// Placements whose button no longer exists are skipped. Buttons come back
    /// in row-major order. The configuration and the buttons are read under
    /// one lock, so a concurrent edit is either fully visible or not at all.
    ///
    /// # Errors
    /// Returns [`Error::NotFound`] if the configuration does not exist.
    pub fn resolve(&self, config_id: &str) -> Result<ResolvedConfiguration> {
        let catalog = self.store.read();
        let config =
            catalog.configurations.get(config_id).ok_or_else(|| Error::not_found("configuration", config_id))?;

        let mut placed: Vec<(Position, ResolvedButton)> = Vec::with_capacity(config.buttons.len());
        for (key, button_id) in &config.buttons {
            let Ok(position) = key.parse::<Position>() else {
                debug!(config_id, key = %key, "Skipping malformed position key");
                continue;
            };
            let Some(button) = catalog.buttons.get(button_id) else {
                debug!(config_id, button_id = %button_id, position = %position, "Skipping dangling button reference");
                continue;
            };

            placed.push((
                position,
                ResolvedButton {
                    id: position.key(),
                    button_id: button.id.clone(),
                    row: position.row,
                    col: position.col,
                    text: button.name.clone(),
                    icon: button.icon.clone(),
                    color: button.color.clone(),
                    action: button.action.clone(),
                },
            ));
        }
        placed.sort_by_key(|(position, _)| *position);

        Ok(ResolvedConfiguration {
            id: config.id.clone(),
            name: config.name.clone(),
            grid: config.grid,
            buttons: placed.into_iter().map(|(_, b)| b).collect(),
        })
    }

    /// Sources driven by visibility buttons placed in any configuration.
    #[must_use]
    pub fn tracked_sources(&self) -> BTreeSet<TrackedSource> {
        let catalog = self.store.read();
        catalog
            .configurations
            .values()
            .flat_map(|config| config.buttons.values())
            .filter_map(|button_id| catalog.buttons.get(button_id))
            .filter_map(|button| button.action.visibility_target())
            .map(|(scene, source)| (scene.map(str::to_string), source.to_string()))
            .collect()
    }
}
