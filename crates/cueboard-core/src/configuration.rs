//! Grid layouts that place library buttons at positions.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::button::ButtonAction;
use crate::error::{Error, Result};

/// Smallest allowed number of rows or columns.
pub const MIN_GRID_SIZE: u32 = 1;
/// Largest allowed number of rows or columns.
pub const MAX_GRID_SIZE: u32 = 10;

/// Button grid size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: u32,
    pub cols: u32,
}

impl GridConfig {
    #[must_use]
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    /// Check that both dimensions are within bounds.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] naming `grid.rows` or `grid.cols`.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [("grid.rows", self.rows), ("grid.cols", self.cols)] {
            if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&value) {
                return Err(Error::validation(
                    field,
                    format!("must be between {MIN_GRID_SIZE} and {MAX_GRID_SIZE}, got {value}"),
                ));
            }
        }
        Ok(())
    }

    /// Whether `position` falls inside this grid.
    #[must_use]
    pub fn contains(&self, position: Position) -> bool {
        position.row < self.rows && position.col < self.cols
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self { rows: 3, cols: 4 }
    }
}

/// Zero-based grid slot. Ordering is row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub row: u32,
    pub col: u32,
}

impl Position {
    #[must_use]
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Canonical `"row-col"` key.
    #[must_use]
    pub fn key(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.row, self.col)
    }
}

impl FromStr for Position {
    type Err = Error;

    /// Accepts `"row-col"` and the older `"btn-row-col"` form.
    fn from_str(key: &str) -> Result<Self> {
        let trimmed = key.strip_prefix("btn-").unwrap_or(key);
        let invalid = || Error::validation(format!("buttons[{key}]"), "position key must look like 'row-col'");

        let (row, col) = trimmed.split_once('-').ok_or_else(invalid)?;
        let row = row.parse::<u32>().map_err(|_| invalid())?;
        let col = col.parse::<u32>().map_err(|_| invalid())?;
        Ok(Self { row, col })
    }
}

/// A named grid layout mapping positions to button ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub grid: GridConfig,
    /// Position key (`"row-col"`) to button id
    #[serde(default)]
    pub buttons: BTreeMap<String, String>,
    #[serde(default)]
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Editable content of a configuration, as submitted by clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub buttons: BTreeMap<String, String>,
    /// `None` keeps the current flag on update and means `false` on create
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_default: Option<bool>,
}

impl ConfigurationDraft {
    #[must_use]
    pub fn new(name: &str, grid: GridConfig) -> Self {
        Self { name: name.to_string(), grid, ..Self::default() }
    }

    /// Mark the draft as the default configuration.
    #[must_use]
    pub fn make_default(mut self) -> Self {
        self.is_default = Some(true);
        self
    }

    /// Place `button_id` at `position`.
    #[must_use]
    pub fn with_button(mut self, position: Position, button_id: &str) -> Self {
        self.buttons.insert(position.key(), button_id.to_string());
        self
    }

    /// Validate the draft and return its placements keyed by canonical position.
    ///
    /// Button ids are not checked against the library: a placement may point
    /// at a button that does not exist (yet, or any more).
    ///
    /// # Errors
    /// Returns [`Error::Validation`] for an empty name, an out-of-range grid,
    /// a malformed or out-of-grid position key, or an empty button id.
    pub fn validate(&self) -> Result<BTreeMap<String, String>> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        self.grid.validate()?;

        let mut placements = BTreeMap::new();
        for (key, button_id) in &self.buttons {
            let position: Position = key.parse()?;
            if !self.grid.contains(position) {
                return Err(Error::validation(
                    format!("buttons[{key}]"),
                    format!("position is outside the {}x{} grid", self.grid.rows, self.grid.cols),
                ));
            }
            if button_id.trim().is_empty() {
                return Err(Error::validation(format!("buttons[{key}]"), "button id must not be empty"));
            }
            if placements.insert(position.key(), button_id.clone()).is_some() {
                return Err(Error::validation(format!("buttons[{key}]"), "position is assigned twice"));
            }
        }
        Ok(placements)
    }
}

/// A configuration expanded into concrete, current button data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfiguration {
    pub id: String,
    pub name: String,
    pub grid: GridConfig,
    /// Row-major order
    pub buttons: Vec<ResolvedButton>,
}

/// A button placed at a concrete grid slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedButton {
    /// Position key of the slot
    pub id: String,
    /// Library id of the placed button
    pub button_id: String,
    pub row: u32,
    pub col: u32,
    pub text: String,
    pub icon: String,
    pub color: String,
    pub action: ButtonAction,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_grid_bounds_inclusive() {
        assert!(GridConfig::new(1, 1).validate().is_ok());
        assert!(GridConfig::new(10, 10).validate().is_ok());
        assert_matches!(
            GridConfig::new(0, 4).validate(),
            Err(Error::Validation { ref field, .. }) if field == "grid.rows"
        );
        assert_matches!(
            GridConfig::new(4, 11).validate(),
            Err(Error::Validation { ref field, .. }) if field == "grid.cols"
        );
    }

    #[test]
    fn test_position_parse_forms() {
        assert_eq!("2-3".parse::<Position>().unwrap(), Position::new(2, 3));
        assert_eq!("btn-0-1".parse::<Position>().unwrap(), Position::new(0, 1));
        assert!("a-b".parse::<Position>().is_err());
        assert!("12".parse::<Position>().is_err());
        assert!("1-2-3".parse::<Position>().is_err());
    }

    #[test]
    fn test_position_orders_row_major() {
        let mut positions = vec![Position::new(1, 0), Position::new(0, 9), Position::new(0, 1)];
        positions.sort();
        assert_eq!(positions, vec![Position::new(0, 1), Position::new(0, 9), Position::new(1, 0)]);
    }

    #[test]
    fn test_draft_rejects_key_outside_grid() {
        let draft = ConfigurationDraft::new("Host", GridConfig::new(2, 2)).with_button(Position::new(2, 0), "btnA");
        assert_matches!(draft.validate(), Err(Error::Validation { ref field, .. }) if field == "buttons[2-0]");
    }

    #[test]
    fn test_draft_normalizes_legacy_keys() {
        let mut draft = ConfigurationDraft::new("Host", GridConfig::new(2, 2));
        draft.buttons.insert("btn-1-1".into(), "btnA".into());
        let placements = draft.validate().unwrap();
        assert_eq!(placements.get("1-1").map(String::as_str), Some("btnA"));
    }

    #[test]
    fn test_draft_rejects_duplicate_slot() {
        let mut draft = ConfigurationDraft::new("Host", GridConfig::new(2, 2));
        draft.buttons.insert("btn-0-0".into(), "btnA".into());
        draft.buttons.insert("0-0".into(), "btnB".into());
        assert!(draft.validate().is_err());
    }

    proptest! {
        #[test]
        fn prop_grid_validation_matches_bounds(rows in 0u32..20, cols in 0u32..20) {
            let valid = (1..=10).contains(&rows) && (1..=10).contains(&cols);
            prop_assert_eq!(GridConfig::new(rows, cols).validate().is_ok(), valid);
        }

        #[test]
        fn prop_position_key_roundtrips(row in 0u32..10, col in 0u32..10) {
            let position = Position::new(row, col);
            prop_assert_eq!(position.key().parse::<Position>().unwrap(), position);
        }
    }
}
