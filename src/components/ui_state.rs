// ============================================================================
// UI FLAGS — active tab, panel sizes, accordion / expander state
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistError;

/// Current persisted schema version.
pub const UI_STATE_VERSION: u64 = 2;

pub const LEFT_PANEL_MIN_SIZE_PX: u32 = 400;
pub const LEFT_PANEL_MIN_SIZE_PCT: u32 = 20;
pub const RIGHT_PANEL_MIN_SIZE_PX: u32 = 390;
pub const RIGHT_PANEL_MIN_SIZE_PCT: u32 = 20;

pub const TABS_WITH_LEFT_PANEL: &[TabName] = &[TabName::Generation, TabName::Upscaling, TabName::Workflows];
pub const TABS_WITH_RIGHT_PANEL: &[TabName] =
    &[TabName::Generation, TabName::Upscaling, TabName::Workflows, TabName::Gallery];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabName {
    #[default]
    Generation,
    Canvas,
    Upscaling,
    Workflows,
    Models,
    Queue,
    Gallery,
}

impl TabName {
    pub fn all() -> &'static [TabName] {
        &[
            TabName::Generation,
            TabName::Canvas,
            TabName::Upscaling,
            TabName::Workflows,
            TabName::Models,
            TabName::Queue,
            TabName::Gallery,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            TabName::Generation => "generation",
            TabName::Canvas => "canvas",
            TabName::Upscaling => "upscaling",
            TabName::Workflows => "workflows",
            TabName::Models => "models",
            TabName::Queue => "queue",
            TabName::Gallery => "gallery",
        }
    }
}

/// Layout flags.  Missing fields take their defaults on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiState {
    #[serde(rename = "_version")]
    pub version: u64,
    pub active_tab: TabName,
    /// Never persisted; resets on every load.
    #[serde(skip)]
    pub should_show_image_details: bool,
    pub should_show_progress_in_viewer: bool,
    /// Panel name → size string (e.g. "25%", "400px")
    pub panels: BTreeMap<String, String>,
    pub accordions: BTreeMap<String, bool>,
    pub expanders: BTreeMap<String, bool>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            version: UI_STATE_VERSION,
            active_tab: TabName::Generation,
            should_show_image_details: false,
            should_show_progress_in_viewer: true,
            panels: BTreeMap::new(),
            accordions: BTreeMap::new(),
            expanders: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum UiAction {
    SetActiveTab(TabName),
    SetShouldShowImageDetails(bool),
    SetShouldShowProgressInViewer(bool),
    PanelsChanged { name: String, value: String },
    AccordionStateChanged { id: String, is_open: bool },
    ExpanderStateChanged { id: String, is_open: bool },
    /// Raised by the workflow editor; jumps to the workflows tab.
    WorkflowLoadRequested,
}

impl UiState {
    /// Apply a single action.  Each setter touches exactly one field; map
    /// setters insert or overwrite one key.
    pub fn reduce(&mut self, action: &UiAction) {
        match action {
            UiAction::SetActiveTab(tab) => self.active_tab = *tab,
            UiAction::SetShouldShowImageDetails(v) => self.should_show_image_details = *v,
            UiAction::SetShouldShowProgressInViewer(v) => self.should_show_progress_in_viewer = *v,
            UiAction::PanelsChanged { name, value } => {
                self.panels.insert(name.clone(), value.clone());
            }
            UiAction::AccordionStateChanged { id, is_open } => {
                self.accordions.insert(id.clone(), *is_open);
            }
            UiAction::ExpanderStateChanged { id, is_open } => {
                self.expanders.insert(id.clone(), *is_open);
            }
            UiAction::WorkflowLoadRequested => self.active_tab = TabName::Workflows,
        }
    }

    /// Apply a batch dispatched together.  A workflow load request wins over
    /// any other tab change in the same batch, whatever its position.
    pub fn apply_batch(&mut self, actions: &[UiAction]) {
        for action in actions {
            self.reduce(action);
        }
        if actions.contains(&UiAction::WorkflowLoadRequested) {
            self.active_tab = TabName::Workflows;
        }
    }

    pub fn with_left_panel(&self) -> bool {
        TABS_WITH_LEFT_PANEL.contains(&self.active_tab)
    }

    pub fn with_right_panel(&self) -> bool {
        TABS_WITH_RIGHT_PANEL.contains(&self.active_tab)
    }

    // ---- persistence ----------------------------------------------------

    /// Persisted form.  `shouldShowImageDetails` is left out.
    pub fn to_persisted(&self) -> Result<Value, PersistError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Migrate a persisted value and merge it onto the initial state.
    pub fn from_persisted(value: Value) -> Result<Self, PersistError> {
        let migrated = migrate_ui_state(value);
        if !migrated.is_object() {
            return Err(PersistError::InvalidFormat("UI state is not an object".into()));
        }
        Ok(serde_json::from_value(migrated)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&self.to_persisted()?)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load from disk.  A missing file yields the initial state.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no UI state at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_str(&text)?;
        let state = Self::from_persisted(value)?;
        log::info!("loaded UI state v{} from {}", state.version, path.display());
        Ok(state)
    }

    /// Load, falling back to defaults (with a warning) on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            log::warn!("UI state at {} unreadable ({}), using defaults", path.display(), e);
            Self::default()
        })
    }
}

/// Upgrade a persisted UI state to the current version.
///
/// * no `_version` → 1
/// * 1 → 2, resetting `activeTab` to `generation`
/// * anything else passes through untouched
///
/// Non-object input is treated as an empty object.
pub fn migrate_ui_state(value: Value) -> Value {
    let mut obj = match value {
        Value::Object(map) => map,
        other => {
            log::warn!("UI state migration: expected an object, got {}", other);
            Map::new()
        }
    };

    if !obj.contains_key("_version") {
        obj.insert("_version".into(), Value::from(1));
    }
    if obj.get("_version").and_then(Value::as_f64) == Some(1.0) {
        log::info!("UI state migration: v1 → v2");
        obj.insert("activeTab".into(), Value::from(TabName::Generation.name()));
        obj.insert("_version".into(), Value::from(2));
    }
    Value::Object(obj)
}

// ---- transient panel visibility --------------------------------------------

/// Whether the side panels are expanded.  Session-only, never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelVisibility {
    pub left_open: bool,
    pub right_open: bool,
}

impl Default for PanelVisibility {
    fn default() -> Self {
        Self { left_open: true, right_open: true }
    }
}

impl PanelVisibility {
    pub fn toggle_left(&mut self) {
        self.left_open = !self.left_open;
    }

    pub fn toggle_right(&mut self) {
        self.right_open = !self.right_open;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[test]
    fn migrate_empty_object() {
        assert_eq!(migrate_ui_state(json!({})), json!({ "_version": 2, "activeTab": "generation" }));
    }

    #[test]
    fn migrate_v1_resets_tab() {
        let out = migrate_ui_state(json!({ "_version": 1, "activeTab": "canvas", "panels": { "left": "30%" } }));
        assert_eq!(out, json!({ "_version": 2, "activeTab": "generation", "panels": { "left": "30%" } }));
    }

    #[test]
    fn migrate_float_v1_resets_tab() {
        let out = migrate_ui_state(json!({ "_version": 1.0, "activeTab": "canvas" }));
        assert_eq!(out, json!({ "_version": 2, "activeTab": "generation" }));
    }

    #[rstest]
    #[case(json!({ "_version": 2, "activeTab": "gallery" }))]
    #[case(json!({ "_version": 3, "activeTab": "queue" }))]
    fn migrate_passes_current_versions_through(#[case] input: Value) {
        assert_eq!(migrate_ui_state(input.clone()), input);
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({ "_version": 1, "activeTab": "models" }))]
    #[case(json!({ "_version": 2, "activeTab": "gallery" }))]
    #[case(json!(null))]
    fn migrate_is_idempotent(#[case] input: Value) {
        let once = migrate_ui_state(input);
        assert_eq!(migrate_ui_state(once.clone()), once);
    }

    #[test]
    fn setters_touch_one_field() {
        let mut s = UiState::default();
        s.reduce(&UiAction::AccordionStateChanged { id: "advanced".into(), is_open: true });
        s.reduce(&UiAction::AccordionStateChanged { id: "seed".into(), is_open: false });
        s.reduce(&UiAction::AccordionStateChanged { id: "advanced".into(), is_open: false });
        s.reduce(&UiAction::PanelsChanged { name: "left".into(), value: "25%".into() });

        let mut expected = UiState::default();
        expected.accordions.insert("advanced".into(), false);
        expected.accordions.insert("seed".into(), false);
        expected.panels.insert("left".into(), "25%".into());
        assert_eq!(s, expected);
    }

    #[rstest]
    #[case(TabName::Generation)]
    #[case(TabName::Gallery)]
    #[case(TabName::Workflows)]
    fn workflow_load_always_selects_workflows(#[case] start: TabName) {
        let mut s = UiState { active_tab: start, ..UiState::default() };
        s.reduce(&UiAction::WorkflowLoadRequested);
        assert_eq!(s.active_tab, TabName::Workflows);
    }

    #[test]
    fn workflow_load_wins_within_a_batch() {
        let mut s = UiState::default();
        s.apply_batch(&[
            UiAction::WorkflowLoadRequested,
            UiAction::SetActiveTab(TabName::Queue),
            UiAction::SetShouldShowImageDetails(true),
        ]);
        assert_eq!(s.active_tab, TabName::Workflows);
        assert!(s.should_show_image_details);
    }

    #[test]
    fn image_details_flag_is_not_persisted() {
        let mut s = UiState::default();
        s.reduce(&UiAction::SetShouldShowImageDetails(true));
        s.reduce(&UiAction::SetActiveTab(TabName::Upscaling));

        let value = s.to_persisted().unwrap();
        assert!(value.get("shouldShowImageDetails").is_none());
        assert_eq!(value["activeTab"], json!("upscaling"));

        let restored = UiState::from_persisted(value).unwrap();
        assert!(!restored.should_show_image_details);
        assert_eq!(restored.active_tab, TabName::Upscaling);
    }

    #[test]
    fn legacy_file_loads_with_defaults() {
        let s = UiState::from_persisted(json!({ "activeTab": "queue", "expanders": { "x": true } })).unwrap();
        assert_eq!(s.version, 2);
        assert_eq!(s.active_tab, TabName::Generation);
        assert!(s.should_show_progress_in_viewer);
        assert_eq!(s.expanders.get("x"), Some(&true));
    }

    #[test]
    fn save_and_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui").join("ui_state.json");

        assert_eq!(UiState::load(&path).unwrap(), UiState::default());

        let mut s = UiState::default();
        s.reduce(&UiAction::SetActiveTab(TabName::Gallery));
        s.reduce(&UiAction::ExpanderStateChanged { id: "info".into(), is_open: true });
        s.save(&path).unwrap();
        assert_eq!(UiState::load(&path).unwrap(), s);

        std::fs::write(&path, "not json").unwrap();
        assert!(UiState::load(&path).is_err());
        assert_eq!(UiState::load_or_default(&path), UiState::default());
    }

    #[test]
    fn side_panels_per_tab() {
        let gallery = UiState { active_tab: TabName::Gallery, ..UiState::default() };
        assert!(!gallery.with_left_panel());
        assert!(gallery.with_right_panel());

        let models = UiState { active_tab: TabName::Models, ..UiState::default() };
        assert!(!models.with_left_panel());
        assert!(!models.with_right_panel());

        let mut vis = PanelVisibility::default();
        vis.toggle_left();
        assert_eq!(vis, PanelVisibility { left_open: false, right_open: true });
    }
}
