use std::path::{Path, PathBuf};

use log::LevelFilter;

use crate::canvas::{Fill, FillStyle, MaskDefaults, RgbColor};
use crate::components::ui_state::UiState;
use crate::error::PersistError;

const SETTINGS_FILE: &str = "canvasfe_settings.cfg";
const UI_STATE_FILE: &str = "ui_state.json";

/// Settings that persist across sessions
#[derive(Clone, Debug, PartialEq)]
pub struct CanvasSettings {
    /// Maximum level written to the session log
    pub log_level: LevelFilter,
    /// Fill pattern for newly added inpaint masks
    pub mask_fill_style: FillStyle,
    pub mask_fill_color: RgbColor,
    /// Initial opacity for newly added masks (0..=1)
    pub mask_opacity: f32,
    /// Save the UI flags slice on exit and restore it on launch
    pub persist_ui_state: bool,
}

impl Default for CanvasSettings {
    fn default() -> Self {
        let fill = Fill::default();
        Self {
            log_level: LevelFilter::Info,
            mask_fill_style: fill.style,
            mask_fill_color: fill.color,
            mask_opacity: 1.0,
            persist_ui_state: true,
        }
    }
}

impl CanvasSettings {
    /// Directory holding the settings and UI state files.
    /// On Linux:   ~/.config/canvasfe  (XDG_CONFIG_HOME respected)
    /// On Windows: %APPDATA%\CanvasFE
    /// On macOS:   ~/Library/Application Support/CanvasFE
    /// Fallback:   same directory as the executable.
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        {
            let base = std::env::var("XDG_CONFIG_HOME").map(PathBuf::from).unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
                PathBuf::from(home).join(".config")
            });
            return Some(base.join("canvasfe"));
        }
        #[cfg(target_os = "windows")]
        {
            let appdata = std::env::var("APPDATA").or_else(|_| std::env::var("USERPROFILE")).ok()?;
            return Some(PathBuf::from(appdata).join("CanvasFE"));
        }
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var("HOME").unwrap_or_else(|_| "~".to_string());
            return Some(PathBuf::from(home).join("Library").join("Application Support").join("CanvasFE"));
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
        {
            std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
        }
    }

    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join(SETTINGS_FILE))
    }

    pub fn ui_state_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join(UI_STATE_FILE))
    }

    /// Initial values the store uses for newly added masks.
    pub fn mask_defaults(&self) -> MaskDefaults {
        MaskDefaults {
            fill: Fill { style: self.mask_fill_style, color: self.mask_fill_color },
            opacity: self.mask_opacity,
        }
    }

    /// UI flags to start a session with.  Defaults when persistence is off
    /// or the file is missing or unreadable.
    pub fn restore_ui_state(&self, path: &Path) -> UiState {
        if !self.persist_ui_state {
            return UiState::default();
        }
        UiState::load_or_default(path)
    }

    /// Save the UI flags at session end.  No-op when persistence is off.
    pub fn store_ui_state(&self, state: &UiState, path: &Path) -> Result<(), PersistError> {
        if !self.persist_ui_state {
            return Ok(());
        }
        state.save(path)
    }

    pub fn to_config_string(&self) -> String {
        format!(
            "log_level={}\n\
             mask_fill_style={}\n\
             mask_fill_color={}\n\
             mask_opacity={}\n\
             persist_ui_state={}\n",
            self.log_level.as_str().to_ascii_lowercase(),
            self.mask_fill_style.name(),
            self.mask_fill_color.to_config_string(),
            self.mask_opacity,
            self.persist_ui_state,
        )
    }

    /// Parse `key=value` lines.  Unknown keys are ignored; bad values keep
    /// their defaults.
    pub fn from_config_str(content: &str) -> Self {
        let mut s = Self::default();
        for line in content.lines() {
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "log_level" => {
                    if let Some(level) = crate::logger::parse_level(val) {
                        s.log_level = level;
                    }
                }
                "mask_fill_style" => {
                    if let Some(style) = FillStyle::from_name(val) {
                        s.mask_fill_style = style;
                    }
                }
                "mask_fill_color" => {
                    if let Some(c) = RgbColor::from_config_string(val) {
                        s.mask_fill_color = c;
                    }
                }
                "mask_opacity" => {
                    if let Ok(v) = val.parse::<f32>()
                        && v.is_finite()
                    {
                        s.mask_opacity = v.clamp(0.0, 1.0);
                    }
                }
                "persist_ui_state" => {
                    s.persist_ui_state = val == "true";
                }
                _ => {}
            }
        }
        s
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Missing or unreadable file → defaults.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_config_str(&content),
            Err(_) => Self::default(),
        }
    }

    /// Save to the platform settings path.
    pub fn save(&self) {
        let Some(path) = Self::settings_path() else { return };
        if let Err(e) = self.save_to(&path) {
            log::warn!("failed to save settings to {}: {}", path.display(), e);
        }
    }

    /// Load from the platform settings path (defaults if missing or corrupt).
    pub fn load() -> Self {
        Self::settings_path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }
}
