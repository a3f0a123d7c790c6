use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::gui::canvas::CanvasConfig;
use crate::layout::force::ForceParams;
use crate::layout::{LayoutConfig, LevelOrdering};

const APP_DIR: &str = "Mind-Loom";
const SETTINGS_JSON: &str = "settings.json";
const SETTINGS_RON: &str = "settings.ron";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // If None, use OS default autosave directory
    #[serde(default)]
    pub autosave_override: Option<PathBuf>,
    // If None, use OS temporary directory for exports
    #[serde(default)]
    pub export_override: Option<PathBuf>,
    #[serde(default)]
    pub level_ordering: LevelOrdering,
    #[serde(default = "AppSettings::default_refinement")]
    pub refinement_enabled: bool,
    #[serde(default = "AppSettings::default_link_strength")]
    pub link_strength: f32,
    #[serde(default = "AppSettings::default_repulsion_strength")]
    pub repulsion_strength: f32,
    #[serde(default = "AppSettings::default_focus_zoom")]
    pub search_focus_zoom: f32,
    #[serde(default = "AppSettings::default_highlight_ms")]
    pub highlight_restore_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            autosave_override: None,
            export_override: None,
            level_ordering: LevelOrdering::default(),
            refinement_enabled: Self::default_refinement(),
            link_strength: Self::default_link_strength(),
            repulsion_strength: Self::default_repulsion_strength(),
            search_focus_zoom: Self::default_focus_zoom(),
            highlight_restore_ms: Self::default_highlight_ms(),
        }
    }
}

impl AppSettings {
    fn default_refinement() -> bool { false }
    fn default_link_strength() -> f32 { ForceParams::default().link_strength }
    fn default_repulsion_strength() -> f32 { ForceParams::default().repulsion_strength }
    fn default_focus_zoom() -> f32 { CanvasConfig::default().focus_zoom }
    fn default_highlight_ms() -> u64 { 2000 }

    fn config_dir() -> PathBuf {
        // Cross-platform user config dir
        #[cfg(target_os = "macos")]
        {
            // ~/Library/Application Support/Mind-Loom
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join("Library").join("Application Support").join(APP_DIR);
        }
        #[cfg(target_os = "windows")]
        {
            // %APPDATA%\Mind-Loom
            if let Ok(appdata) = std::env::var("APPDATA") {
                return PathBuf::from(appdata).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_CONFIG_HOME/Mind-Loom or ~/.config/Mind-Loom
            if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
                return PathBuf::from(xdg).join(APP_DIR);
            }
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("~"));
            return home.join(".config").join(APP_DIR);
        }
    }

    fn autosave_default_dir() -> PathBuf {
        #[cfg(target_os = "macos")]
        {
            let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("/tmp"));
            return home.join("Library").join("Application Support").join(APP_DIR).join("Autosave");
        }
        #[cfg(target_os = "windows")]
        {
            // %LOCALAPPDATA%\Mind-Loom\Autosave else TEMP
            if let Ok(local) = std::env::var("LOCALAPPDATA") {
                return PathBuf::from(local).join(APP_DIR).join("Autosave");
            }
            if let Ok(temp) = std::env::var("TEMP") {
                return PathBuf::from(temp).join(APP_DIR);
            }
            return PathBuf::from(APP_DIR);
        }
        #[cfg(all(unix, not(target_os = "macos")))]
        {
            // $XDG_STATE_HOME/mind-loom or ~/.local/state/mind-loom, else /tmp/Mind-Loom
            if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
                return PathBuf::from(xdg).join("mind-loom");
            }
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(".local").join("state").join("mind-loom");
            }
            return PathBuf::from("/tmp").join(APP_DIR);
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_dir(&Self::config_dir())
    }

    /// Read `settings.json` from `dir`, migrating a legacy `settings.ron` when that is
    /// all there is. A missing file yields defaults.
    pub fn load_from_dir(dir: &Path) -> anyhow::Result<Self> {
        let json_path = dir.join(SETTINGS_JSON);
        if json_path.exists() {
            let s = read_to_string(&json_path)?;
            let v: Self = serde_json::from_str(&s)
                .with_context(|| format!("parsing {}", json_path.display()))?;
            return Ok(v);
        }
        // Migrate from legacy RON if present
        let ron_path = dir.join(SETTINGS_RON);
        if ron_path.exists() {
            let s = read_to_string(&ron_path)?;
            let v: Self = ron::from_str(&s).with_context(|| format!("parsing {}", ron_path.display()))?;
            match v.save_to_dir(dir) {
                Ok(()) => info!("migrated {} to JSON", ron_path.display()),
                Err(e) => warn!("could not migrate legacy settings: {e:#}"),
            }
            return Ok(v);
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_dir(&Self::config_dir())
    }

    pub fn save_to_dir(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        let path = dir.join(SETTINGS_JSON);
        let s = serde_json::to_string_pretty(self)?;
        let mut f = fs::File::create(&path).with_context(|| format!("writing {}", path.display()))?;
        f.write_all(s.as_bytes())?;
        Ok(())
    }

    pub fn autosave_dir(&self) -> PathBuf {
        if let Some(p) = &self.autosave_override { return p.clone(); }
        Self::autosave_default_dir()
    }

    /// Default export directory when no override is set: {temp_dir}/Mind-Loom/exports
    pub fn export_default_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(APP_DIR);
        p.push("exports");
        p
    }

    pub fn export_dir(&self) -> PathBuf {
        if let Some(p) = &self.export_override { return p.clone(); }
        Self::export_default_dir()
    }

    pub fn layout_config(&self) -> LayoutConfig {
        LayoutConfig { ordering: self.level_ordering, ..LayoutConfig::default() }
    }

    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            link_strength: self.link_strength.max(0.0),
            repulsion_strength: self.repulsion_strength.max(0.0),
            ..ForceParams::default()
        }
    }

    pub fn canvas_config(&self) -> CanvasConfig {
        CanvasConfig {
            focus_zoom: self.search_focus_zoom,
            highlight_restore_secs: self.highlight_restore_ms as f64 / 1000.0,
            ..CanvasConfig::default()
        }
    }
}

fn read_to_string(path: &Path) -> anyhow::Result<String> {
    let mut f = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut s = String::new();
    f.read_to_string(&mut s)?;
    Ok(s)
}
