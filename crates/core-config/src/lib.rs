//! Configuration loading and parsing.
//!
//! Parses `playbridge.toml` (or an override path provided by the binary).
//! Every section is optional and every field has a default, so a missing or
//! partially written file still yields a usable config. A file that fails to
//! parse falls back to defaults with a warning. Unknown fields are ignored.
//!
//! `[editor]` values are not interpreted here: they are pushed to the engine
//! as an `update_config` change map, either whole (`to_params`) or as the
//! keys that differ from a previous value (`diff`).

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{fs, path::PathBuf};
use tracing::{info, warn};

/// Engine-side editing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    #[serde(default = "EditorConfig::default_tab_size")]
    pub tab_size: u32,
    #[serde(default = "default_true")]
    pub translate_tabs_to_spaces: bool,
    #[serde(default = "default_true")]
    pub auto_indent: bool,
    #[serde(default = "default_true")]
    pub word_wrap: bool,
    #[serde(default = "EditorConfig::default_font_face")]
    pub font_face: String,
    #[serde(default = "EditorConfig::default_font_size")]
    pub font_size: f64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            tab_size: Self::default_tab_size(),
            translate_tabs_to_spaces: true,
            auto_indent: true,
            word_wrap: true,
            font_face: Self::default_font_face(),
            font_size: Self::default_font_size(),
        }
    }
}

impl EditorConfig {
    /// Keys whose change invalidates memoized text measurements.
    pub const FONT_KEYS: [&'static str; 2] = ["font_face", "font_size"];

    const fn default_tab_size() -> u32 {
        4
    }
    fn default_font_face() -> String {
        "Inconsolata".to_string()
    }
    const fn default_font_size() -> f64 {
        14.0
    }

    /// Full option map, as sent on session start.
    pub fn to_params(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Only the options whose value differs from `previous`.
    pub fn diff(&self, previous: &EditorConfig) -> Map<String, Value> {
        let before = previous.to_params();
        self.to_params()
            .into_iter()
            .filter(|(k, v)| before.get(k) != Some(v))
            .collect()
    }

    /// Fold a change map into this config and return the changes the engine should see. Keys
    /// this config does not model pass through untouched; a mistyped value for a known key is
    /// dropped.
    pub fn apply(&mut self, changes: &Map<String, Value>) -> Map<String, Value> {
        let mut accepted = Map::new();
        for (k, v) in changes {
            let mut merged = self.to_params();
            if merged.insert(k.clone(), v.clone()).is_none() {
                accepted.insert(k.clone(), v.clone());
                continue;
            }
            match serde_json::from_value::<EditorConfig>(Value::Object(merged)) {
                Ok(updated) => {
                    *self = updated;
                    accepted.insert(k.clone(), v.clone());
                }
                Err(e) => warn!(target: "config", key = %k, error = %e, "editor_change_rejected"),
            }
        }
        accepted
    }

    pub fn touches_font(changes: &Map<String, Value>) -> bool {
        Self::FONT_KEYS.iter().any(|k| changes.contains_key(*k))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputConfig {
    /// Register input interception with the engine at session start.
    #[serde(default)]
    pub intercept: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TasksConfig {
    #[serde(default = "TasksConfig::default_toolchain")]
    pub toolchain: String,
    #[serde(default = "default_true")]
    pub backtrace: bool,
    #[serde(default)]
    pub release: bool,
    /// Scratch cargo project location. Defaults to the platform cache dir.
    #[serde(default)]
    pub build_dir: Option<PathBuf>,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            toolchain: Self::default_toolchain(),
            backtrace: true,
            release: false,
            build_dir: None,
        }
    }
}

impl TasksConfig {
    fn default_toolchain() -> String {
        "stable".to_string()
    }

    pub fn resolved_build_dir(&self) -> PathBuf {
        if let Some(dir) = &self.build_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("playbridge")
            .join("playground")
    }
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFile {
    #[serde(default)]
    pub editor: EditorConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub path: Option<PathBuf>, // file the values came from; `None` means defaults
    pub file: ConfigFile,
}

/// Best-effort config path following platform conventions (XDG / AppData Roaming).
pub fn discover() -> PathBuf {
    let local = PathBuf::from("playbridge.toml");
    if local.exists() {
        return local;
    }
    if let Some(dir) = dirs::config_dir() {
        return dir.join("playbridge").join("playbridge.toml");
    }
    PathBuf::from("playbridge.toml")
}

pub fn load_from(path: Option<PathBuf>) -> Result<Config> {
    let path = path.unwrap_or_else(discover);
    let Ok(content) = fs::read_to_string(&path) else {
        info!(target: "config", path = %path.display(), "config_missing_using_defaults");
        return Ok(Config::default());
    };
    match toml::from_str::<ConfigFile>(&content) {
        Ok(file) => {
            info!(target: "config", path = %path.display(), "config_loaded");
            Ok(Config {
                path: Some(path),
                file,
            })
        }
        Err(e) => {
            warn!(target: "config", path = %path.display(), error = %e, "config_parse_failed_using_defaults");
            Ok(Config::default())
        }
    }
}
