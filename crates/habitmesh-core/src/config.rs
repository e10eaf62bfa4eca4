use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::Calendar;
use crate::engine::DEFAULT_ANALYTICS_WINDOW_DAYS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid utc_offset_minutes: {0} (must be within +/-24h)")]
    InvalidOffset(i32),
    #[error("Invalid analytics_window_days: {0} (must be at least 1)")]
    InvalidWindow(u32),
    #[error("Cannot determine a home directory; set HABITMESH_HOME or pass a data dir")]
    NoHome,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HabitmeshConfig {
    /// Root of the on-disk store.
    pub data_dir: Option<String>,
    /// Fixed offset from UTC that defines where a day starts.
    pub utc_offset_minutes: Option<i32>,
    pub analytics_window_days: Option<u32>,
}

/// A config value together with where it came from: `project`, `global` or
/// `default`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: &'static str,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub data_dir: Sourced<PathBuf>,
    pub utc_offset_minutes: Sourced<i32>,
    pub analytics_window_days: Sourced<u32>,
}

impl ResolvedConfig {
    pub fn calendar(&self) -> Result<Calendar, ConfigError> {
        Calendar::from_offset_minutes(self.utc_offset_minutes.value)
            .ok_or(ConfigError::InvalidOffset(self.utc_offset_minutes.value))
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(".habitmesh.toml")
}

pub fn resolve_user_home_dir() -> Option<PathBuf> {
    for key in ["HOME", "USERPROFILE"] {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
    }
    None
}

pub fn resolve_habitmesh_home_dir() -> Option<PathBuf> {
    if let Ok(value) = std::env::var("HABITMESH_HOME") {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }
    resolve_user_home_dir().map(|home| home.join(".habitmesh"))
}

pub fn global_config_path() -> Option<PathBuf> {
    resolve_habitmesh_home_dir().map(|home| home.join("config.toml"))
}

pub fn find_config_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|candidate| config_path(candidate).is_file())
        .map(Path::to_path_buf)
}

/// Project config from the nearest ancestor of `start` that has one.
pub fn load_config(start: &Path) -> Result<Option<HabitmeshConfig>, ConfigError> {
    let Some(root) = find_config_root(start) else {
        return Ok(None);
    };
    read_config(&config_path(&root)).map(Some)
}

pub fn load_global_config() -> Result<Option<HabitmeshConfig>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(None);
    };
    if !path.is_file() {
        return Ok(None);
    }
    read_config(&path).map(Some)
}

fn read_config(path: &Path) -> Result<HabitmeshConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str::<HabitmeshConfig>(&text)?)
}

pub fn write_config(project_root: &Path, config: &HabitmeshConfig) -> Result<PathBuf, ConfigError> {
    let path = config_path(project_root);
    let body = toml::to_string_pretty(config)?;
    fs::write(&path, body)?;
    Ok(path)
}

fn layered<T>(
    project: Option<&HabitmeshConfig>,
    global: Option<&HabitmeshConfig>,
    pick: impl Fn(&HabitmeshConfig) -> Option<T>,
    default: impl FnOnce() -> Option<T>,
) -> Option<Sourced<T>> {
    if let Some(value) = project.and_then(&pick) {
        return Some(Sourced {
            value,
            source: "project",
        });
    }
    if let Some(value) = global.and_then(&pick) {
        return Some(Sourced {
            value,
            source: "global",
        });
    }
    default().map(|value| Sourced {
        value,
        source: "default",
    })
}

/// Resolves every setting: project file, then the global file, then built-in
/// defaults. A relative `data_dir` in a project file is taken relative to the
/// directory holding that file.
pub fn resolve_config(start: &Path) -> Result<ResolvedConfig, ConfigError> {
    let project_root = find_config_root(start);
    let project = match &project_root {
        Some(root) => Some(read_config(&config_path(root))?),
        None => None,
    };
    let global = load_global_config()?;

    let data_dir = layered(
        project.as_ref(),
        None,
        |config| {
            let dir = PathBuf::from(config.data_dir.as_deref()?.trim());
            Some(match &project_root {
                Some(root) if dir.is_relative() => root.join(dir),
                _ => dir,
            })
        },
        || None,
    )
    .or_else(|| {
        layered(
            None,
            global.as_ref(),
            |config| config.data_dir.as_deref().map(|dir| PathBuf::from(dir.trim())),
            || resolve_habitmesh_home_dir().map(|home| home.join("data")),
        )
    })
    .ok_or(ConfigError::NoHome)?;

    let utc_offset_minutes = layered(
        project.as_ref(),
        global.as_ref(),
        |config| config.utc_offset_minutes,
        || Some(0),
    )
    .unwrap_or(Sourced {
        value: 0,
        source: "default",
    });
    if Calendar::from_offset_minutes(utc_offset_minutes.value).is_none() {
        return Err(ConfigError::InvalidOffset(utc_offset_minutes.value));
    }

    let analytics_window_days = layered(
        project.as_ref(),
        global.as_ref(),
        |config| config.analytics_window_days,
        || Some(DEFAULT_ANALYTICS_WINDOW_DAYS),
    )
    .unwrap_or(Sourced {
        value: DEFAULT_ANALYTICS_WINDOW_DAYS,
        source: "default",
    });
    if analytics_window_days.value == 0 {
        return Err(ConfigError::InvalidWindow(0));
    }

    Ok(ResolvedConfig {
        data_dir,
        utc_offset_minutes,
        analytics_window_days,
    })
}
