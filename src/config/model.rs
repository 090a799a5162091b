// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::{Activity, TaskNode};

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// [settings]
/// legacy = false
/// grace = "3s"
///
/// [[activity]]
/// name = "api"
/// tasks = [{ cmd = "go build" }, { cmd = "./api" }]
///
/// [activity.watch]
/// ext = ["go"]
/// paths = ["cmd", "internal/**"]
/// ```
///
/// Use [`ConfigFile::try_from`] to get something the rest of the crate can
/// consume.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub settings: SettingsSection,

    /// All `[[activity]]` tables, in file order.
    #[serde(default)]
    pub activity: Vec<ActivityConfig>,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SettingsSection {
    /// Use the polling watcher instead of native notifications.
    #[serde(default)]
    pub legacy: bool,

    /// Polling interval, e.g. `"500ms"`. Only meaningful with `legacy`.
    #[serde(default)]
    pub interval: Option<String>,

    /// How long an interrupted command gets before it is killed.
    #[serde(default)]
    pub grace: Option<String>,
}

/// One `[[activity]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActivityConfig {
    pub name: String,

    #[serde(default)]
    pub watch: WatchSection,

    #[serde(default)]
    pub ignore: IgnoreSection,

    #[serde(default)]
    pub before: Vec<TaskNode>,

    #[serde(default)]
    pub tasks: Vec<TaskNode>,

    #[serde(default)]
    pub after: Vec<TaskNode>,
}

/// `[activity.watch]`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    #[serde(default)]
    pub ext: Vec<String>,

    /// Directories, files or glob patterns. Empty means the working directory.
    #[serde(default)]
    pub paths: Vec<String>,
}

/// `[activity.ignore]`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IgnoreSection {
    /// Skip dot-files and dot-directories.
    #[serde(default)]
    pub hidden: bool,

    #[serde(default)]
    pub ext: Vec<String>,

    #[serde(default)]
    pub paths: Vec<String>,
}

/// Validated global settings with defaults applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub legacy: bool,
    pub interval: Duration,
    pub grace: Duration,
}

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

impl Default for Settings {
    fn default() -> Self {
        Self {
            legacy: false,
            interval: DEFAULT_POLL_INTERVAL,
            grace: crate::exec::process::DEFAULT_GRACE,
        }
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>`, so holders can rely on
/// non-empty, uniquely named activities with at least one main task each.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub settings: Settings,
    pub activities: Vec<Activity>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(settings: Settings, activities: Vec<Activity>) -> Self {
        Self {
            settings,
            activities,
        }
    }

    pub fn activity(&self, name: &str) -> Option<&Activity> {
        self.activities.iter().find(|a| a.name == name)
    }
}
