// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use globset::GlobBuilder;

use crate::config::model::{
    ActivityConfig, ConfigFile, RawConfigFile, Settings, SettingsSection, DEFAULT_POLL_INTERVAL,
};
use crate::errors::{Result, WatchrunError};
use crate::exec::process::DEFAULT_GRACE;
use crate::types::{Activity, IgnoreSpec, WatchSpec};
use crate::watch::glob::has_glob_meta;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = WatchrunError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_activities(&raw)?;
        ensure_unique_names(&raw)?;
        let settings = validate_settings(&raw.settings)?;

        let activities = raw
            .activity
            .into_iter()
            .map(validate_activity)
            .collect::<Result<Vec<_>>>()?;

        Ok(ConfigFile::new_unchecked(settings, activities))
    }
}

fn ensure_has_activities(cfg: &RawConfigFile) -> Result<()> {
    if cfg.activity.is_empty() {
        return Err(WatchrunError::ConfigError(
            "config must contain at least one [[activity]] table".to_string(),
        ));
    }
    Ok(())
}

fn ensure_unique_names(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();
    for activity in &cfg.activity {
        let name = activity.name.trim();
        if name.is_empty() {
            return Err(WatchrunError::ConfigError(
                "activity name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(WatchrunError::ConfigError(format!(
                "duplicate activity name '{name}'"
            )));
        }
    }
    Ok(())
}

fn validate_settings(raw: &SettingsSection) -> Result<Settings> {
    let interval = match raw.interval.as_deref() {
        Some(s) => parse_duration(s).map_err(|e| {
            WatchrunError::ConfigError(format!("[settings].interval: {e}"))
        })?,
        None => DEFAULT_POLL_INTERVAL,
    };
    if interval.is_zero() {
        return Err(WatchrunError::ConfigError(
            "[settings].interval must be greater than zero".to_string(),
        ));
    }

    let grace = match raw.grace.as_deref() {
        Some(s) => parse_duration(s)
            .map_err(|e| WatchrunError::ConfigError(format!("[settings].grace: {e}")))?,
        None => DEFAULT_GRACE,
    };

    Ok(Settings {
        legacy: raw.legacy,
        interval,
        grace,
    })
}

fn validate_activity(raw: ActivityConfig) -> Result<Activity> {
    let name = raw.name.trim().to_string();

    if raw.tasks.is_empty() {
        return Err(WatchrunError::ConfigError(format!(
            "activity '{name}' must define at least one entry in `tasks`"
        )));
    }

    check_extensions(&name, "watch.ext", &raw.watch.ext)?;
    check_extensions(&name, "ignore.ext", &raw.ignore.ext)?;
    check_patterns(&name, "watch.paths", &raw.watch.paths)?;
    check_patterns(&name, "ignore.paths", &raw.ignore.paths)?;

    Ok(Activity {
        watch: WatchSpec::new(&raw.watch.ext, &raw.watch.paths),
        ignore: IgnoreSpec::new(raw.ignore.hidden, &raw.ignore.ext, &raw.ignore.paths),
        before: raw.before,
        tasks: raw.tasks,
        after: raw.after,
        name,
    })
}

fn check_extensions(activity: &str, field: &str, exts: &[String]) -> Result<()> {
    for ext in exts {
        if ext.trim().trim_start_matches('.').is_empty() {
            return Err(WatchrunError::ConfigError(format!(
                "activity '{activity}': `{field}` contains an empty extension"
            )));
        }
    }
    Ok(())
}

fn check_patterns(activity: &str, field: &str, patterns: &[String]) -> Result<()> {
    for pattern in patterns.iter().filter(|p| has_glob_meta(p)) {
        GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                WatchrunError::ConfigError(format!(
                    "activity '{activity}': invalid pattern '{pattern}' in `{field}`: {e}"
                ))
            })?;
    }
    Ok(())
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{num_part}': {e}"))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{unit}'; expected ms, s, m, or h"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_with_every_suffix() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
    }

    #[test]
    fn malformed_durations_are_rejected() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("ms").is_err());
        assert!(parse_duration("5d").is_err());
    }
}
