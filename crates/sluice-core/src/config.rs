//! Dashboard settings parser and hot-swappable handle.
//!
//! Settings come from an optional `sluice.toml` file, then individual
//! thresholds may be overridden through `SLUICE_*` environment variables.
//! Readers always take a snapshot through [`SettingsHandle::load`], so a
//! reload never tears a judgment that is already in flight.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const ENV_HIDE_APP_NO_INSTANCE_MS: &str = "SLUICE_HIDE_APP_NO_INSTANCE_MS";
pub const ENV_REMOVE_APP_NO_INSTANCE_MS: &str = "SLUICE_REMOVE_APP_NO_INSTANCE_MS";
pub const ENV_UNHEALTHY_INSTANCE_MS: &str = "SLUICE_UNHEALTHY_INSTANCE_MS";
pub const ENV_AUTO_REMOVE_INSTANCE_MS: &str = "SLUICE_AUTO_REMOVE_INSTANCE_MS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardSettings {
    /// Hide an application once none of its instances heartbeated within
    /// this many milliseconds. `<= 0` disables hiding.
    pub hide_app_no_instance_ms: i64,
    /// Consider an application dead (and purge it) after this many
    /// milliseconds without a fresh instance. `<= 0` disables purging.
    pub remove_app_no_instance_ms: i64,
    /// An instance is healthy while its last heartbeat is younger than this.
    pub unhealthy_instance_ms: i64,
    /// Drop individual instances older than this. `<= 0` keeps them forever.
    pub auto_remove_instance_ms: i64,
    /// Period of the background reaper.
    pub reap_interval_secs: u64,
    /// How long the in-memory metrics store keeps samples.
    pub metric_retention_ms: i64,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            hide_app_no_instance_ms: 0,
            remove_app_no_instance_ms: 0,
            unhealthy_instance_ms: 60_000,
            auto_remove_instance_ms: 0,
            reap_interval_secs: 30,
            metric_retention_ms: 5 * 60 * 1000,
        }
    }
}

impl DashboardSettings {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `SLUICE_*` threshold overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply threshold overrides from an arbitrary key lookup.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let slots: [(&str, &mut i64); 4] = [
            (ENV_HIDE_APP_NO_INSTANCE_MS, &mut self.hide_app_no_instance_ms),
            (ENV_REMOVE_APP_NO_INSTANCE_MS, &mut self.remove_app_no_instance_ms),
            (ENV_UNHEALTHY_INSTANCE_MS, &mut self.unhealthy_instance_ms),
            (ENV_AUTO_REMOVE_INSTANCE_MS, &mut self.auto_remove_instance_ms),
        ];
        for (key, slot) in slots {
            let Some(raw) = lookup(key) else { continue };
            match raw.trim().parse::<i64>() {
                Ok(value) => *slot = value,
                Err(e) => warn!(%key, %raw, error = %e, "ignoring malformed threshold override"),
            }
        }
    }
}

/// Cloneable, lock-free handle to the current settings.
#[derive(Clone)]
pub struct SettingsHandle {
    current: Arc<ArcSwap<DashboardSettings>>,
    source: Option<PathBuf>,
}

impl SettingsHandle {
    pub fn new(settings: DashboardSettings) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(settings)),
            source: None,
        }
    }

    /// Load settings from `path` (plus env overrides) and remember the path
    /// for later [`reload`](Self::reload) calls.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let mut settings = DashboardSettings::from_file(path)?;
        settings.apply_env_overrides();
        let mut handle = Self::new(settings);
        handle.source = Some(path.to_path_buf());
        Ok(handle)
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<DashboardSettings> {
        self.current.load_full()
    }

    /// Publish new settings to every holder of this handle.
    pub fn replace(&self, settings: DashboardSettings) {
        self.current.store(Arc::new(settings));
    }

    /// Re-read the backing file, if any. Returns whether anything was reloaded.
    pub fn reload(&self) -> anyhow::Result<bool> {
        let Some(path) = &self.source else {
            return Ok(false);
        };
        let mut settings = DashboardSettings::from_file(path)?;
        settings.apply_env_overrides();
        info!(?path, ?settings, "dashboard settings reloaded");
        self.replace(settings);
        Ok(true)
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(DashboardSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_match_console() {
        let s = DashboardSettings::default();
        assert_eq!(s.unhealthy_instance_ms, 60_000);
        assert_eq!(s.hide_app_no_instance_ms, 0);
        assert_eq!(s.remove_app_no_instance_ms, 0);
        assert_eq!(s.auto_remove_instance_ms, 0);
    }

    #[test]
    fn parse_partial_toml() {
        let s = DashboardSettings::from_toml_str(
            r#"
hide_app_no_instance_ms = 60000
remove_app_no_instance_ms = 600000
"#,
        )
        .unwrap();
        assert_eq!(s.hide_app_no_instance_ms, 60_000);
        assert_eq!(s.remove_app_no_instance_ms, 600_000);
        assert_eq!(s.unhealthy_instance_ms, 60_000);
    }

    #[test]
    fn overrides_apply_and_skip_garbage() {
        let env: HashMap<&str, &str> = [
            (ENV_UNHEALTHY_INSTANCE_MS, "5000"),
            (ENV_AUTO_REMOVE_INSTANCE_MS, "not-a-number"),
        ]
        .into_iter()
        .collect();

        let mut s = DashboardSettings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(s.unhealthy_instance_ms, 5_000);
        assert_eq!(s.auto_remove_instance_ms, 0);
    }

    #[test]
    fn handle_replace_is_visible_to_clones() {
        let handle = SettingsHandle::default();
        let other = handle.clone();
        handle.replace(DashboardSettings {
            hide_app_no_instance_ms: 42,
            ..Default::default()
        });
        assert_eq!(other.load().hide_app_no_instance_ms, 42);
    }

    #[test]
    fn reload_rereads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "hide_app_no_instance_ms = 1000").unwrap();
        let handle = SettingsHandle::from_file(file.path()).unwrap();
        assert_eq!(handle.load().hide_app_no_instance_ms, 1_000);

        std::fs::write(file.path(), "hide_app_no_instance_ms = 2000\n").unwrap();
        assert!(handle.reload().unwrap());
        assert_eq!(handle.load().hide_app_no_instance_ms, 2_000);
    }

    #[test]
    fn reload_without_source_is_noop() {
        assert!(!SettingsHandle::default().reload().unwrap());
    }
}
