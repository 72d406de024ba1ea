//! Registry index — application name to application entry.
//!
//! Entries are created on the first heartbeat of a new application and
//! purged by the reaper once the application is judged dead.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::AppEntry;
use crate::error::RegistryResult;
use crate::heartbeat::Heartbeat;
use crate::instance::InstanceRecord;
use crate::liveness::Liveness;

/// Summary of one application for the console sidebar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppBrief {
    pub app: String,
    pub app_type: i32,
    pub shown: bool,
    pub dead: bool,
    pub instance_count: usize,
    pub healthy_count: usize,
}

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReapReport {
    pub removed_instances: usize,
    pub removed_apps: Vec<String>,
}

/// Global application index.
///
/// Cheap to clone; all clones share the same entries.
#[derive(Clone, Default)]
pub struct AppRegistry {
    apps: Arc<DashMap<String, Arc<AppEntry>>>,
    liveness: Liveness,
}

impl AppRegistry {
    pub fn new(liveness: Liveness) -> Self {
        Self {
            apps: Arc::new(DashMap::new()),
            liveness,
        }
    }

    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Validate a heartbeat and record the sending instance.
    ///
    /// Returns whether the instance was new to its application.
    pub fn register_heartbeat(&self, heartbeat: Heartbeat) -> RegistryResult<bool> {
        if let Err(e) = heartbeat.validate() {
            warn!(ip = ?heartbeat.ip, app = ?heartbeat.app, error = %e, "heartbeat rejected");
            return Err(e);
        }
        let record = heartbeat.into_record(self.liveness.now());
        debug!(instance = %record.log_string(), "heartbeat received");
        Ok(self.add_instance(record))
    }

    /// Add or refresh an instance under its application, creating the
    /// application entry on first sight.
    ///
    /// Retries when the reaper unlinks the entry between lookup and insert,
    /// so the record always ends up in the entry the index holds.
    pub fn add_instance(&self, record: InstanceRecord) -> bool {
        loop {
            // Clone the Arc out so the shard lock is released before the insert.
            let entry = self
                .apps
                .entry(record.app.clone())
                .or_insert_with(|| {
                    info!(app = %record.app, app_type = record.app_type, "new application registered");
                    Arc::new(AppEntry::new(
                        record.app.clone(),
                        record.app_type,
                        self.liveness.clone(),
                    ))
                })
                .clone();
            let added = entry.add_instance(record.clone());
            let linked = self
                .apps
                .get(&record.app)
                .is_some_and(|current| Arc::ptr_eq(current.value(), &entry));
            if linked {
                return added;
            }
            debug!(app = %record.app, "application purged mid-heartbeat, retrying");
        }
    }

    /// Remove one instance. Unknown applications are a no-op.
    pub fn remove_instance(&self, app: &str, ip: &str, port: i32) -> bool {
        match self.get_app(app) {
            Some(entry) => entry.remove_instance(ip, port),
            None => false,
        }
    }

    pub fn get_app(&self, app: &str) -> Option<Arc<AppEntry>> {
        self.apps.get(app).map(|e| e.value().clone())
    }

    /// All known application names, sorted.
    pub fn list_app_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.apps.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Per-application summaries, sorted by name.
    pub fn app_briefs(&self) -> Vec<AppBrief> {
        let mut briefs: Vec<AppBrief> = self
            .entries()
            .into_iter()
            .map(|entry| AppBrief {
                app: entry.app().to_string(),
                app_type: entry.app_type(),
                shown: entry.should_show(),
                dead: entry.is_dead(),
                instance_count: entry.instance_count(),
                healthy_count: entry.healthy_count(),
            })
            .collect();
        briefs.sort_by(|a, b| a.app.cmp(&b.app));
        briefs
    }

    /// Drop expired instances, then applications judged dead.
    pub fn reap(&self) -> ReapReport {
        let mut report = ReapReport::default();
        for entry in self.entries() {
            report.removed_instances += entry.remove_expired();
            // Re-judged under the shard lock. A heartbeat that loses its
            // entry here re-registers in `add_instance`.
            let removed = self
                .apps
                .remove_if(entry.app(), |_, e| e.is_dead())
                .is_some();
            if removed {
                warn!(app = %entry.app(), "removed dead application");
                report.removed_apps.push(entry.app().to_string());
            }
        }
        report.removed_apps.sort();
        report
    }

    /// Run the reaper until the shutdown signal fires.
    ///
    /// The interval is re-read from the settings on every pass.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!("registry reaper started");
        loop {
            let interval = Duration::from_secs(self.liveness.settings().reap_interval_secs.max(1));
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let report = self.reap();
                    if report.removed_instances > 0 || !report.removed_apps.is_empty() {
                        info!(
                            instances = report.removed_instances,
                            apps = report.removed_apps.len(),
                            "reaper pass finished"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    info!("registry reaper shutting down");
                    break;
                }
            }
        }
    }

    fn entries(&self) -> Vec<Arc<AppEntry>> {
        self.apps.iter().map(|e| e.value().clone()).collect()
    }
}
