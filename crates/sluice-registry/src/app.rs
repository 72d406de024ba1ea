//! Application entry — the live instance set of one application.

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::instance::{InstanceKey, InstanceRecord, InstanceView};
use crate::liveness::Liveness;

/// Concurrent instance set for one application.
///
/// Adds go straight into the map, so heartbeats from different senders
/// never wait on each other. Scan-based removals are serialized through
/// `removal`. Callers only ever receive copies of the records.
pub struct AppEntry {
    app: String,
    app_type: i32,
    instances: DashMap<InstanceKey, InstanceRecord>,
    removal: Mutex<()>,
    liveness: Liveness,
}

impl AppEntry {
    pub fn new(app: impl Into<String>, app_type: i32, liveness: Liveness) -> Self {
        Self {
            app: app.into(),
            app_type,
            instances: DashMap::new(),
            removal: Mutex::new(()),
            liveness,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn app_type(&self) -> i32 {
        self.app_type
    }

    /// Insert `record`, replacing any record with the same identity.
    ///
    /// Returns `true` if the set grew, `false` if an existing record was replaced.
    pub fn add_instance(&self, record: InstanceRecord) -> bool {
        let key = record.key();
        let replaced = self.instances.insert(key, record).is_some();
        !replaced
    }

    /// Remove every instance whose `ip` and `port` match.
    pub fn remove_instance(&self, ip: &str, port: i32) -> bool {
        let _guard = self.removal.lock();
        let before = self.instances.len();
        self.instances.retain(|_, r| !(r.ip == ip && r.port == port));
        let removed = before.saturating_sub(self.instances.len());
        if removed > 0 {
            debug!(app = %self.app, %ip, port, removed, "instances removed");
        }
        removed > 0
    }

    /// Drop every instance past the auto-remove threshold. Returns how many went.
    pub fn remove_expired(&self) -> usize {
        let threshold = self.liveness.settings().auto_remove_instance_ms;
        if threshold <= 0 {
            return 0;
        }
        let now = self.liveness.now();
        let _guard = self.removal.lock();
        let before = self.instances.len();
        self.instances
            .retain(|_, r| !r.is_expired_at(now, threshold));
        before.saturating_sub(self.instances.len())
    }

    /// Snapshot copy of the current instances.
    pub fn get_instances(&self) -> Vec<InstanceRecord> {
        self.instances.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get_instance(&self, ip: &str, port: i32) -> Option<InstanceRecord> {
        self.instances
            .iter()
            .find(|e| e.ip == ip && e.port == port)
            .map(|e| e.value().clone())
    }

    pub fn get_instance_by_ip(&self, ip: &str) -> Option<InstanceRecord> {
        self.instances
            .iter()
            .find(|e| e.ip == ip)
            .map(|e| e.value().clone())
    }

    /// Instances in listing order with their current health.
    pub fn sorted_instances(&self) -> Vec<InstanceView> {
        let mut records = self.get_instances();
        records.sort_by(|a, b| a.listing_cmp(b));
        let now = self.liveness.now();
        let unhealthy = self.liveness.settings().unhealthy_instance_ms;
        records
            .iter()
            .map(|r| InstanceView::from_record(r, now, unhealthy))
            .collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn healthy_count(&self) -> usize {
        let now = self.liveness.now();
        let unhealthy = self.liveness.settings().unhealthy_instance_ms;
        self.instances
            .iter()
            .filter(|e| e.is_healthy_at(now, unhealthy))
            .count()
    }

    /// Whether the console should list this application.
    pub fn should_show(&self) -> bool {
        self.heartbeat_judge(self.liveness.settings().hide_app_no_instance_ms)
    }

    /// Whether the application has been silent long enough to purge.
    pub fn is_dead(&self) -> bool {
        !self.heartbeat_judge(self.liveness.settings().remove_app_no_instance_ms)
    }

    /// Shared judgment behind [`should_show`](Self::should_show) and
    /// [`is_dead`](Self::is_dead).
    ///
    /// With no healthy instance left, the freshest instance still counts
    /// while it is younger than `threshold`: an app stays visible for a
    /// grace window after its last instance turned unhealthy.
    fn heartbeat_judge(&self, threshold: i64) -> bool {
        let snapshot = self.get_instances();
        if snapshot.is_empty() {
            return false;
        }
        if threshold <= 0 {
            return true;
        }
        let now = self.liveness.now();
        let unhealthy = self.liveness.settings().unhealthy_instance_ms;
        if snapshot.iter().any(|r| r.is_healthy_at(now, unhealthy)) {
            return true;
        }
        snapshot
            .iter()
            .map(|r| r.last_heartbeat)
            .max()
            .is_some_and(|last| now - last < threshold)
    }
}

impl std::fmt::Debug for AppEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppEntry")
            .field("app", &self.app)
            .field("app_type", &self.app_type)
            .field("instances", &self.instances.len())
            .finish()
    }
}
