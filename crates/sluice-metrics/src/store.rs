//! Metrics storage: the repository trait and an in-memory implementation.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use sluice_core::{SettingsHandle, SharedClock};
use tracing::trace;

use crate::sample::MetricSample;

/// How far back `list_resources_of_app` looks when ranking resources.
pub const RANKING_SPAN_MS: i64 = 60 * 1000;

/// Source of raw samples for the aggregator.
pub trait MetricsRepository: Send + Sync {
    fn save(&self, sample: MetricSample) -> anyhow::Result<()>;

    fn save_all(&self, samples: Vec<MetricSample>) -> anyhow::Result<()> {
        for sample in samples {
            self.save(sample)?;
        }
        Ok(())
    }

    /// Resource names of `app`, hottest first.
    fn list_resources_of_app(&self, app: &str) -> anyhow::Result<Vec<String>>;

    /// Samples of one resource with `start <= timestamp <= end`.
    fn query_by_app_and_resource_between(
        &self,
        app: &str,
        resource: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Vec<MetricSample>>;

    /// Samples of every resource of `app` with `start <= timestamp <= end`.
    fn query_by_app_between(&self, app: &str, start: i64, end: i64)
    -> anyhow::Result<Vec<MetricSample>>;
}

/// Samples of one resource keyed by (second, reporting instance).
type Series = BTreeMap<(i64, String), MetricSample>;

/// Retention-bounded store kept in process memory.
///
/// Samples older than `metric_retention_ms` are evicted from every series of
/// an app whenever that app is written. Series and apps left empty are dropped.
pub struct InMemoryMetricsRepository {
    apps: RwLock<HashMap<String, HashMap<String, Series>>>,
    clock: SharedClock,
    settings: SettingsHandle,
}

impl InMemoryMetricsRepository {
    pub fn new(clock: SharedClock, settings: SettingsHandle) -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            clock,
            settings,
        }
    }

    pub fn app_count(&self) -> usize {
        self.apps.read().len()
    }

    pub fn resource_count(&self, app: &str) -> usize {
        self.apps.read().get(app).map_or(0, HashMap::len)
    }

    pub fn sample_count(&self) -> usize {
        self.apps
            .read()
            .values()
            .flat_map(|resources| resources.values())
            .map(BTreeMap::len)
            .sum()
    }
}

impl MetricsRepository for InMemoryMetricsRepository {
    fn save(&self, sample: MetricSample) -> anyhow::Result<()> {
        if sample.app.trim().is_empty() || sample.resource.is_empty() {
            return Ok(());
        }
        let cutoff = self.clock.now_millis() - self.settings.load().metric_retention_ms;

        let app = sample.app.clone();
        let mut apps = self.apps.write();
        let resources = apps.entry(app.clone()).or_default();
        let series = resources.entry(sample.resource.clone()).or_default();

        let key = (sample.timestamp, sample.instance_key());
        match series.get(&key) {
            Some(kept) if kept.gmt_create > sample.gmt_create => {}
            _ => {
                series.insert(key, sample);
            }
        }

        // Keys sort by timestamp first, so everything before the cutoff is a prefix.
        let mut evicted = 0;
        resources.retain(|_, series| {
            let fresh = series.split_off(&(cutoff, String::new()));
            evicted += series.len();
            *series = fresh;
            !series.is_empty()
        });
        if resources.is_empty() {
            apps.remove(&app);
        }
        if evicted > 0 {
            trace!(app = %app, evicted, "evicted expired metric samples");
        }
        Ok(())
    }

    fn list_resources_of_app(&self, app: &str) -> anyhow::Result<Vec<String>> {
        let since = self.clock.now_millis() - RANKING_SPAN_MS;
        let apps = self.apps.read();
        let Some(resources) = apps.get(app) else {
            return Ok(Vec::new());
        };

        let mut ranked: Vec<(&String, i64, i64)> = resources
            .iter()
            .filter_map(|(resource, series)| {
                let mut recent = series.range((since, String::new())..).peekable();
                recent.peek()?;
                let (block, pass) = recent.fold((0, 0), |(block, pass), (_, s)| {
                    (block + s.block_qps, pass + s.pass_qps)
                });
                Some((resource, block, pass))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(b.0)));
        Ok(ranked.into_iter().map(|(r, _, _)| r.clone()).collect())
    }

    fn query_by_app_and_resource_between(
        &self,
        app: &str,
        resource: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Vec<MetricSample>> {
        let apps = self.apps.read();
        let samples = apps
            .get(app)
            .and_then(|resources| resources.get(resource))
            .map(|series| between(series, start, end).collect())
            .unwrap_or_default();
        Ok(samples)
    }

    fn query_by_app_between(
        &self,
        app: &str,
        start: i64,
        end: i64,
    ) -> anyhow::Result<Vec<MetricSample>> {
        let apps = self.apps.read();
        let samples = apps
            .get(app)
            .map(|resources| {
                resources
                    .values()
                    .flat_map(|series| between(series, start, end))
                    .collect()
            })
            .unwrap_or_default();
        Ok(samples)
    }
}

fn between(series: &Series, start: i64, end: i64) -> impl Iterator<Item = MetricSample> + '_ {
    series
        .range((start, String::new())..)
        .take_while(move |((ts, _), _)| *ts <= end)
        .map(|(_, sample)| sample.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::{DashboardSettings, ManualClock};

    const NOW: i64 = 10_000_000;

    fn store() -> (InMemoryMetricsRepository, std::sync::Arc<ManualClock>) {
        let clock = ManualClock::new(NOW);
        let store = InMemoryMetricsRepository::new(clock.clone(), SettingsHandle::default());
        (store, clock)
    }

    fn sample(resource: &str, timestamp: i64, pass: i64, block: i64, ip: &str) -> MetricSample {
        MetricSample {
            pass_qps: pass,
            block_qps: block,
            ip: Some(ip.into()),
            port: Some(8719),
            ..MetricSample::new("orders", resource, timestamp)
        }
    }

    #[test]
    fn range_queries_are_inclusive() {
        let (store, _) = store();
        for ts in [NOW - 3_000, NOW - 2_000, NOW - 1_000] {
            store.save(sample("/a", ts, 1, 0, "10.0.0.1")).unwrap();
        }
        let got = store
            .query_by_app_and_resource_between("orders", "/a", NOW - 2_000, NOW - 1_000)
            .unwrap();
        assert_eq!(got.len(), 2);
        assert!(store
            .query_by_app_and_resource_between("orders", "/missing", 0, NOW)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn instances_at_same_second_are_kept_apart() {
        let (store, _) = store();
        store.save(sample("/a", NOW, 1, 0, "10.0.0.1")).unwrap();
        store.save(sample("/a", NOW, 2, 0, "10.0.0.2")).unwrap();
        store.save(sample("/b", NOW, 3, 0, "10.0.0.1")).unwrap();
        assert_eq!(store.query_by_app_between("orders", NOW, NOW).unwrap().len(), 3);
        assert!(store.query_by_app_between("billing", 0, NOW).unwrap().is_empty());
    }

    #[test]
    fn blank_app_is_ignored() {
        let (store, _) = store();
        let mut s = sample("/a", NOW, 1, 0, "10.0.0.1");
        s.app = " ".into();
        store.save(s).unwrap();
        assert_eq!(store.sample_count(), 0);
    }

    #[test]
    fn old_samples_are_evicted_on_write() {
        let (store, clock) = store();
        let retention = DashboardSettings::default().metric_retention_ms;
        store.save(sample("/a", NOW - retention - 1, 1, 0, "10.0.0.1")).unwrap();
        assert_eq!(store.sample_count(), 0);

        store.save(sample("/a", NOW, 1, 0, "10.0.0.1")).unwrap();
        clock.advance(retention + 1_000);
        store.save(sample("/a", NOW + retention + 1_000, 1, 0, "10.0.0.1")).unwrap();
        assert_eq!(store.sample_count(), 1);
    }

    #[test]
    fn emptied_series_and_apps_are_dropped() {
        let (store, clock) = store();
        let retention = DashboardSettings::default().metric_retention_ms;

        let mut expired = sample("/a", NOW - retention - 1, 1, 0, "10.0.0.1");
        expired.app = "billing".into();
        store.save(expired).unwrap();
        assert_eq!(store.app_count(), 0);

        store.save(sample("/retired", NOW, 1, 0, "10.0.0.1")).unwrap();
        store.save(sample("/a", NOW, 1, 0, "10.0.0.1")).unwrap();
        assert_eq!(store.resource_count("orders"), 2);

        clock.advance(retention + 1_000);
        store.save(sample("/a", NOW + retention + 1_000, 1, 0, "10.0.0.1")).unwrap();
        assert_eq!(store.resource_count("orders"), 1);
        assert_eq!(store.app_count(), 1);
        assert_eq!(store.sample_count(), 1);
    }

    #[test]
    fn ranking_uses_last_minute_block_then_pass() {
        let (store, _) = store();
        store.save(sample("/quiet", NOW - 1_000, 100, 0, "10.0.0.1")).unwrap();
        store.save(sample("/blocked", NOW - 1_000, 1, 5, "10.0.0.1")).unwrap();
        store.save(sample("/busy", NOW - 1_000, 50, 5, "10.0.0.1")).unwrap();
        store.save(sample("/busy", NOW - 2_000, 50, 0, "10.0.0.2")).unwrap();
        store.save(sample("/stale", NOW - 120_000, 999, 999, "10.0.0.1")).unwrap();

        let ranked = store.list_resources_of_app("orders").unwrap();
        assert_eq!(ranked, vec!["/busy", "/blocked", "/quiet"]);
        assert!(store.list_resources_of_app("billing").unwrap().is_empty());
    }

    #[test]
    fn later_gmt_create_replaces_same_instance_second() {
        let (store, _) = store();
        let mut first = sample("/a", NOW, 1, 0, "10.0.0.1");
        first.gmt_create = NOW + 5;
        let mut stale = sample("/a", NOW, 9, 0, "10.0.0.1");
        stale.gmt_create = NOW + 1;
        store.save(first).unwrap();
        store.save(stale).unwrap();
        let got = store.query_by_app_between("orders", NOW, NOW).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].pass_qps, 1);
    }
}
