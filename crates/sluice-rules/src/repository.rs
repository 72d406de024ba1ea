//! RuleRepository — triple-indexed, copy-on-write rule cache.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::entity::{IdAllocator, RuleEntity, SequentialIds};
use crate::error::{RuleError, RuleResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstanceScope {
    app: String,
    ip: String,
    port: i32,
}

impl InstanceScope {
    fn of<R: RuleEntity>(rule: &R) -> Self {
        Self {
            app: rule.app().to_string(),
            ip: rule.ip().to_string(),
            port: rule.port(),
        }
    }
}

/// One immutable view of the whole repository.
///
/// The secondary indexes hold ids only; rules live in `by_id`.
#[derive(Clone)]
struct Generation<R> {
    by_id: HashMap<u64, R>,
    by_instance: HashMap<InstanceScope, BTreeSet<u64>>,
    by_app: HashMap<String, BTreeSet<u64>>,
}

impl<R: RuleEntity> Generation<R> {
    fn empty() -> Self {
        Self {
            by_id: HashMap::new(),
            by_instance: HashMap::new(),
            by_app: HashMap::new(),
        }
    }

    /// Insert a rule that already carries its id.
    fn insert(&mut self, id: u64, rule: R) {
        // An update may move the rule to another app or instance.
        self.remove(id);
        self.by_instance
            .entry(InstanceScope::of(&rule))
            .or_default()
            .insert(id);
        self.by_app
            .entry(rule.app().to_string())
            .or_default()
            .insert(id);
        self.by_id.insert(id, rule);
    }

    /// Remove by id, unlinking the secondary indexes through the removed
    /// rule's own scope.
    fn remove(&mut self, id: u64) -> Option<R> {
        let rule = self.by_id.remove(&id)?;
        let scope = InstanceScope::of(&rule);
        if let Some(ids) = self.by_instance.get_mut(&scope) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_instance.remove(&scope);
            }
        }
        if let Some(ids) = self.by_app.get_mut(rule.app()) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_app.remove(rule.app());
            }
        }
        Some(rule)
    }

    fn collect(&self, ids: Option<&BTreeSet<u64>>) -> Vec<R> {
        ids.map(|ids| {
            ids.iter()
                .filter_map(|id| self.by_id.get(id).cloned())
                .collect()
        })
        .unwrap_or_default()
    }
}

/// Concurrent rule cache indexed by id, by instance and by app.
///
/// Reads are lock-free loads of the current generation. Writers serialize
/// on `writer`, build the next generation from a copy and publish it with
/// a single store, so `save_all` replaces the content without any window
/// in which readers see an empty or half-filled repository.
pub struct RuleRepository<R> {
    current: ArcSwap<Generation<R>>,
    writer: Mutex<()>,
    ids: Box<dyn IdAllocator>,
}

impl<R: RuleEntity> RuleRepository<R> {
    pub fn new(ids: Box<dyn IdAllocator>) -> Self {
        Self {
            current: ArcSwap::from_pointee(Generation::empty()),
            writer: Mutex::new(()),
            ids,
        }
    }

    /// Repository using [`SequentialIds`].
    pub fn with_sequential_ids() -> Self {
        Self::new(Box::new(SequentialIds::new()))
    }

    /// Store `rule`, assigning an id first if it has none.
    pub fn save(&self, rule: R) -> R {
        let _guard = self.writer.lock();
        let mut next = Generation::clone(&self.current.load());
        let rule = self.stage(&mut next, rule);
        self.current.store(Arc::new(next));
        debug!(id = ?rule.id(), app = %rule.app(), "rule saved");
        rule
    }

    /// Replace the whole content with `rules`, published as one change.
    pub fn save_all(&self, rules: Vec<R>) -> Vec<R> {
        let _guard = self.writer.lock();
        let mut next = Generation::empty();
        let saved: Vec<R> = rules
            .into_iter()
            .map(|rule| self.stage(&mut next, rule))
            .collect();
        self.current.store(Arc::new(next));
        info!(count = saved.len(), "rule repository refreshed");
        saved
    }

    /// Remove a rule from all indexes. Unknown ids return `None`.
    pub fn delete(&self, id: u64) -> Option<R> {
        let _guard = self.writer.lock();
        let current = self.current.load();
        if !current.by_id.contains_key(&id) {
            return None;
        }
        let mut next = Generation::clone(&current);
        let removed = next.remove(id);
        self.current.store(Arc::new(next));
        debug!(id, "rule deleted");
        removed
    }

    pub fn find_by_id(&self, id: u64) -> Option<R> {
        self.current.load().by_id.get(&id).cloned()
    }

    /// Rules of one instance, ordered by id.
    pub fn find_all_by_instance(&self, app: &str, ip: &str, port: i32) -> Vec<R> {
        let scope = InstanceScope {
            app: app.to_string(),
            ip: ip.to_string(),
            port,
        };
        let current = self.current.load();
        current.collect(current.by_instance.get(&scope))
    }

    /// Rules of one app, ordered by id.
    pub fn find_all_by_app(&self, app: &str) -> RuleResult<Vec<R>> {
        if app.is_empty() {
            return Err(RuleError::EmptyApp);
        }
        let current = self.current.load();
        Ok(current.collect(current.by_app.get(app)))
    }

    pub fn clear_all(&self) {
        let _guard = self.writer.lock();
        self.current.store(Arc::new(Generation::empty()));
    }

    pub fn len(&self) -> usize {
        self.current.load().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stage(&self, generation: &mut Generation<R>, mut rule: R) -> R {
        let id = match rule.id() {
            Some(id) => {
                self.ids.observe(id);
                id
            }
            None => {
                let id = self.ids.next_id();
                rule.set_id(id);
                id
            }
        };
        generation.insert(id, rule.clone());
        rule
    }
}

impl<R: RuleEntity> Default for RuleRepository<R> {
    fn default() -> Self {
        Self::with_sequential_ids()
    }
}
