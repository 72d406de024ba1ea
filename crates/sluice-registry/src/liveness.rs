//! Clock and threshold access shared by every liveness predicate.

use std::sync::Arc;

use sluice_core::{DashboardSettings, SettingsHandle, SharedClock, SystemClock};

#[derive(Clone)]
pub struct Liveness {
    clock: SharedClock,
    settings: SettingsHandle,
}

impl Liveness {
    pub fn new(clock: SharedClock, settings: SettingsHandle) -> Self {
        Self { clock, settings }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn settings(&self) -> Arc<DashboardSettings> {
        self.settings.load()
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new(SystemClock::shared(), SettingsHandle::default())
    }
}
