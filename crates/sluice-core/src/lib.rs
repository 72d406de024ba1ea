//! sluice-core — shared building blocks for the Sluice console.
//!
//! Holds the dashboard settings (the four liveness thresholds plus
//! housekeeping intervals) behind a hot-swappable handle, and the clock
//! abstraction every time-based predicate reads "now" from.

pub mod clock;
pub mod config;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{DashboardSettings, SettingsHandle};
