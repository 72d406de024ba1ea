//! sluice-registry — the application/instance registry of the console.
//!
//! Tracks which client processes are alive from their heartbeats and
//! decides when an application is shown in, hidden from, or purged from
//! the console.
//!
//! # Architecture
//!
//! ```text
//! AppRegistry (app name → AppEntry, DashMap)
//!   ├── register_heartbeat() ← validated Heartbeat parameters
//!   ├── remove_instance() / get_app() / list_app_names()
//!   ├── reap() → drops expired instances and dead apps
//!   └── run() → periodic reap loop
//!
//! AppEntry (identity → InstanceRecord, DashMap)
//!   ├── add_instance() replaces records with the same identity
//!   ├── should_show() / is_dead() via the heartbeat judge
//!   └── get_instances() hands out snapshots only
//! ```
//!
//! Every time-based predicate reads "now" from the injected
//! [`sluice_core::Clock`] and thresholds from the shared
//! [`sluice_core::SettingsHandle`].

pub mod app;
pub mod error;
pub mod heartbeat;
pub mod instance;
pub mod liveness;
pub mod registry;

pub use app::AppEntry;
pub use error::{RegistryError, RegistryResult};
pub use heartbeat::Heartbeat;
pub use instance::{InstanceKey, InstanceRecord, InstanceView};
pub use liveness::Liveness;
pub use registry::{AppBrief, AppRegistry, ReapReport};
