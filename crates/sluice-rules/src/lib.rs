//! sluice-rules — in-memory mirror of the rules pushed to client apps.
//!
//! A [`RuleRepository`] keeps three views over one rule set: by id, by
//! owning instance (`app`, `ip`, `port`) and by owning app. All three live
//! in a single immutable generation that writers rebuild and publish in
//! one atomic swap, so readers never see the views disagree.
//!
//! Concrete rule kinds implement [`RuleEntity`] and bring their own
//! [`IdAllocator`].

pub mod authority;
pub mod entity;
pub mod error;
pub mod repository;

pub use authority::{AuthorityRule, AuthorityStrategy};
pub use entity::{IdAllocator, RuleEntity, SequentialIds};
pub use error::{RuleError, RuleResult};
pub use repository::RuleRepository;
