//! Controller-side state machine for AVDECC (IEEE 1722.1) and Milan.
//!
//! This crate turns the raw traffic of a protocol layer into a consistent,
//! observable model of every remote entity on the network:
//!
//! - **[`Controller`]** — Central facade. Feed it discovery events
//!   ([`on_entity_online`](Controller::on_entity_online) and friends),
//!   responses ([`handle_response`](Controller::handle_response)) and
//!   unsolicited notifications; it enumerates each entity, keeps its model
//!   current, and exposes typed async commands. Network-side entry points
//!   are synchronous and never block on the network.
//!
//! - **Enumeration** — Each entity walks an ordered list of
//!   [`EnumerationStep`]s (Milan info, notification registration, packed
//!   dynamic-info probe, static model, descriptor dynamic info, dynamic
//!   info). Failures run through a policy that retries, downgrades the
//!   entity's [`CompatibilityFlags`], falls back from a cached model, or
//!   gives up. Observers see an entity only once it is complete.
//!
//! - **[`EntityModelCache`]** — Static models keyed by entity model id,
//!   injected as an `Arc` so several controllers can share one.
//!
//! - **Exclusive access** — Idempotent acquire/lock with in-flight
//!   serialization, plus RAII [`ExclusiveAccessToken`]s that release when
//!   the last holder goes away.
//!
//! - **Events** — [`ControllerEvent`]s over a `tokio::sync::broadcast`
//!   channel; a `watch` channel carries the current entity list.

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod model;
pub mod registry;
pub mod tokens;

mod access;
mod controller;
mod enumeration;
mod pending;
mod scheduler;
mod update;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::EntityModelCache;
pub use config::ControllerConfig;
pub use controller::Controller;
pub use enumeration::steps::{EnumerationStep, EnumerationSteps};
pub use error::CoreError;
pub use event::{ControllerEvent, QueryErrorKind};
pub use registry::EntityHandle;
pub use tokens::{AccessType, ExclusiveAccessToken};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    AcquireState, CompatibilityFlags, ConfigurationNode, ControlledEntity, EntityNode,
    EntityStatistics, LockState, SanityError,
};
