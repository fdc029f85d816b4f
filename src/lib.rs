//! # Kairos — a deterministic discrete-event simulation kernel
//!
//! Kairos executes time-stamped plans and synchronous events over a
//! population of entities, deterministically: the same plugins and the same
//! seed produce bit-identical runs. The kernel is domain-agnostic — every
//! capability (disease progression, population loading, reporting, ...)
//! arrives as a plugin.
//!
//! ## Core Concepts
//!
//! - **Plan**: a one-shot action scheduled at a simulation [`Time`];
//!   equal-time plans run in insertion order
//! - **Event**: an immutable typed message dispatched synchronously to
//!   coarse (per-kind) and fine (per-label) subscribers
//! - **Plugin**: the unit of composition — dependencies, immutable data
//!   payloads, and an initializer
//! - **Data manager**: a per-scenario singleton holding domain state,
//!   looked up by concrete type
//! - **Partition**: an incrementally-maintained index over the entities
//!   matching a filter, bucketed for O(1) uniform sampling
//!
//! ## Usage
//!
//! ```rust
//! use kairos::{KairosResult, Plugin, Simulation, Time};
//!
//! fn main() -> KairosResult<()> {
//!     let mut sim = Simulation::builder()
//!         .with_seed(42)
//!         .add_plugin(
//!             Plugin::builder("people")
//!                 .on_init(|ctx| {
//!                     let person = ctx.create_entity();
//!                     ctx.schedule(Time::new(1.0)?, move |ctx| {
//!                         ctx.remove_entity(person)
//!                     })?;
//!                     Ok(())
//!                 })
//!                 .build()?,
//!         )
//!         .build()?;
//!
//!     sim.execute()?;
//!     assert_eq!(sim.context().entity_count(), 0);
//!     sim.close()
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core value types
pub mod entity;
pub mod error;
pub mod output;
pub mod plugin;
pub mod property;
pub mod rng;
pub mod scheduler;
pub mod time;

// Routing and indexing
pub mod event;
pub mod partition;

// Runtime
pub mod context;
pub mod manager;
pub mod simulation;

// Re-export primary types at crate root for convenience
pub use context::Context;
pub use entity::EntityId;
pub use error::{ConfigurationError, ContractError, KairosError, KairosResult};
pub use event::{Event, EventFilter, EventLabel, KeyPart, LabelKey, LabelerId};
pub use manager::{Actor, DataManager, Report};
pub use output::{
    ChannelConsumer, CollectingConsumer, DiscardConsumer, OutputConsumer, OutputLog, OutputValue,
};
pub use partition::{Filter, FilterSensitivity, PartitionDimension, PartitionId};
pub use plugin::{Plugin, PluginBuilder, PluginData, PluginId};
pub use property::{IndexedPropertyStore, PropertyDefinition, TimeTracking};
pub use rng::{RngState, Well44497};
pub use scheduler::{PlanAction, PlanId, PlanKey};
pub use simulation::{Simulation, SimulationBuilder};
pub use time::Time;
