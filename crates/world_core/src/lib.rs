//! # World Core - Authoritative In-Memory World Model
//!
//! The live state of an Outpost survival world and the scheduler that moves
//! it forward. Request handlers (chat, combat, trading, quests) call into the
//! query/update surface synchronously; the tick engine calls the same surface
//! from its own tasks. Persistence, HTTP, authentication and the WebSocket
//! fan-out are collaborators outside this crate.
//!
//! ## Components
//!
//! * [`WorldState`] - players, NPCs, nodes and events keyed by id, with a
//!   reverse index by node for spatial queries
//! * [`RegionManager`] - static node grouping, per-region load, crisis state
//!   and shard placement metadata
//! * [`RelationshipEngine`] - pairwise NPC relationship vectors, derived
//!   state and narrative interactions
//! * [`TickEngine`] - main, fast and slow cadences driving the simulation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use world_core::{create_world, WorldSeed};
//!
//! # async fn run() -> Result<(), world_core::WorldError> {
//! let core = create_world();
//! core.seed(WorldSeed::outbreak())?;
//! core.ticks.on_broadcast(|message| {
//!     println!("{}", serde_json::to_string(message).unwrap_or_default());
//! });
//! core.start();
//! // ... serve requests ...
//! core.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure Model
//!
//! Queries and mutations never fail: unknown ids come back as `None` or
//! `false`. A failing or panicking tick sub-step is logged and counted and
//! the rest of the tick still runs.
//!
//! ## Thread Safety
//!
//! Entity tables are `DashMap`s; the node index sits behind a single
//! `parking_lot::RwLock` taken before any entity entry, so relocation is
//! atomic for readers. Relationship updates are atomic per pair.

pub use bootstrap::{NpcSeed, SeedSummary, WorldSeed};
pub use broadcast::{BroadcastMessage, CombatOutcome, TickInfo, TickKind};
pub use config::{
    RelationshipSettings, SimulationSettings, StateSettings, TickSettings, WorldConfig,
};
pub use error::{TickError, TickResult, WorldError, WorldResult};
pub use handle::{create_world, create_world_with_config, WorldCore};
pub use regions::{CrisisKind, Region, RegionManager, RegionSpec, RegionStatus};
pub use relationships::{
    Interaction, InteractionCategory, RelationshipDeltas, RelationshipEngine, RelationshipRecord,
    RelationshipState,
};
pub use tick::{CombatResolver, DefaultCombatResolver, RoundOutcome, TickEngine, TickStats};
pub use world::{WorldSnapshot, WorldState, WorldStats};

pub mod bootstrap;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod regions;
pub mod relationships;
pub mod tick;
pub mod timers;
pub mod types;
pub mod world;

mod handle;
