//! Region partitioning, load tracking and shard placement metadata.
//!
//! Regions are registered once at bootstrap and never change membership.
//! Status follows a small state machine:
//!
//! ```text
//! active --trigger(horde|shortage)--> crisis --resolve--> active
//! active --trigger(lockdown)--------> locked --resolve--> active
//! ```
//!
//! Crisis effects (zombie density, resource multiplier) are stored here and
//! read by gameplay code; `locked` is only a flag, entry is not blocked by
//! this module.

use crate::error::{WorldError, WorldResult};
use crate::timers::TimerSet;
use crate::types::{now_millis, NodeId, RegionId, Timestamp};
use crate::world::WorldState;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const SAME_REGION_TRAVEL: Duration = Duration::from_secs(5);
pub const ADJACENT_REGION_TRAVEL: Duration = Duration::from_secs(15);
pub const DISTANT_REGION_TRAVEL: Duration = Duration::from_secs(30);

/// A region only migrates while it is this quiet.
const MIGRATION_MAX_PLAYERS: usize = 5;
const MIGRATION_MAX_EVENTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Active,
    Crisis,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrisisKind {
    /// Doubles zombie density.
    ZombieHorde,
    /// Halves the resource multiplier.
    ResourceShortage,
    /// Locks the region.
    Lockdown,
}

impl CrisisKind {
    fn status(self) -> RegionStatus {
        match self {
            CrisisKind::Lockdown => RegionStatus::Locked,
            CrisisKind::ZombieHorde | CrisisKind::ResourceShortage => RegionStatus::Crisis,
        }
    }
}

impl FromStr for CrisisKind {
    type Err = WorldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zombie_horde" | "horde" => Ok(CrisisKind::ZombieHorde),
            "resource_shortage" | "shortage" => Ok(CrisisKind::ResourceShortage),
            "lockdown" => Ok(CrisisKind::Lockdown),
            other => Err(WorldError::UnknownCrisis(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveCrisis {
    pub kind: CrisisKind,
    pub started_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    /// Distinguishes successive crises so a stale expiry timer is a no-op.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardAssignment {
    pub shard_id: String,
    pub host: String,
    pub assigned_at: Timestamp,
}

/// Bootstrap description of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSpec {
    pub id: RegionId,
    pub name: String,
    pub node_ids: Vec<NodeId>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    #[serde(default = "default_multiplier")]
    pub zombie_density: f64,
    #[serde(default = "default_multiplier")]
    pub resource_multiplier: f64,
}

fn default_difficulty() -> u32 {
    1
}

fn default_multiplier() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub node_ids: Vec<NodeId>,
    pub difficulty: u32,
    pub zombie_density: f64,
    pub resource_multiplier: f64,
    pub base_zombie_density: f64,
    pub base_resource_multiplier: f64,
    pub status: RegionStatus,
    pub crisis: Option<ActiveCrisis>,
    pub shard: Option<ShardAssignment>,
    pub player_count: usize,
    pub npc_count: usize,
    pub active_events: usize,
    pub stats_updated_at: Timestamp,
}

impl Region {
    fn from_spec(spec: RegionSpec) -> Self {
        Self {
            id: spec.id,
            name: spec.name,
            node_ids: spec.node_ids,
            difficulty: spec.difficulty,
            zombie_density: spec.zombie_density,
            resource_multiplier: spec.resource_multiplier,
            base_zombie_density: spec.zombie_density,
            base_resource_multiplier: spec.resource_multiplier,
            status: RegionStatus::Active,
            crisis: None,
            shard: None,
            player_count: 0,
            npc_count: 0,
            active_events: 0,
            stats_updated_at: 0,
        }
    }

    /// `players + 0.5·npcs + 2·active_events` from the last stats refresh.
    pub fn load(&self) -> f64 {
        self.player_count as f64 + 0.5 * self.npc_count as f64 + 2.0 * self.active_events as f64
    }

    pub fn is_locked(&self) -> bool {
        self.status == RegionStatus::Locked
    }
}

pub struct RegionManager {
    world: Arc<WorldState>,
    regions: DashMap<RegionId, Region>,
    node_regions: DashMap<NodeId, RegionId>,
    adjacency: RwLock<HashMap<RegionId, HashSet<RegionId>>>,
    crisis_timers: TimerSet<RegionId>,
    crisis_sequence: std::sync::atomic::AtomicU64,
    self_ref: Weak<RegionManager>,
}

impl RegionManager {
    pub fn new(world: Arc<WorldState>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            world,
            regions: DashMap::new(),
            node_regions: DashMap::new(),
            adjacency: RwLock::new(HashMap::new()),
            crisis_timers: TimerSet::new(),
            crisis_sequence: std::sync::atomic::AtomicU64::new(1),
            self_ref: self_ref.clone(),
        })
    }

    /// Registers a region and claims its nodes. Bootstrap only: a node
    /// already owned by another region is rejected and nothing is changed.
    pub fn create_region(&self, spec: RegionSpec) -> WorldResult<()> {
        if self.regions.contains_key(&spec.id) {
            return Err(WorldError::DuplicateRegion(spec.id));
        }
        for node in &spec.node_ids {
            if let Some(existing) = self.node_regions.get(node) {
                return Err(WorldError::RegionConflict {
                    node: node.clone(),
                    existing: existing.value().clone(),
                    requested: spec.id.clone(),
                });
            }
        }

        for node in &spec.node_ids {
            self.node_regions.insert(node.clone(), spec.id.clone());
        }
        info!(
            "🗺️ Region {} ({}) registered with {} node(s)",
            spec.id,
            spec.name,
            spec.node_ids.len()
        );
        self.regions.insert(spec.id.clone(), Region::from_spec(spec));
        Ok(())
    }

    /// Declares two regions adjacent (symmetric).
    pub fn connect_regions(&self, a: &RegionId, b: &RegionId) -> WorldResult<()> {
        for id in [a, b] {
            if !self.regions.contains_key(id) {
                return Err(WorldError::UnknownRegion(id.clone()));
            }
        }
        let mut adjacency = self.adjacency.write();
        adjacency.entry(a.clone()).or_default().insert(b.clone());
        adjacency.entry(b.clone()).or_default().insert(a.clone());
        Ok(())
    }

    pub fn are_adjacent(&self, a: &RegionId, b: &RegionId) -> bool {
        self.adjacency.read().get(a).is_some_and(|n| n.contains(b))
    }

    /// Neighbours of `id`, sorted by id.
    pub fn adjacent_regions(&self, id: &RegionId) -> Vec<RegionId> {
        let mut neighbours: Vec<RegionId> = self
            .adjacency
            .read()
            .get(id)
            .map(|n| n.iter().cloned().collect())
            .unwrap_or_default();
        neighbours.sort();
        neighbours
    }

    /// Drops a region and any pending crisis timer for it.
    pub fn remove_region(&self, id: &RegionId) -> Option<Region> {
        self.crisis_timers.cancel(id);
        let (_, region) = self.regions.remove(id)?;
        for node in &region.node_ids {
            self.node_regions.remove(node);
        }
        let mut adjacency = self.adjacency.write();
        adjacency.remove(id);
        for neighbours in adjacency.values_mut() {
            neighbours.remove(id);
        }
        Some(region)
    }

    pub fn get_region(&self, id: &RegionId) -> Option<Region> {
        self.regions.get(id).map(|r| r.value().clone())
    }

    pub fn regions(&self) -> Vec<Region> {
        self.regions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn region_of_node(&self, node: &NodeId) -> Option<RegionId> {
        self.node_regions.get(node).map(|r| r.value().clone())
    }

    pub fn resource_multiplier_for_node(&self, node: &NodeId) -> f64 {
        self.region_of_node(node)
            .and_then(|id| self.regions.get(&id).map(|r| r.resource_multiplier))
            .unwrap_or(1.0)
    }

    pub fn update_region_stats(&self) {
        self.update_region_stats_at(now_millis());
    }

    /// Recounts players, NPCs and active events per region from the node
    /// indexes.
    pub fn update_region_stats_at(&self, now: Timestamp) {
        let mut events_per_node: HashMap<NodeId, usize> = HashMap::new();
        for event in self.world.active_events_at(now) {
            *events_per_node.entry(event.node_id).or_default() += 1;
        }

        for mut region in self.regions.iter_mut() {
            let mut players = 0;
            let mut npcs = 0;
            let mut events = 0;
            for node in &region.node_ids {
                players += self.world.player_count_in_node(node);
                npcs += self.world.npc_count_in_node(node);
                events += events_per_node.get(node).copied().unwrap_or(0);
            }
            region.player_count = players;
            region.npc_count = npcs;
            region.active_events = events;
            region.stats_updated_at = now;
        }
    }

    pub fn get_region_load(&self, id: &RegionId) -> Option<f64> {
        self.regions.get(id).map(|r| r.load())
    }

    /// The busiest region, the first candidate for a future shard split.
    pub fn most_loaded_region(&self) -> Option<(RegionId, f64)> {
        self.regions
            .iter()
            .map(|r| (r.id.clone(), r.load()))
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)))
    }

    /// Moves an active region into crisis (or lockdown). Returns `false` if
    /// the region is unknown or not active.
    pub fn trigger_region_crisis(&self, id: &RegionId, kind: CrisisKind) -> bool {
        self.start_crisis(id, kind, None).is_some()
    }

    /// As [`trigger_region_crisis`](Self::trigger_region_crisis), resolving
    /// automatically after `duration` unless resolved earlier.
    /// Needs a tokio runtime for the expiry; without one nothing changes.
    pub fn trigger_region_crisis_for(
        &self,
        id: &RegionId,
        kind: CrisisKind,
        duration: Duration,
    ) -> bool {
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No runtime for the expiry of a {:?} crisis in {}, not starting it", kind, id);
            return false;
        }
        let Some(sequence) = self.start_crisis(id, kind, Some(duration)) else {
            return false;
        };

        let manager = self.self_ref.clone();
        let region_id = id.clone();
        let scheduled = self.crisis_timers.schedule(id.clone(), duration, move || {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let current = manager
                .regions
                .get(&region_id)
                .and_then(|r| r.crisis.as_ref().map(|c| c.sequence));
            if current == Some(sequence) {
                info!("⏰ Crisis in region {} expired", region_id);
                manager.resolve_region_crisis(&region_id);
            } else {
                debug!("Stale crisis timer for region {} ignored", region_id);
            }
        });
        if !scheduled {
            self.resolve_region_crisis(id);
        }
        scheduled
    }

    fn start_crisis(
        &self,
        id: &RegionId,
        kind: CrisisKind,
        duration: Option<Duration>,
    ) -> Option<u64> {
        let Some(mut region) = self.regions.get_mut(id) else {
            debug!("Crisis requested for unknown region {}", id);
            return None;
        };
        if region.status != RegionStatus::Active {
            warn!(
                "Region {} is {:?}, cannot start a {:?} crisis",
                id, region.status, kind
            );
            return None;
        }

        let now = now_millis();
        let sequence = self
            .crisis_sequence
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        match kind {
            CrisisKind::ZombieHorde => region.zombie_density *= 2.0,
            CrisisKind::ResourceShortage => region.resource_multiplier *= 0.5,
            CrisisKind::Lockdown => {}
        }
        region.status = kind.status();
        region.crisis = Some(ActiveCrisis {
            kind,
            started_at: now,
            expires_at: duration.map(|d| crate::types::after(now, d)),
            sequence,
        });
        info!("🚨 Region {} entered {:?} ({:?})", id, region.status, kind);
        Some(sequence)
    }

    /// Returns a region in crisis or lockdown to active, restoring its base
    /// multipliers and cancelling any pending expiry.
    pub fn resolve_region_crisis(&self, id: &RegionId) -> bool {
        let Some(mut region) = self.regions.get_mut(id) else {
            debug!("Resolve requested for unknown region {}", id);
            return false;
        };
        if region.status == RegionStatus::Active {
            return false;
        }

        region.status = RegionStatus::Active;
        region.crisis = None;
        region.zombie_density = region.base_zombie_density;
        region.resource_multiplier = region.base_resource_multiplier;
        drop(region);

        self.crisis_timers.cancel(id);
        info!("✅ Region {} back to active", id);
        true
    }

    pub fn has_pending_expiry(&self, id: &RegionId) -> bool {
        self.crisis_timers.is_pending(id)
    }

    /// Travel cost between two nodes, derived only from region membership
    /// and adjacency. Unknown nodes cost the distant rate.
    pub fn calculate_travel_time(&self, from: &NodeId, to: &NodeId) -> Duration {
        if from == to {
            return Duration::ZERO;
        }
        let (Some(a), Some(b)) = (self.region_of_node(from), self.region_of_node(to)) else {
            return DISTANT_REGION_TRAVEL;
        };
        if a == b {
            SAME_REGION_TRAVEL
        } else if self.are_adjacent(&a, &b) {
            ADJACENT_REGION_TRAVEL
        } else {
            DISTANT_REGION_TRAVEL
        }
    }

    /// Guard for the (future) shard migration path: only quiet regions move.
    pub fn can_migrate_region(&self, id: &RegionId) -> bool {
        self.regions.get(id).is_some_and(|r| {
            r.player_count < MIGRATION_MAX_PLAYERS && r.active_events < MIGRATION_MAX_EVENTS
        })
    }

    /// Records routing metadata only; nothing is migrated.
    pub fn assign_region_to_shard(&self, id: &RegionId, shard_id: &str, host: &str) -> bool {
        let Some(mut region) = self.regions.get_mut(id) else {
            return false;
        };
        region.shard = Some(ShardAssignment {
            shard_id: shard_id.to_string(),
            host: host.to_string(),
            assigned_at: now_millis(),
        });
        info!("🧭 Region {} assigned to shard {} at {}", id, shard_id, host);
        true
    }

    pub fn shard_assignments(&self) -> Vec<(RegionId, ShardAssignment)> {
        self.regions
            .iter()
            .filter_map(|r| r.shard.clone().map(|s| (r.id.clone(), s)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
