//! Core entity types shared by every world component.
//!
//! Identifiers are thin string newtypes so that a player id can never be
//! passed where a node id is expected. Entities are plain data; all
//! consistency rules (indexing, clamping, state transitions) live in the
//! component that owns them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of a connected or registered player.
    PlayerId
);
string_id!(
    /// Identifier of a non-player character.
    NpcId
);
string_id!(
    /// Identifier of a map location.
    NodeId
);
string_id!(
    /// Identifier of a static group of nodes.
    RegionId
);
string_id!(
    /// Identifier of a timed world event.
    EventId
);

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Adds a duration to a millisecond timestamp, saturating on overflow.
pub fn after(ts: Timestamp, duration: Duration) -> Timestamp {
    ts.saturating_add(duration.as_millis() as u64)
}

// ============================================================================
// Players
// ============================================================================

/// Progression counters for a player.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub level: u32,
    pub experience: u64,
    pub kills: u32,
}

/// A travel order in flight. Completed by the fast tick once `arrives_at`
/// has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub from: NodeId,
    pub to: NodeId,
    pub started_at: Timestamp,
    pub arrives_at: Timestamp,
}

/// A fight between a player and a hostile, resolved round by round on the
/// fast cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatEncounter {
    pub id: String,
    pub enemy: String,
    pub enemy_health: i32,
    pub enemy_attack: i32,
    pub round: u32,
    pub round_interval_ms: u64,
    pub next_round_at: Timestamp,
}

impl CombatEncounter {
    pub fn new(
        enemy: impl Into<String>,
        enemy_health: i32,
        enemy_attack: i32,
        now: Timestamp,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enemy: enemy.into(),
            enemy_health,
            enemy_attack,
            round: 0,
            round_interval_ms: 1000,
            next_round_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub node_id: Option<NodeId>,
    pub online: bool,
    pub health: i32,
    pub max_health: i32,
    /// Satiety from 0 (starving) to 100 (full).
    pub hunger: i32,
    pub stats: PlayerStats,
    pub last_seen: Timestamp,
    pub movement: Option<Movement>,
    pub combat: Option<CombatEncounter>,
}

impl Player {
    /// A freshly connected player at full health.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>, node_id: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_id,
            online: true,
            health: 100,
            max_health: 100,
            hunger: 100,
            stats: PlayerStats::default(),
            last_seen: now_millis(),
            movement: None,
            combat: None,
        }
    }

    pub fn in_combat(&self) -> bool {
        self.combat.is_some()
    }

    pub fn is_dead(&self) -> bool {
        self.health <= 0
    }
}

// ============================================================================
// NPCs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NpcStatus {
    Alive,
    Dead,
}

/// Satisfaction levels in `0..=100`; decay pulls every value toward 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Needs {
    pub hunger: i32,
    pub thirst: i32,
    pub fatigue: i32,
    pub safety: i32,
    pub social: i32,
}

impl Default for Needs {
    fn default() -> Self {
        Self {
            hunger: 100,
            thirst: 100,
            fatigue: 100,
            safety: 100,
            social: 100,
        }
    }
}

impl Needs {
    pub fn average(&self) -> i32 {
        (self.hunger + self.thirst + self.fatigue + self.safety + self.social) / 5
    }
}

/// Personality traits in `0..=100`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Personality {
    pub sociability: i32,
    pub aggression: i32,
    pub empathy: i32,
    pub courage: i32,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            sociability: 50,
            aggression: 50,
            empathy: 50,
            courage: 50,
        }
    }
}

/// Derived view of a relationship, mirrored onto both NPCs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSummary {
    pub state: crate::relationships::RelationshipState,
    pub intensity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Npc {
    pub id: NpcId,
    pub name: String,
    pub node_id: Option<NodeId>,
    pub status: NpcStatus,
    /// Traders and other scripted NPCs have no needs to simulate.
    pub needs: Option<Needs>,
    pub morale: i32,
    pub personality: Personality,
    #[serde(default)]
    pub relationships: HashMap<NpcId, RelationshipSummary>,
}

impl Npc {
    pub fn new(id: impl Into<NpcId>, name: impl Into<String>, node_id: Option<NodeId>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_id,
            status: NpcStatus::Alive,
            needs: Some(Needs::default()),
            morale: 70,
            personality: Personality::default(),
            relationships: HashMap::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status == NpcStatus::Alive
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceStock {
    pub amount: f64,
    pub cap: f64,
    /// Units lost per slow tick.
    #[serde(default)]
    pub decay: f64,
    /// Units regained per slow tick before the region multiplier.
    #[serde(default)]
    pub regen: f64,
}

impl ResourceStock {
    pub fn new(amount: f64, cap: f64, decay: f64, regen: f64) -> Self {
        Self {
            amount,
            cap,
            decay,
            regen,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub region_id: RegionId,
    #[serde(default)]
    pub connections: Vec<NodeId>,
    #[serde(default)]
    pub resources: HashMap<String, ResourceStock>,
}

impl Node {
    pub fn new(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        region_id: impl Into<RegionId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            region_id: region_id.into(),
            connections: Vec::new(),
            resources: HashMap::new(),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: EventId,
    pub node_id: NodeId,
    pub event_type: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl WorldEvent {
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        self.start_time <= now && now < self.end_time
    }
}
