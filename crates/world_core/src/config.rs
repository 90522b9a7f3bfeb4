//! World configuration types and defaults.
//!
//! Every field has a serde default so a partial TOML table only needs to
//! name the values it overrides.

use crate::error::WorldError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_main_interval() -> u64 {
    1000
}

fn default_fast_interval() -> u64 {
    200
}

fn default_slow_interval() -> u64 {
    5000
}

fn default_region_refresh_every() -> u64 {
    10
}

fn default_cleanup_every() -> u64 {
    60
}

fn default_diagnostics_every() -> u64 {
    30
}

fn default_social_every() -> u64 {
    5
}

/// Scheduler cadences. Intervals are in milliseconds; the `*_every` values
/// count main ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSettings {
    #[serde(default = "default_main_interval")]
    pub main_interval_ms: u64,
    #[serde(default = "default_fast_interval")]
    pub fast_interval_ms: u64,
    #[serde(default = "default_slow_interval")]
    pub slow_interval_ms: u64,
    #[serde(default = "default_region_refresh_every")]
    pub region_refresh_every: u64,
    #[serde(default = "default_cleanup_every")]
    pub cleanup_every: u64,
    #[serde(default = "default_diagnostics_every")]
    pub diagnostics_every: u64,
    #[serde(default = "default_social_every")]
    pub social_every: u64,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self {
            main_interval_ms: default_main_interval(),
            fast_interval_ms: default_fast_interval(),
            slow_interval_ms: default_slow_interval(),
            region_refresh_every: default_region_refresh_every(),
            cleanup_every: default_cleanup_every(),
            diagnostics_every: default_diagnostics_every(),
            social_every: default_social_every(),
        }
    }
}

impl TickSettings {
    pub fn main_interval(&self) -> Duration {
        Duration::from_millis(self.main_interval_ms)
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_millis(self.fast_interval_ms)
    }

    pub fn slow_interval(&self) -> Duration {
        Duration::from_millis(self.slow_interval_ms)
    }
}

fn default_stale_player_secs() -> u64 {
    300
}

/// Registry housekeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSettings {
    /// How long an offline player stays in memory before cleanup.
    #[serde(default = "default_stale_player_secs")]
    pub stale_player_secs: u64,
}

impl Default for StateSettings {
    fn default() -> Self {
        Self {
            stale_player_secs: default_stale_player_secs(),
        }
    }
}

fn default_relationship_stale_secs() -> u64 {
    300
}

fn default_interaction_chance() -> f64 {
    0.1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSettings {
    /// Idle time after which a relationship starts drifting back to neutral.
    #[serde(default = "default_relationship_stale_secs")]
    pub stale_after_secs: u64,
    /// Chance per co-located pair per social pass of an interaction.
    #[serde(default = "default_interaction_chance")]
    pub interaction_chance: f64,
}

impl Default for RelationshipSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: default_relationship_stale_secs(),
            interaction_chance: default_interaction_chance(),
        }
    }
}

fn default_need_decay() -> i32 {
    1
}

fn default_hp_regen() -> i32 {
    1
}

fn default_hunger_decay() -> i32 {
    1
}

fn default_starvation_damage() -> i32 {
    5
}

/// Per-tick simulation rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// NPC need loss per main tick.
    #[serde(default = "default_need_decay")]
    pub need_decay: i32,
    /// Player HP regained per slow tick outside combat.
    #[serde(default = "default_hp_regen")]
    pub hp_regen: i32,
    /// Player satiety lost per slow tick.
    #[serde(default = "default_hunger_decay")]
    pub hunger_decay: i32,
    /// HP lost per slow tick at zero satiety.
    #[serde(default = "default_starvation_damage")]
    pub starvation_damage: i32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            need_decay: default_need_decay(),
            hp_regen: default_hp_regen(),
            hunger_decay: default_hunger_decay(),
            starvation_damage: default_starvation_damage(),
        }
    }
}

/// Root configuration for a world instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub tick: TickSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub relationships: RelationshipSettings,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

impl WorldConfig {
    /// Checks the values a running scheduler cannot tolerate.
    pub fn validate(&self) -> Result<(), WorldError> {
        let tick = &self.tick;
        if tick.main_interval_ms == 0 || tick.fast_interval_ms == 0 || tick.slow_interval_ms == 0 {
            return Err(WorldError::InvalidConfig(
                "tick intervals must be greater than zero".to_string(),
            ));
        }
        if tick.region_refresh_every == 0
            || tick.cleanup_every == 0
            || tick.diagnostics_every == 0
            || tick.social_every == 0
        {
            return Err(WorldError::InvalidConfig(
                "tick periods (*_every) must be greater than zero".to_string(),
            ));
        }
        let chance = self.relationships.interaction_chance;
        if !(0.0..=1.0).contains(&chance) {
            return Err(WorldError::InvalidConfig(format!(
                "interaction_chance must be within 0..=1, got {chance}"
            )));
        }
        Ok(())
    }
}
