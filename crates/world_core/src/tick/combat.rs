//! Pluggable combat resolution.
//!
//! The scheduler only sequences rounds; the numbers come from a
//! [`CombatResolver`]. The default is intentionally flat and is expected to be
//! replaced by the game's own rules.

use crate::error::TickResult;
use crate::types::{CombatEncounter, Player};

/// Damage exchanged in one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub damage_dealt: i32,
    pub damage_taken: i32,
}

pub trait CombatResolver: Send + Sync {
    /// Computes one round. An error skips the round for this player only.
    fn resolve_round(
        &self,
        player: &Player,
        encounter: &CombatEncounter,
    ) -> TickResult<RoundOutcome>;

    /// Experience awarded when the enemy falls.
    fn victory_experience(&self, _encounter: &CombatEncounter) -> u64 {
        25
    }
}

/// Fixed player damage growing with level; the enemy hits for its attack.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCombatResolver;

impl CombatResolver for DefaultCombatResolver {
    fn resolve_round(
        &self,
        player: &Player,
        encounter: &CombatEncounter,
    ) -> TickResult<RoundOutcome> {
        let level = i32::try_from(player.stats.level).unwrap_or(i32::MAX);
        Ok(RoundOutcome {
            damage_dealt: level.saturating_mul(2).saturating_add(8),
            damage_taken: encounter.enemy_attack.max(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    #[test]
    fn test_default_round() {
        let mut player = Player::new("p1", "Sam", Some(NodeId::from("refugio")));
        player.stats.level = 3;
        let encounter = CombatEncounter::new("walker", 30, 7, 0);

        let outcome = DefaultCombatResolver.resolve_round(&player, &encounter).unwrap();
        assert_eq!(outcome, RoundOutcome { damage_dealt: 14, damage_taken: 7 });
        assert_eq!(DefaultCombatResolver.victory_experience(&encounter), 25);
    }
}
