//! Cadence bodies. Each sub-step runs through `run_step`, so a failure or a
//! panic in one of them is logged and counted while the rest of the tick
//! carries on.

use super::Shared;
use crate::broadcast::{BroadcastMessage, CombatOutcome, TickInfo, TickKind};
use crate::error::{TickError, TickResult};
use crate::types::{after, Player, PlayerId, Timestamp};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const LOW_MORALE_NEEDS: i32 = 30;
const HIGH_MORALE_NEEDS: i32 = 70;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A period of 0 disables the sub-step.
fn is_due(tick: u64, period: u64) -> bool {
    tick.checked_rem(period) == Some(0)
}

fn partial(failures: usize) -> TickResult<()> {
    if failures == 0 {
        Ok(())
    } else {
        Err(TickError::Partial(failures))
    }
}

impl Shared {
    pub(super) fn run_step(&self, step: &'static str, f: impl FnOnce() -> TickResult<()>) -> bool {
        let error = match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e,
            Err(payload) => TickError::Panicked {
                step,
                message: panic_message(payload.as_ref()),
            },
        };
        self.step_failures.fetch_add(1, Ordering::Relaxed);
        error!("❌ Tick step '{}' failed: {}", step, error);
        false
    }

    // ------------------------------------------------------------------
    // Main cadence
    // ------------------------------------------------------------------

    pub(super) fn main_tick(&self, now: Timestamp) -> bool {
        let Some(_guard) = self.main_guard.try_lock() else {
            self.skipped_overlaps.fetch_add(1, Ordering::Relaxed);
            debug!("Main tick still running, skipping");
            return false;
        };
        let tick = self.main_ticks.fetch_add(1, Ordering::Relaxed) + 1;

        self.run_step("npc_needs", || self.decay_npc_needs());
        self.run_step("event_expiry", || self.expire_events(now));
        if is_due(tick, self.settings.social_every) {
            self.run_step("npc_social", || self.social_pass(now));
        }
        if is_due(tick, self.settings.region_refresh_every) {
            self.run_step("region_stats", || {
                self.regions.update_region_stats_at(now);
                Ok(())
            });
        }
        if is_due(tick, self.settings.cleanup_every) {
            self.run_step("player_cleanup", || {
                self.world.cleanup_at(now);
                Ok(())
            });
        }
        if is_due(tick, self.settings.diagnostics_every) {
            self.run_step("diagnostics", || {
                self.log_diagnostics(tick);
                Ok(())
            });
        }

        let info = TickInfo {
            tick,
            kind: TickKind::Main,
            timestamp: now,
        };
        self.run_step("on_tick", || {
            for hook in self.tick_hooks.read().iter() {
                hook(&info);
            }
            Ok(())
        });
        true
    }

    fn decay_npc_needs(&self) -> TickResult<()> {
        let decay = self.simulation.need_decay;
        for id in self.world.npc_ids() {
            self.world.with_npc_mut(&id, |npc| {
                if !npc.is_alive() {
                    return;
                }
                let Some(needs) = npc.needs.as_mut() else {
                    return;
                };
                for need in [
                    &mut needs.hunger,
                    &mut needs.thirst,
                    &mut needs.fatigue,
                    &mut needs.safety,
                    &mut needs.social,
                ] {
                    *need = (*need - decay).clamp(0, 100);
                }
                let average = needs.average();
                if average < LOW_MORALE_NEEDS {
                    npc.morale = (npc.morale - 1).max(0);
                } else if average > HIGH_MORALE_NEEDS {
                    npc.morale = (npc.morale + 1).min(100);
                }
            });
        }
        Ok(())
    }

    fn expire_events(&self, now: Timestamp) -> TickResult<()> {
        for event in self.world.expire_events(now) {
            debug!("⌛ Event {} ({}) expired", event.id, event.event_type);
            self.broadcast(BroadcastMessage::EventExpired {
                event_id: event.id,
                node_id: event.node_id,
                event_type: event.event_type,
            });
        }
        Ok(())
    }

    fn social_pass(&self, now: Timestamp) -> TickResult<()> {
        let interactions = {
            let mut rng = self.rng.lock();
            self.relationships.social_pass_with(&mut *rng, now)
        };
        for interaction in interactions {
            debug!("💬 {}", interaction.description);
            self.broadcast(BroadcastMessage::NpcInteraction { interaction });
        }
        Ok(())
    }

    fn log_diagnostics(&self, tick: u64) {
        let stats = self.world.stats();
        info!(
            "📊 Tick {}: {} player(s) ({} online), {} NPC(s) ({} alive), {} node(s), {} event(s)",
            tick,
            stats.players,
            stats.online_players,
            stats.npcs,
            stats.living_npcs,
            stats.nodes,
            stats.events
        );
        info!(
            "📊 Tick {}: {} relationship(s), {} failed step(s)",
            tick,
            self.relationships.len(),
            self.step_failures.load(Ordering::Relaxed)
        );
        if let Some((region, load)) = self.regions.most_loaded_region() {
            info!("📈 Busiest region: {} (load {:.1})", region, load);
        }
    }

    // ------------------------------------------------------------------
    // Fast cadence
    // ------------------------------------------------------------------

    pub(super) fn fast_tick(&self, now: Timestamp) -> bool {
        let Some(_guard) = self.fast_guard.try_lock() else {
            self.skipped_overlaps.fetch_add(1, Ordering::Relaxed);
            debug!("Fast tick still running, skipping");
            return false;
        };
        self.fast_ticks.fetch_add(1, Ordering::Relaxed);

        self.run_step("combat", || self.resolve_combat(now));
        self.run_step("movement", || self.complete_movements(now));
        true
    }

    fn players_sorted(&self, predicate: impl FnMut(&Player) -> bool) -> Vec<Player> {
        let mut players: Vec<Player> = self.world.players().into_iter().filter(predicate).collect();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        players
    }

    fn resolve_combat(&self, now: Timestamp) -> TickResult<()> {
        let resolver = self.resolver.read().clone();
        let mut failures = 0;

        let fighting =
            self.players_sorted(|p| p.combat.as_ref().is_some_and(|c| c.next_round_at <= now));
        for player in fighting {
            let Some(encounter) = player.combat.as_ref() else {
                continue;
            };
            let outcome = match resolver.resolve_round(&player, encounter) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Combat round for player {} failed: {}", player.id, e);
                    failures += 1;
                    continue;
                }
            };
            let experience = resolver.victory_experience(encounter);
            let encounter_id = encounter.id.clone();

            let messages = self.world.with_player_mut(&player.id, |p| {
                let Some(combat) = p.combat.as_mut().filter(|c| c.id == encounter_id) else {
                    return Vec::new();
                };
                combat.round += 1;
                combat.enemy_health = (combat.enemy_health - outcome.damage_dealt).max(0);
                combat.next_round_at = after(now, Duration::from_millis(combat.round_interval_ms));
                // A killing blow lands before the enemy can answer.
                let damage_taken = if combat.enemy_health > 0 { outcome.damage_taken } else { 0 };
                p.health = (p.health - damage_taken).max(0);

                let mut messages = vec![BroadcastMessage::CombatRound {
                    player_id: p.id.clone(),
                    enemy: combat.enemy.clone(),
                    round: combat.round,
                    damage_dealt: outcome.damage_dealt,
                    damage_taken,
                    player_health: p.health,
                    enemy_health: combat.enemy_health,
                }];

                let ended = if combat.enemy_health == 0 {
                    Some(CombatOutcome::Victory)
                } else if p.health == 0 {
                    Some(CombatOutcome::Defeat)
                } else {
                    None
                };
                if let Some(outcome) = ended {
                    let enemy = combat.enemy.clone();
                    p.combat = None;
                    if outcome == CombatOutcome::Victory {
                        p.stats.kills += 1;
                        p.stats.experience += experience;
                    }
                    messages.push(BroadcastMessage::CombatEnded {
                        player_id: p.id.clone(),
                        enemy,
                        outcome,
                    });
                }
                messages
            });

            match messages {
                Some(messages) => messages.into_iter().for_each(|m| self.broadcast(m)),
                None => debug!("Player {} left mid-combat", player.id),
            }
        }
        partial(failures)
    }

    fn complete_movements(&self, now: Timestamp) -> TickResult<()> {
        let arriving =
            self.players_sorted(|p| p.movement.as_ref().is_some_and(|m| m.arrives_at <= now));

        for player in arriving {
            let Some(movement) = player.movement else {
                continue;
            };
            if !self.world.has_node(&movement.to) {
                debug!("Player {} arriving at unknown node {}", player.id, movement.to);
            }
            if !self.world.update_player_node(&player.id, &movement.from, &movement.to) {
                continue;
            }
            self.world.with_player_mut(&player.id, |p| {
                if p.movement.as_ref() == Some(&movement) {
                    p.movement = None;
                }
            });
            self.broadcast(BroadcastMessage::MovementCompleted {
                player_id: player.id,
                from: movement.from,
                to: movement.to,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Slow cadence
    // ------------------------------------------------------------------

    pub(super) fn slow_tick(&self, now: Timestamp) -> bool {
        let Some(_guard) = self.slow_guard.try_lock() else {
            self.skipped_overlaps.fetch_add(1, Ordering::Relaxed);
            debug!("Slow tick still running, skipping");
            return false;
        };
        self.slow_ticks.fetch_add(1, Ordering::Relaxed);

        self.run_step("resources", || self.update_resources());
        self.run_step("hunger", || self.apply_hunger());
        self.run_step("hp_regen", || self.regenerate_health());
        self.run_step("relationship_decay", || {
            self.relationships.decay_all_at(now);
            Ok(())
        });
        true
    }

    fn update_resources(&self) -> TickResult<()> {
        for node_id in self.world.node_ids() {
            let multiplier = self.regions.resource_multiplier_for_node(&node_id);
            self.world.with_node_mut(&node_id, |node| {
                for stock in node.resources.values_mut() {
                    stock.amount = (stock.amount - stock.decay).max(0.0);
                    stock.amount = (stock.amount + stock.regen * multiplier).min(stock.cap);
                }
            });
        }
        Ok(())
    }

    fn online_player_ids(&self) -> Vec<PlayerId> {
        self.world.online_players().into_iter().map(|p| p.id).collect()
    }

    fn apply_hunger(&self) -> TickResult<()> {
        let decay = self.simulation.hunger_decay;
        let damage = self.simulation.starvation_damage;
        for id in self.online_player_ids() {
            self.world.with_player_mut(&id, |p| {
                if p.is_dead() {
                    return;
                }
                p.hunger = (p.hunger - decay).max(0);
                if p.hunger == 0 {
                    p.health = (p.health - damage).max(0);
                    debug!("🍖 Player {} is starving ({} hp)", p.id, p.health);
                }
            });
        }
        Ok(())
    }

    fn regenerate_health(&self) -> TickResult<()> {
        let regen = self.simulation.hp_regen;
        for id in self.online_player_ids() {
            self.world.with_player_mut(&id, |p| {
                if p.in_combat() || p.is_dead() || p.hunger == 0 {
                    return;
                }
                p.health = (p.health + regen).min(p.max_health);
            });
        }
        Ok(())
    }

    pub(super) fn broadcast(&self, message: BroadcastMessage) {
        let hooks = self.broadcast_hooks.read();
        if hooks.is_empty() {
            debug!("No broadcast listener for {}", message.kind());
            return;
        }
        for hook in hooks.iter() {
            hook(&message);
        }
    }
}
