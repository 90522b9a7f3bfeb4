//! Multi-rate scheduler driving the simulation.
//!
//! Three cadences run as independent tokio tasks:
//!
//! * **main** (default 1 s): NPC needs, event expiry, social interactions,
//!   region stats, stale player cleanup, diagnostics, `on_tick` hooks
//! * **fast** (default 200 ms): combat rounds and movement completion
//! * **slow** (default 5 s): node resources, hunger, HP regen, relationship
//!   decay
//!
//! Each cadence holds its own guard while it runs, so a manual tick racing the
//! timer is skipped instead of overlapping. All tick bodies are synchronous;
//! no lock is held across an `.await`.

mod combat;
mod steps;

pub use combat::{CombatResolver, DefaultCombatResolver, RoundOutcome};

use crate::broadcast::{BroadcastMessage, TickInfo, TickKind};
use crate::config::{SimulationSettings, TickSettings, WorldConfig};
use crate::regions::RegionManager;
use crate::relationships::RelationshipEngine;
use crate::types::{now_millis, Timestamp};
use crate::world::WorldState;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

type TickHook = Box<dyn Fn(&TickInfo) + Send + Sync>;
type BroadcastHook = Box<dyn Fn(&BroadcastMessage) + Send + Sync>;

/// Counters reported by [`TickEngine::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickStats {
    pub is_running: bool,
    pub main_ticks: u64,
    pub fast_ticks: u64,
    pub slow_ticks: u64,
    pub step_failures: u64,
    pub skipped_overlaps: u64,
}

/// State shared between the engine handle and its cadence tasks.
struct Shared {
    world: Arc<WorldState>,
    regions: Arc<RegionManager>,
    relationships: Arc<RelationshipEngine>,
    settings: TickSettings,
    simulation: SimulationSettings,
    resolver: RwLock<Arc<dyn CombatResolver>>,
    rng: Mutex<StdRng>,

    running: AtomicBool,
    main_ticks: AtomicU64,
    fast_ticks: AtomicU64,
    slow_ticks: AtomicU64,
    step_failures: AtomicU64,
    skipped_overlaps: AtomicU64,

    main_guard: Mutex<()>,
    fast_guard: Mutex<()>,
    slow_guard: Mutex<()>,

    tick_hooks: RwLock<Vec<TickHook>>,
    broadcast_hooks: RwLock<Vec<BroadcastHook>>,
}

impl Shared {
    fn run(&self, kind: TickKind, now: Timestamp) -> bool {
        match kind {
            TickKind::Main => self.main_tick(now),
            TickKind::Fast => self.fast_tick(now),
            TickKind::Slow => self.slow_tick(now),
        }
    }
}

/// The scheduler. Lifecycle: `new → start → stop → join → drop`.
pub struct TickEngine {
    shared: Arc<Shared>,
    shutdown_sender: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TickEngine {
    pub fn new(
        world: Arc<WorldState>,
        regions: Arc<RegionManager>,
        relationships: Arc<RelationshipEngine>,
        config: &WorldConfig,
    ) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                world,
                regions,
                relationships,
                settings: config.tick.clone(),
                simulation: config.simulation.clone(),
                resolver: RwLock::new(Arc::new(DefaultCombatResolver)),
                rng: Mutex::new(StdRng::from_entropy()),
                running: AtomicBool::new(false),
                main_ticks: AtomicU64::new(0),
                fast_ticks: AtomicU64::new(0),
                slow_ticks: AtomicU64::new(0),
                step_failures: AtomicU64::new(0),
                skipped_overlaps: AtomicU64::new(0),
                main_guard: Mutex::new(()),
                fast_guard: Mutex::new(()),
                slow_guard: Mutex::new(()),
                tick_hooks: RwLock::new(Vec::new()),
                broadcast_hooks: RwLock::new(Vec::new()),
            }),
            shutdown_sender,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the combat rules used by the fast tick.
    pub fn set_combat_resolver(&self, resolver: impl CombatResolver + 'static) {
        *self.shared.resolver.write() = Arc::new(resolver);
    }

    /// Makes social interaction draws reproducible.
    pub fn seed_rng(&self, seed: u64) {
        *self.shared.rng.lock() = StdRng::seed_from_u64(seed);
    }

    /// Registers a hook called once per main tick. Hooks run in registration
    /// order and must not register further hooks.
    pub fn on_tick<F>(&self, hook: F)
    where
        F: Fn(&TickInfo) + Send + Sync + 'static,
    {
        self.shared.tick_hooks.write().push(Box::new(hook));
    }

    /// Registers a hook receiving every client-facing message.
    pub fn on_broadcast<F>(&self, hook: F)
    where
        F: Fn(&BroadcastMessage) + Send + Sync + 'static,
    {
        self.shared.broadcast_hooks.write().push(Box::new(hook));
    }

    /// Spawns the three cadence tasks. Returns `false` if already running or
    /// if there is no tokio runtime.
    pub fn start(&self) -> bool {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("Tick engine already running");
            return false;
        }
        if tokio::runtime::Handle::try_current().is_err() {
            warn!("No tokio runtime, tick engine not started");
            self.shared.running.store(false, Ordering::SeqCst);
            return false;
        }

        let settings = &self.shared.settings;
        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_cadence(TickKind::Main, settings.main_interval()));
        tasks.push(self.spawn_cadence(TickKind::Fast, settings.fast_interval()));
        tasks.push(self.spawn_cadence(TickKind::Slow, settings.slow_interval()));

        info!(
            "🕒 Tick engine started (main {}ms, fast {}ms, slow {}ms)",
            settings.main_interval_ms, settings.fast_interval_ms, settings.slow_interval_ms
        );
        true
    }

    fn spawn_cadence(&self, kind: TickKind, period: Duration) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        tokio::spawn(async move {
            let mut ticker = interval(period.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick of an interval completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_receiver.recv() => break,
                    _ = ticker.tick() => {
                        if !shared.running.load(Ordering::SeqCst) {
                            break;
                        }
                        shared.run(kind, now_millis());
                    }
                }
            }
            debug!("{:?} cadence stopped", kind);
        })
    }

    /// Signals all cadences to stop. A tick already in progress finishes;
    /// no new tick starts afterwards.
    pub fn stop(&self) -> bool {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        let _ = self.shutdown_sender.send(());
        info!("🛑 Tick engine stopping");
        true
    }

    /// Waits for the cadence tasks to exit. Call after [`stop`](Self::stop).
    pub async fn join(&self) {
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                error!("Tick task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> TickStats {
        let s = &self.shared;
        TickStats {
            is_running: s.running.load(Ordering::SeqCst),
            main_ticks: s.main_ticks.load(Ordering::Relaxed),
            fast_ticks: s.fast_ticks.load(Ordering::Relaxed),
            slow_ticks: s.slow_ticks.load(Ordering::Relaxed),
            step_failures: s.step_failures.load(Ordering::Relaxed),
            skipped_overlaps: s.skipped_overlaps.load(Ordering::Relaxed),
        }
    }

    pub fn run_main_tick(&self) -> bool {
        self.shared.main_tick(now_millis())
    }

    /// Runs one main tick at a chosen time. Returns `false` if a main tick is
    /// already in progress.
    pub fn run_main_tick_at(&self, now: Timestamp) -> bool {
        self.shared.main_tick(now)
    }

    pub fn run_fast_tick(&self) -> bool {
        self.shared.fast_tick(now_millis())
    }

    pub fn run_fast_tick_at(&self, now: Timestamp) -> bool {
        self.shared.fast_tick(now)
    }

    pub fn run_slow_tick(&self) -> bool {
        self.shared.slow_tick(now_millis())
    }

    pub fn run_slow_tick_at(&self, now: Timestamp) -> bool {
        self.shared.slow_tick(now)
    }

    /// Runs a closure under the same failure isolation as a tick sub-step.
    pub fn run_step(
        &self,
        step: &'static str,
        f: impl FnOnce() -> crate::error::TickResult<()>,
    ) -> bool {
        self.shared.run_step(step, f)
    }
}

impl Drop for TickEngine {
    fn drop(&mut self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_sender.send(());
        }
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::CombatOutcome;
    use crate::error::{TickError, TickResult};
    use crate::regions::{CrisisKind, RegionSpec};
    use crate::types::{
        CombatEncounter, EventId, Needs, Node, NodeId, Npc, NpcId, Player, PlayerId, RegionId,
        ResourceStock, WorldEvent,
    };
    use crate::relationships::RelationshipDeltas;

    struct Fixture {
        world: Arc<WorldState>,
        regions: Arc<RegionManager>,
        relationships: Arc<RelationshipEngine>,
        engine: TickEngine,
        messages: Arc<Mutex<Vec<BroadcastMessage>>>,
    }

    fn fixture_with(config: WorldConfig) -> Fixture {
        let world = Arc::new(WorldState::new(&config.state));
        world.add_node(Node::new("refugio", "Refugio", "centro"));
        world.add_node(Node::new("hospital", "Hospital", "centro"));
        let regions = RegionManager::new(world.clone());
        regions
            .create_region(RegionSpec {
                id: RegionId::from("centro"),
                name: "Centro".to_string(),
                node_ids: vec![NodeId::from("refugio"), NodeId::from("hospital")],
                difficulty: 1,
                zombie_density: 1.0,
                resource_multiplier: 1.0,
            })
            .unwrap();
        let relationships = Arc::new(RelationshipEngine::new(world.clone(), &config.relationships));
        let engine =
            TickEngine::new(world.clone(), regions.clone(), relationships.clone(), &config);

        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = messages.clone();
        engine.on_broadcast(move |m| sink.lock().push(m.clone()));

        Fixture {
            world,
            regions,
            relationships,
            engine,
            messages,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(WorldConfig::default())
    }

    #[test]
    fn test_event_expiry_broadcasts() {
        let f = fixture();
        f.world.add_event(WorldEvent {
            id: EventId::from("airdrop"),
            node_id: NodeId::from("refugio"),
            event_type: "airdrop".to_string(),
            start_time: 0,
            end_time: 500,
        });

        assert!(f.engine.run_main_tick_at(1_000));
        assert!(f.world.get_event(&EventId::from("airdrop")).is_none());
        let messages = f.messages.lock();
        assert!(matches!(
            &messages[0],
            BroadcastMessage::EventExpired { event_id, .. } if event_id.as_str() == "airdrop"
        ));
    }

    #[test]
    fn test_on_tick_receives_main_ticks() {
        let f = fixture();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        f.engine.on_tick(move |info| sink.lock().push(info.clone()));

        f.engine.run_main_tick_at(10);
        f.engine.run_main_tick_at(20);
        f.engine.run_fast_tick_at(20);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].tick, 2);
        assert_eq!(seen[1].kind, TickKind::Main);
        assert_eq!(seen[1].timestamp, 20);
    }

    #[test]
    fn test_npc_needs_decay_and_morale() {
        let f = fixture();
        let mut npc = Npc::new("rosa", "Rosa", Some(NodeId::from("refugio")));
        npc.needs = Some(Needs {
            hunger: 20,
            thirst: 20,
            fatigue: 20,
            safety: 20,
            social: 0,
        });
        npc.morale = 50;
        f.world.add_npc(npc);
        f.world.add_npc(Npc::new("trader", "Trader", Some(NodeId::from("refugio"))));

        f.engine.run_main_tick_at(0);
        let rosa = f.world.get_npc(&"rosa".into()).unwrap();
        let needs = rosa.needs.unwrap();
        assert_eq!(needs.hunger, 19);
        assert_eq!(needs.social, 0);
        assert_eq!(rosa.morale, 49);
    }

    #[test]
    fn test_movement_completes_on_fast_tick() {
        let f = fixture();
        let p1 = PlayerId::from("p1");
        f.world.add_player(Player::new("p1", "Sam", Some(NodeId::from("refugio"))));
        let travel = f
            .regions
            .calculate_travel_time(&NodeId::from("refugio"), &NodeId::from("hospital"));
        assert!(f.world.begin_player_movement_at(&p1, &NodeId::from("hospital"), travel, 0));

        f.engine.run_fast_tick_at(1_000);
        assert_eq!(f.world.player_count_in_node(&NodeId::from("refugio")), 1);

        f.engine.run_fast_tick_at(5_000);
        assert_eq!(f.world.player_ids_in_node(&NodeId::from("hospital")), vec![p1.clone()]);
        assert!(f.world.get_player(&p1).unwrap().movement.is_none());
        assert!(f.world.verify_index_integrity());
        assert!(matches!(
            f.messages.lock().last(),
            Some(BroadcastMessage::MovementCompleted { to, .. }) if to.as_str() == "hospital"
        ));
    }

    #[test]
    fn test_combat_rounds_until_victory() {
        let f = fixture();
        let p1 = PlayerId::from("p1");
        f.world.add_player(Player::new("p1", "Sam", Some(NodeId::from("refugio"))));
        f.world.begin_combat(&p1, CombatEncounter::new("walker", 20, 4, 0));

        f.engine.run_fast_tick_at(0);
        let player = f.world.get_player(&p1).unwrap();
        assert_eq!(player.health, 96);
        assert_eq!(player.combat.as_ref().unwrap().enemy_health, 12);

        // Round interval not elapsed yet.
        f.engine.run_fast_tick_at(200);
        assert_eq!(f.world.get_player(&p1).unwrap().combat.unwrap().round, 1);

        f.engine.run_fast_tick_at(1_000);
        f.engine.run_fast_tick_at(2_000);
        let player = f.world.get_player(&p1).unwrap();
        assert!(player.combat.is_none());
        assert_eq!(player.stats.kills, 1);
        assert_eq!(player.stats.experience, 25);
        assert_eq!(player.health, 92);

        let messages = f.messages.lock();
        assert!(matches!(
            messages.last(),
            Some(BroadcastMessage::CombatEnded { outcome: CombatOutcome::Victory, .. })
        ));
    }

    struct FailingResolver;

    impl CombatResolver for FailingResolver {
        fn resolve_round(&self, player: &Player, _: &CombatEncounter) -> TickResult<RoundOutcome> {
            Err(TickError::Resolver(format!("no rules for {}", player.id)))
        }
    }

    #[test]
    fn test_resolver_failure_is_counted() {
        let f = fixture();
        f.engine.set_combat_resolver(FailingResolver);
        let p1 = PlayerId::from("p1");
        f.world.add_player(Player::new("p1", "Sam", Some(NodeId::from("refugio"))));
        f.world.begin_combat(&p1, CombatEncounter::new("walker", 20, 4, 0));

        assert!(f.engine.run_fast_tick_at(0));
        assert_eq!(f.engine.stats().step_failures, 1);
        assert_eq!(f.world.get_player(&p1).unwrap().health, 100);
    }

    #[test]
    fn test_starvation_and_regen() {
        let f = fixture();
        let mut hungry = Player::new("hungry", "H", Some(NodeId::from("refugio")));
        hungry.hunger = 1;
        hungry.health = 50;
        let mut wounded = Player::new("wounded", "W", Some(NodeId::from("refugio")));
        wounded.health = 50;
        let mut fighting = Player::new("fighting", "F", Some(NodeId::from("refugio")));
        fighting.health = 50;
        fighting.combat = Some(CombatEncounter::new("walker", 10, 1, u64::MAX));
        let mut away = Player::new("away", "A", None);
        away.online = false;
        away.hunger = 10;
        for p in [hungry, wounded, fighting, away] {
            f.world.add_player(p);
        }

        f.engine.run_slow_tick_at(0);
        let get = |id: &str| f.world.get_player(&PlayerId::from(id)).unwrap();
        assert_eq!(get("hungry").hunger, 0);
        assert_eq!(get("hungry").health, 45);
        assert_eq!(get("wounded").health, 51);
        assert_eq!(get("fighting").health, 50);
        assert_eq!(get("away").hunger, 10);
    }

    #[test]
    fn test_resources_decay_and_regen_bounds() {
        let f = fixture();
        f.world.with_node_mut(&NodeId::from("refugio"), |node| {
            node.resources.insert("water".to_string(), ResourceStock::new(1.0, 10.0, 2.0, 0.5));
            node.resources.insert("food".to_string(), ResourceStock::new(9.8, 10.0, 0.0, 1.0));
        });

        f.engine.run_slow_tick_at(0);
        let node = f.world.get_node(&NodeId::from("refugio")).unwrap();
        assert_eq!(node.resources["water"].amount, 0.5);
        assert_eq!(node.resources["food"].amount, 10.0);

        // Shortage halves regeneration.
        f.regions
            .trigger_region_crisis(&RegionId::from("centro"), CrisisKind::ResourceShortage);
        f.engine.run_slow_tick_at(5_000);
        let node = f.world.get_node(&NodeId::from("refugio")).unwrap();
        assert_eq!(node.resources["water"].amount, 0.25);
    }

    #[test]
    fn test_panicking_step_is_isolated() {
        let f = fixture();
        f.engine.on_tick(|_| panic!("bad hook"));
        f.world.add_event(WorldEvent {
            id: EventId::from("raid"),
            node_id: NodeId::from("refugio"),
            event_type: "raid".to_string(),
            start_time: 0,
            end_time: 1,
        });

        assert!(f.engine.run_main_tick_at(10));
        assert!(f.engine.run_main_tick_at(20));
        let stats = f.engine.stats();
        assert_eq!(stats.main_ticks, 2);
        assert_eq!(stats.step_failures, 2);
        assert!(f.world.events().is_empty());

        assert!(!f.engine.run_step("explicit", || Err(TickError::Partial(3))));
        assert!(f.engine.run_step("fine", || Ok(())));
        assert_eq!(f.engine.stats().step_failures, 3);
    }

    #[test]
    fn test_social_pass_cadence() {
        let mut config = WorldConfig::default();
        config.relationships.interaction_chance = 1.0;
        let f = fixture_with(config);
        f.engine.seed_rng(9);
        f.world.add_npc(Npc::new("ana", "Ana", Some(NodeId::from("refugio"))));
        f.world.add_npc(Npc::new("bruno", "Bruno", Some(NodeId::from("refugio"))));

        for tick in 1..=4 {
            f.engine.run_main_tick_at(tick * 1_000);
        }
        assert!(f.messages.lock().is_empty());

        f.engine.run_main_tick_at(5_000);
        let messages = f.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].kind(), "npc_interaction");
    }

    #[test]
    fn test_zero_period_disables_sub_step() {
        let mut config = WorldConfig::default();
        config.tick.social_every = 0;
        config.tick.diagnostics_every = 0;
        config.relationships.interaction_chance = 1.0;
        let f = fixture_with(config);
        f.world.add_npc(Npc::new("ana", "Ana", Some(NodeId::from("refugio"))));
        f.world.add_npc(Npc::new("bruno", "Bruno", Some(NodeId::from("refugio"))));

        for tick in 1..=10 {
            assert!(f.engine.run_main_tick_at(tick * 1_000));
        }
        let stats = f.engine.stats();
        assert_eq!(stats.main_ticks, 10);
        assert_eq!(stats.step_failures, 0);
        assert!(f.messages.lock().is_empty());
    }

    #[test]
    fn test_reentrant_main_tick_is_skipped() {
        let f = fixture();
        let shared = Arc::downgrade(&f.engine.shared);
        let nested = Arc::new(Mutex::new(Vec::new()));
        let sink = nested.clone();
        f.engine.on_tick(move |info| {
            if let Some(shared) = shared.upgrade() {
                sink.lock().push(shared.main_tick(info.timestamp + 1));
            }
        });

        assert!(f.engine.run_main_tick_at(1_000));
        assert_eq!(*nested.lock(), vec![false]);
        let stats = f.engine.stats();
        assert_eq!(stats.main_ticks, 1);
        assert_eq!(stats.skipped_overlaps, 1);
        assert_eq!(stats.step_failures, 0);
    }

    #[test]
    fn test_slow_tick_relaxes_idle_relationships() {
        let f = fixture();
        let (ana, bruno) = (NpcId::from("ana"), NpcId::from("bruno"));
        f.world.add_npc(Npc::new("ana", "Ana", Some(NodeId::from("refugio"))));
        f.world.add_npc(Npc::new("bruno", "Bruno", Some(NodeId::from("refugio"))));
        f.relationships
            .update_at(&ana, &bruno, &RelationshipDeltas::new(10, 0, 0, 20, 0), None, 0)
            .unwrap();

        // Still fresh: nothing moves.
        f.engine.run_slow_tick_at(60_000);
        let record = f.relationships.get_relationship(&ana, &bruno).unwrap();
        assert_eq!((record.friendship(), record.rivalry()), (60, 20));

        f.engine.run_slow_tick_at(400_000);
        let record = f.relationships.get_relationship(&ana, &bruno).unwrap();
        assert_eq!((record.friendship(), record.rivalry()), (59, 19));
        assert_eq!(record.interaction_count(), 1);
    }

    #[test]
    fn test_start_is_idempotent_and_needs_runtime() {
        let f = fixture();
        assert!(!f.engine.start());
        assert!(!f.engine.stats().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_halts_all_cadences() {
        let f = fixture();
        assert!(f.engine.start());
        assert!(!f.engine.start());

        tokio::time::sleep(Duration::from_millis(3_500)).await;
        let running = f.engine.stats();
        assert!(running.is_running);
        assert_eq!(running.main_ticks, 3);
        assert!(running.fast_ticks >= 15);

        assert!(f.engine.stop());
        assert!(!f.engine.stats().is_running);
        f.engine.join().await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        let stopped = f.engine.stats();
        assert_eq!(stopped.main_ticks, 3);
        assert_eq!(stopped.fast_ticks, running.fast_ticks);
        assert!(!f.engine.stop());
    }
}
