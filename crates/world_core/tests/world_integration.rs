//! End-to-end checks of the core through its public surface: seeding,
//! concurrent handler traffic against the scheduler, and broadcast output.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use world_core::types::{CombatEncounter, NodeId, NpcId, Player, PlayerId, RegionId};
use world_core::{
    create_world, create_world_with_config, BroadcastMessage, CrisisKind, RegionStatus,
    RelationshipDeltas, RelationshipState, WorldConfig, WorldSeed,
};

#[test]
fn test_player_relocation_scenario() {
    let core = create_world();
    core.seed(WorldSeed::outbreak()).unwrap();
    let p1 = PlayerId::from("p1");
    let refugio = NodeId::from("refugio");
    let hospital = NodeId::from("hospital");

    core.state.add_player(Player::new("p1", "Sam", Some(refugio.clone())));
    assert_eq!(core.state.player_ids_in_node(&refugio), vec![p1.clone()]);

    assert!(core.state.update_player_node(&p1, &refugio, &hospital));
    assert!(core.state.players_in_node(&refugio).is_empty());
    assert_eq!(core.state.player_ids_in_node(&hospital), vec![p1.clone()]);

    assert!(!core.state.update_player_node(&PlayerId::from("ghost"), &refugio, &hospital));
    assert!(core.state.verify_index_integrity());
}

#[test]
fn test_relationship_and_region_scenarios() {
    let core = create_world();
    core.seed(WorldSeed::outbreak()).unwrap();

    let record = core
        .relationships
        .update(
            &NpcId::from("tomas"),
            &NpcId::from("rosa"),
            &RelationshipDeltas {
                attraction: 80,
                friendship: 60,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(record.friendship(), 100);
    assert_eq!(record.attraction(), 80);
    assert_eq!(record.state(), RelationshipState::Lovers);

    let sur = RegionId::from("sur");
    assert!(core.regions.trigger_region_crisis(&sur, "lockdown".parse::<CrisisKind>().unwrap()));
    assert_eq!(core.regions.get_region(&sur).unwrap().status, RegionStatus::Locked);
    assert!(core.regions.resolve_region_crisis(&sur));
    assert_eq!(core.regions.get_region(&sur).unwrap().status, RegionStatus::Active);
}

#[test]
fn test_snapshot_reflects_seed() {
    let core = create_world();
    core.seed(WorldSeed::outbreak()).unwrap();
    let snapshot = core.state.snapshot();

    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["nodes"].as_array().map(Vec::len), Some(snapshot.nodes.len()));
    assert_eq!(snapshot.npcs.len(), core.state.npc_ids().len());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_handlers_race_the_scheduler() {
    let mut config = WorldConfig::default();
    config.tick.main_interval_ms = 20;
    config.tick.fast_interval_ms = 5;
    config.tick.slow_interval_ms = 50;
    config.tick.social_every = 1;
    config.relationships.interaction_chance = 0.5;
    let core = Arc::new(create_world_with_config(config).unwrap());
    core.seed(WorldSeed::outbreak()).unwrap();

    let broadcasts = Arc::new(AtomicUsize::new(0));
    let counter = broadcasts.clone();
    core.ticks.on_broadcast(move |_: &BroadcastMessage| {
        counter.fetch_add(1, Ordering::Relaxed);
    });
    assert!(core.start());

    let nodes = core.state.node_ids();
    let mut handlers = Vec::new();
    for worker in 0..8 {
        let core = core.clone();
        let nodes = nodes.clone();
        handlers.push(tokio::spawn(async move {
            for step in 0..200usize {
                let id = PlayerId::from(format!("w{worker}-p{}", step % 10));
                let from = nodes[(worker + step) % nodes.len()].clone();
                let to = nodes[(worker + step + 1) % nodes.len()].clone();
                if !core.state.has_player(&id) {
                    core.state.add_player(Player::new(id.clone(), "racer", Some(from.clone())));
                }
                match step % 4 {
                    0 => {
                        core.state.update_player_node(&id, &from, &to);
                    }
                    1 => {
                        core.state.begin_player_movement(&id, &to, Duration::from_millis(5));
                    }
                    2 => {
                        core.state.begin_combat(&id, CombatEncounter::new("walker", 10, 1, 0));
                    }
                    _ => {
                        core.state.remove_player(&id);
                    }
                }
                tokio::task::yield_now().await;
            }
        }));
    }
    for handler in handlers {
        handler.await.unwrap();
    }

    tokio::time::sleep(Duration::from_millis(100)).await;
    core.shutdown().await;

    let stats = core.ticks.stats();
    assert!(!stats.is_running);
    assert!(stats.main_ticks > 0);
    assert_eq!(stats.step_failures, 0);
    assert!(core.state.verify_index_integrity());
    assert!(broadcasts.load(Ordering::Relaxed) > 0);
}
