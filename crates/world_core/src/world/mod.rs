//! The authoritative registry of live entities.
//!
//! `WorldState` owns players, NPCs, nodes and timed events. Handlers and the
//! scheduler share one instance through an `Arc`; every method takes `&self`
//! and completes synchronously. Unknown ids are never an error: lookups
//! return `None` and mutations return `false` or do nothing, so a stale
//! reference from a disconnected client cannot take the scheduler down.

mod index;
mod snapshot;

pub use index::Placed;
pub use snapshot::WorldSnapshot;

use crate::config::StateSettings;
use crate::types::{
    after, now_millis, CombatEncounter, EventId, Movement, Node, NodeId, Npc, NpcId, Player,
    PlayerId, Timestamp, WorldEvent,
};
use dashmap::DashMap;
use index::NodeIndexedMap;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Entity counts, cheap enough to collect every diagnostic tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorldStats {
    pub players: usize,
    pub online_players: usize,
    pub npcs: usize,
    pub living_npcs: usize,
    pub nodes: usize,
    pub events: usize,
}

pub struct WorldState {
    players: NodeIndexedMap<Player>,
    npcs: NodeIndexedMap<Npc>,
    nodes: DashMap<NodeId, Node>,
    events: DashMap<EventId, WorldEvent>,
    stale_player_window: Duration,
}

impl Default for WorldState {
    fn default() -> Self {
        Self::new(&StateSettings::default())
    }
}

impl WorldState {
    /// An empty world. `settings` only controls the offline-player window.
    pub fn new(settings: &StateSettings) -> Self {
        Self {
            players: NodeIndexedMap::new("player"),
            npcs: NodeIndexedMap::new("npc"),
            nodes: DashMap::new(),
            events: DashMap::new(),
            stale_player_window: Duration::from_secs(settings.stale_player_secs),
        }
    }

    // ------------------------------------------------------------------
    // Players
    // ------------------------------------------------------------------

    /// Inserts a player, or replaces one with the same id, and indexes it
    /// under its node. A player without a node is stored unindexed.
    pub fn add_player(&self, player: Player) {
        self.players.insert(player);
    }

    /// Unlinks the player from its node and drops it. `None` if unknown.
    pub fn remove_player(&self, id: &PlayerId) -> Option<Player> {
        self.players.remove(id)
    }

    /// A cloned copy of the player; later changes are not reflected in it.
    pub fn get_player(&self, id: &PlayerId) -> Option<Player> {
        self.players.get(id)
    }

    pub fn has_player(&self, id: &PlayerId) -> bool {
        self.players.contains(id)
    }

    /// Mutates a player in place. The closure must not call back into the
    /// world, and cannot change the player's node (use
    /// [`update_player_node`](Self::update_player_node)).
    pub fn with_player_mut<R>(
        &self,
        id: &PlayerId,
        f: impl FnOnce(&mut Player) -> R,
    ) -> Option<R> {
        self.players.with_mut(id, f)
    }

    /// Moves a player between node buckets in one step. Readers see it in
    /// `old` or in `new`, never in both or neither. The destination is not
    /// checked against the node table.
    ///
    /// Returns `false` only when the player is unknown.
    pub fn update_player_node(&self, id: &PlayerId, old: &NodeId, new: &NodeId) -> bool {
        self.warn_unknown_node(new);
        self.players.relocate(id, old, new)
    }

    /// Copies of every player standing on `node`.
    pub fn players_in_node(&self, node: &NodeId) -> Vec<Player> {
        self.players.in_node(node)
    }

    pub fn player_ids_in_node(&self, node: &NodeId) -> Vec<PlayerId> {
        self.players.ids_in_node(node)
    }

    pub fn player_count_in_node(&self, node: &NodeId) -> usize {
        self.players.count_in_node(node)
    }

    pub fn players(&self) -> Vec<Player> {
        self.players.values()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.ids()
    }

    /// Every connected player. Walks the whole table.
    pub fn online_players(&self) -> Vec<Player> {
        self.players.filter(|p| p.online)
    }

    /// Flags a player online or offline and refreshes `last_seen`.
    pub fn set_player_online(&self, id: &PlayerId, online: bool) -> bool {
        let now = now_millis();
        self.with_player_mut(id, |p| {
            p.online = online;
            p.last_seen = now;
        })
        .is_some()
    }

    /// Refreshes `last_seen` without changing the online flag.
    pub fn touch_player(&self, id: &PlayerId) -> bool {
        let now = now_millis();
        self.with_player_mut(id, |p| p.last_seen = now).is_some()
    }

    /// Schedules a move from the player's current node. The fast tick
    /// completes it once `travel` has elapsed. Fails if the player is unknown
    /// or has not been placed on a node yet.
    pub fn begin_player_movement(&self, id: &PlayerId, to: &NodeId, travel: Duration) -> bool {
        self.begin_player_movement_at(id, to, travel, now_millis())
    }

    pub fn begin_player_movement_at(
        &self,
        id: &PlayerId,
        to: &NodeId,
        travel: Duration,
        now: Timestamp,
    ) -> bool {
        self.with_player_mut(id, |p| match p.node_id.clone() {
            Some(from) => {
                p.movement = Some(Movement {
                    from,
                    to: to.clone(),
                    started_at: now,
                    arrives_at: after(now, travel),
                });
                true
            }
            None => {
                debug!("Player {} has no node, cannot start moving", p.id);
                false
            }
        })
        .unwrap_or(false)
    }

    /// Puts the player in a fight; any previous encounter is replaced.
    pub fn begin_combat(&self, id: &PlayerId, encounter: CombatEncounter) -> bool {
        self.with_player_mut(id, |p| p.combat = Some(encounter)).is_some()
    }

    /// Drops offline players whose `last_seen` is older than the stale
    /// window. Called by the scheduler, not by handlers.
    pub fn cleanup(&self) -> Vec<PlayerId> {
        self.cleanup_at(now_millis())
    }

    pub fn cleanup_at(&self, now: Timestamp) -> Vec<PlayerId> {
        let window = self.stale_player_window.as_millis() as u64;
        let is_stale = |p: &Player| !p.online && now.saturating_sub(p.last_seen) > window;

        // A handler may bring a candidate back online before it is removed,
        // so each removal re-checks under the entry lock.
        let removed: Vec<PlayerId> = self
            .players
            .filter(is_stale)
            .into_iter()
            .filter_map(|candidate| self.players.remove_if(&candidate.id, is_stale))
            .map(|p| p.id)
            .collect();

        if !removed.is_empty() {
            info!("🧹 Removed {} stale offline player(s)", removed.len());
        }
        removed
    }

    // ------------------------------------------------------------------
    // NPCs
    // ------------------------------------------------------------------

    /// Inserts or replaces an NPC; same indexing rules as players.
    pub fn add_npc(&self, npc: Npc) {
        self.npcs.insert(npc);
    }

    /// Unlinks and drops an NPC. Dead NPCs normally stay registered with
    /// status `Dead`; removal is for scripted despawns.
    pub fn remove_npc(&self, id: &NpcId) -> Option<Npc> {
        self.npcs.remove(id)
    }

    pub fn get_npc(&self, id: &NpcId) -> Option<Npc> {
        self.npcs.get(id)
    }

    pub fn has_npc(&self, id: &NpcId) -> bool {
        self.npcs.contains(id)
    }

    /// Mutates an NPC in place; same restrictions as
    /// [`with_player_mut`](Self::with_player_mut).
    pub fn with_npc_mut<R>(&self, id: &NpcId, f: impl FnOnce(&mut Npc) -> R) -> Option<R> {
        self.npcs.with_mut(id, f)
    }

    /// Atomic re-index, see [`update_player_node`](Self::update_player_node).
    pub fn update_npc_node(&self, id: &NpcId, old: &NodeId, new: &NodeId) -> bool {
        self.warn_unknown_node(new);
        self.npcs.relocate(id, old, new)
    }

    /// Copies of every NPC on `node`, living or dead.
    pub fn npcs_in_node(&self, node: &NodeId) -> Vec<Npc> {
        self.npcs.in_node(node)
    }

    pub fn npc_ids_in_node(&self, node: &NodeId) -> Vec<NpcId> {
        self.npcs.ids_in_node(node)
    }

    pub fn npc_count_in_node(&self, node: &NodeId) -> usize {
        self.npcs.count_in_node(node)
    }

    pub fn npcs(&self) -> Vec<Npc> {
        self.npcs.values()
    }

    pub fn npc_ids(&self) -> Vec<NpcId> {
        self.npcs.ids()
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Registers a map node. Nodes are bootstrap data; re-adding replaces
    /// the stored copy including its resource stocks.
    pub fn add_node(&self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(|n| n.value().clone())
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn with_node_mut<R>(&self, id: &NodeId, f: impl FnOnce(&mut Node) -> R) -> Option<R> {
        self.nodes.get_mut(id).map(|mut n| f(n.value_mut()))
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.key().clone()).collect()
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(|n| n.value().clone()).collect()
    }

    fn warn_unknown_node(&self, node: &NodeId) {
        if !self.nodes.contains_key(node) {
            debug!("Indexing entity on unknown node {}", node);
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Starts tracking a timed event. The main tick removes it at `end_time`.
    pub fn add_event(&self, event: WorldEvent) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn remove_event(&self, id: &EventId) -> Option<WorldEvent> {
        self.events.remove(id).map(|(_, e)| e)
    }

    pub fn get_event(&self, id: &EventId) -> Option<WorldEvent> {
        self.events.get(id).map(|e| e.value().clone())
    }

    pub fn events(&self) -> Vec<WorldEvent> {
        self.events.iter().map(|e| e.value().clone()).collect()
    }

    /// Events whose window contains `now`.
    pub fn active_events_at(&self, now: Timestamp) -> Vec<WorldEvent> {
        self.events
            .iter()
            .filter(|e| e.is_active_at(now))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Removes and returns every event whose end time has passed.
    pub fn expire_events(&self, now: Timestamp) -> Vec<WorldEvent> {
        let due: Vec<EventId> = self
            .events
            .iter()
            .filter(|e| e.end_time <= now)
            .map(|e| e.key().clone())
            .collect();

        due.iter().filter_map(|id| self.remove_event(id)).collect()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Counts per entity kind, for diagnostics and the health monitor.
    pub fn stats(&self) -> WorldStats {
        WorldStats {
            players: self.players.len(),
            online_players: self.players.filter(|p| p.online).len(),
            npcs: self.npcs.len(),
            living_npcs: self.npcs.filter(Npc::is_alive).len(),
            nodes: self.nodes.len(),
            events: self.events.len(),
        }
    }

    /// Both reverse indexes agree with the entities' recorded nodes.
    pub fn verify_index_integrity(&self) -> bool {
        self.players.is_consistent() && self.npcs.is_consistent()
    }

    /// A serialisable copy of every table, for persistence collaborators.
    pub fn snapshot(&self) -> WorldSnapshot {
        WorldSnapshot::capture(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> NodeId {
        NodeId::from(id)
    }

    fn world_with_nodes() -> WorldState {
        let world = WorldState::default();
        world.add_node(Node::new("refugio", "Refugio", "centro"));
        world.add_node(Node::new("hospital", "Hospital", "centro"));
        world
    }

    #[test]
    fn test_add_and_move_player() {
        let world = world_with_nodes();
        world.add_player(Player::new("p1", "Sam", Some(node("refugio"))));

        let ids = world.player_ids_in_node(&node("refugio"));
        assert_eq!(ids, vec![PlayerId::from("p1")]);

        let p1 = PlayerId::from("p1");
        assert!(world.update_player_node(&p1, &node("refugio"), &node("hospital")));
        assert!(world.players_in_node(&node("refugio")).is_empty());
        let in_hospital = world.players_in_node(&node("hospital"));
        assert_eq!(in_hospital.len(), 1);
        assert_eq!(in_hospital[0].id, PlayerId::from("p1"));
        assert_eq!(in_hospital[0].node_id, Some(node("hospital")));
        assert!(world.verify_index_integrity());
    }

    #[test]
    fn test_unknown_ids_degrade() {
        let world = world_with_nodes();
        assert!(world.get_player(&PlayerId::from("ghost")).is_none());
        assert!(world.remove_player(&PlayerId::from("ghost")).is_none());
        let ghost = PlayerId::from("ghost");
        assert!(!world.update_player_node(&ghost, &node("refugio"), &node("hospital")));
        assert!(!world.update_npc_node(&NpcId::from("ghost"), &node("refugio"), &node("hospital")));
        assert!(world.with_npc_mut(&NpcId::from("ghost"), |n| n.morale = 0).is_none());
        assert!(!world.set_player_online(&PlayerId::from("ghost"), false));
    }

    #[test]
    fn test_unplaced_entity_is_retrievable() {
        let world = world_with_nodes();
        world.add_npc(Npc::new("n1", "Rosa", None));
        assert!(world.get_npc(&NpcId::from("n1")).is_some());
        assert!(world.npcs_in_node(&node("refugio")).is_empty());

        // Placing it later goes through the regular re-index.
        assert!(world.update_npc_node(&NpcId::from("n1"), &node("refugio"), &node("refugio")));
        assert_eq!(world.npc_count_in_node(&node("refugio")), 1);
        assert!(world.verify_index_integrity());
    }

    #[test]
    fn test_remove_unlinks_index() {
        let world = world_with_nodes();
        world.add_npc(Npc::new("n1", "Rosa", Some(node("hospital"))));
        let removed = world.remove_npc(&NpcId::from("n1")).unwrap();
        assert_eq!(removed.name, "Rosa");
        assert_eq!(world.npc_count_in_node(&node("hospital")), 0);
        assert!(world.verify_index_integrity());
    }

    #[test]
    fn test_snapshot_list_does_not_alias() {
        let world = world_with_nodes();
        world.add_player(Player::new("p1", "Sam", Some(node("refugio"))));

        let mut listed = world.players_in_node(&node("refugio"));
        listed.clear();
        let mut ids = world.player_ids_in_node(&node("refugio"));
        ids.push(PlayerId::from("intruder"));

        assert_eq!(world.player_count_in_node(&node("refugio")), 1);
        assert!(world.verify_index_integrity());
    }

    #[test]
    fn test_online_players_filter() {
        let world = world_with_nodes();
        world.add_player(Player::new("p1", "Sam", Some(node("refugio"))));
        world.add_player(Player::new("p2", "Lu", Some(node("refugio"))));
        world.set_player_online(&PlayerId::from("p2"), false);

        let online = world.online_players();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].id, PlayerId::from("p1"));
    }

    #[test]
    fn test_cleanup_removes_only_stale_offline() {
        let world = world_with_nodes();
        let now = 10_000_000;

        let mut stale = Player::new("stale", "Old", Some(node("refugio")));
        stale.online = false;
        stale.last_seen = now - 301_000;
        let mut recent = Player::new("recent", "New", Some(node("refugio")));
        recent.online = false;
        recent.last_seen = now - 60_000;
        let mut online = Player::new("online", "Here", Some(node("refugio")));
        online.last_seen = now - 900_000;

        world.add_player(stale);
        world.add_player(recent);
        world.add_player(online);

        let removed = world.cleanup_at(now);
        assert_eq!(removed, vec![PlayerId::from("stale")]);
        assert!(world.has_player(&PlayerId::from("recent")));
        assert!(world.has_player(&PlayerId::from("online")));
        assert_eq!(world.player_count_in_node(&node("refugio")), 2);
        assert!(world.verify_index_integrity());
    }

    #[test]
    fn test_cleanup_spares_player_brought_back_online() {
        let world = world_with_nodes();
        let ids: Vec<PlayerId> = (0..2_000).map(|i| PlayerId::from(format!("p{i}"))).collect();

        for round in 0..5 {
            for id in &ids {
                let mut player = Player::new(id.as_str(), "Sleeper", Some(node("refugio")));
                player.online = false;
                player.last_seen = 0;
                world.add_player(player);
            }

            let revived: Vec<PlayerId> = std::thread::scope(|scope| {
                scope.spawn(|| world.cleanup());
                ids.iter()
                    .filter(|id| world.set_player_online(id, true))
                    .cloned()
                    .collect()
            });

            for id in &revived {
                assert!(world.has_player(id), "round {round}: {id} was online but got removed");
            }
            assert!(world.verify_index_integrity());
            for id in &ids {
                world.remove_player(id);
            }
        }
    }

    #[test]
    fn test_expire_events() {
        let world = world_with_nodes();
        world.add_event(WorldEvent {
            id: EventId::from("horde"),
            node_id: node("hospital"),
            event_type: "zombie_horde".to_string(),
            start_time: 0,
            end_time: 1_000,
        });
        world.add_event(WorldEvent {
            id: EventId::from("airdrop"),
            node_id: node("refugio"),
            event_type: "airdrop".to_string(),
            start_time: 0,
            end_time: 5_000,
        });

        let expired = world.expire_events(1_000);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, EventId::from("horde"));
        assert!(world.get_event(&EventId::from("airdrop")).is_some());
        assert_eq!(world.active_events_at(1_000).len(), 1);
    }

    #[test]
    fn test_begin_movement_requires_placement() {
        let world = world_with_nodes();
        world.add_player(Player::new("p1", "Sam", Some(node("refugio"))));
        world.add_player(Player::new("p2", "Lu", None));

        assert!(world.begin_player_movement_at(
            &PlayerId::from("p1"),
            &node("hospital"),
            Duration::from_secs(5),
            1_000
        ));
        let movement = world.get_player(&PlayerId::from("p1")).unwrap().movement.unwrap();
        assert_eq!(movement.from, node("refugio"));
        assert_eq!(movement.arrives_at, 6_000);

        let p2 = PlayerId::from("p2");
        assert!(!world.begin_player_movement(&p2, &node("hospital"), Duration::from_secs(5)));
    }

    #[test]
    fn test_stats() {
        let world = world_with_nodes();
        world.add_player(Player::new("p1", "Sam", Some(node("refugio"))));
        let mut dead = Npc::new("n1", "Rosa", Some(node("hospital")));
        dead.status = crate::types::NpcStatus::Dead;
        world.add_npc(dead);
        world.add_npc(Npc::new("n2", "Tomas", Some(node("hospital"))));

        let stats = world.stats();
        assert_eq!(stats.players, 1);
        assert_eq!(stats.online_players, 1);
        assert_eq!(stats.npcs, 2);
        assert_eq!(stats.living_npcs, 1);
        assert_eq!(stats.nodes, 2);
    }
}
