//! Point-in-time copy of the registry for an external persistence layer.
//!
//! The core never pushes to storage; a collaborator calls
//! [`WorldState::snapshot`] and writes the result wherever it likes.

use super::WorldState;
use crate::types::{now_millis, Node, Npc, Player, Timestamp, WorldEvent};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub taken_at: Timestamp,
    pub players: Vec<Player>,
    pub npcs: Vec<Npc>,
    pub nodes: Vec<Node>,
    pub events: Vec<WorldEvent>,
}

impl WorldSnapshot {
    /// Collects each map separately; the copy is consistent per entity, not
    /// across entities.
    pub(super) fn capture(world: &WorldState) -> Self {
        let mut players = world.players();
        players.sort_by(|a, b| a.id.cmp(&b.id));
        let mut npcs = world.npcs();
        npcs.sort_by(|a, b| a.id.cmp(&b.id));
        let mut nodes = world.nodes();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut events = world.events();
        events.sort_by(|a, b| a.id.cmp(&b.id));

        Self {
            taken_at: now_millis(),
            players,
            npcs,
            nodes,
            events,
        }
    }

    /// Rebuilds a world from a snapshot, re-indexing every entity.
    pub fn restore_into(self, world: &WorldState) {
        for node in self.nodes {
            world.add_node(node);
        }
        for player in self.players {
            world.add_player(player);
        }
        for npc in self.npcs {
            world.add_npc(npc);
        }
        for event in self.events {
            world.add_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, PlayerId};

    #[test]
    fn test_snapshot_json_and_restore() {
        let world = WorldState::default();
        world.add_node(Node::new("refugio", "Refugio", "centro"));
        world.add_player(Player::new("p2", "Lu", Some(NodeId::from("refugio"))));
        world.add_player(Player::new("p1", "Sam", Some(NodeId::from("refugio"))));
        world.add_npc(Npc::new("n1", "Rosa", Some(NodeId::from("refugio"))));

        let snapshot = world.snapshot();
        assert_eq!(snapshot.players[0].id, PlayerId::from("p1"));

        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: WorldSnapshot = serde_json::from_str(&json).unwrap();

        let restored = WorldState::default();
        parsed.restore_into(&restored);
        assert_eq!(restored.player_count_in_node(&NodeId::from("refugio")), 2);
        assert_eq!(restored.npc_count_in_node(&NodeId::from("refugio")), 1);
        assert!(restored.verify_index_integrity());
    }
}
