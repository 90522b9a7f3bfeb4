//! Messages the scheduler hands to the client fan-out layer.
//!
//! Every variant serialises as `{"type": "...", ...}`; delivery (area of
//! interest, transport) is up to whoever registers an `on_broadcast` hook.

use crate::relationships::Interaction;
use crate::types::{EventId, NodeId, PlayerId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastMessage {
    EventExpired {
        event_id: EventId,
        node_id: NodeId,
        event_type: String,
    },
    MovementCompleted {
        player_id: PlayerId,
        from: NodeId,
        to: NodeId,
    },
    CombatRound {
        player_id: PlayerId,
        enemy: String,
        round: u32,
        damage_dealt: i32,
        damage_taken: i32,
        player_health: i32,
        enemy_health: i32,
    },
    CombatEnded {
        player_id: PlayerId,
        enemy: String,
        outcome: CombatOutcome,
    },
    NpcInteraction {
        #[serde(flatten)]
        interaction: Interaction,
    },
}

impl BroadcastMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            BroadcastMessage::EventExpired { .. } => "event_expired",
            BroadcastMessage::MovementCompleted { .. } => "movement_completed",
            BroadcastMessage::CombatRound { .. } => "combat_round",
            BroadcastMessage::CombatEnded { .. } => "combat_ended",
            BroadcastMessage::NpcInteraction { .. } => "npc_interaction",
        }
    }

    /// The node whose clients should hear about this, when there is one.
    pub fn node(&self) -> Option<&NodeId> {
        match self {
            BroadcastMessage::EventExpired { node_id, .. } => Some(node_id),
            BroadcastMessage::MovementCompleted { to, .. } => Some(to),
            BroadcastMessage::NpcInteraction { interaction } => Some(&interaction.node_id),
            BroadcastMessage::CombatRound { .. } | BroadcastMessage::CombatEnded { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    Victory,
    Defeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickKind {
    Main,
    Fast,
    Slow,
}

/// Passed to `on_tick` hooks once per main tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickInfo {
    pub tick: u64,
    #[serde(rename = "type")]
    pub kind: TickKind,
    pub timestamp: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tagged_shape() {
        let message = BroadcastMessage::MovementCompleted {
            player_id: PlayerId::from("p1"),
            from: NodeId::from("refugio"),
            to: NodeId::from("hospital"),
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "movement_completed");
        assert_eq!(value["to"], "hospital");
        assert_eq!(message.kind(), "movement_completed");
        assert_eq!(message.node(), Some(&NodeId::from("hospital")));
    }

    #[test]
    fn test_combat_messages_have_no_node() {
        let message = BroadcastMessage::CombatEnded {
            player_id: PlayerId::from("p1"),
            enemy: "walker".to_string(),
            outcome: CombatOutcome::Defeat,
        };
        assert!(message.node().is_none());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], "combat_ended");
        assert_eq!(value["outcome"], "defeat");
    }

    #[test]
    fn test_tick_info_shape() {
        let info = TickInfo {
            tick: 30,
            kind: TickKind::Main,
            timestamp: 1_700_000_000_000,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "main");
        assert_eq!(value["tick"], 30);
    }
}
