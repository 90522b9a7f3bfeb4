//! Pairwise NPC relationships and the narrative events they produce.
//!
//! Records live in a `DashMap` keyed by the normalised pair; the entry lock
//! makes each update atomic per pair. After every change the derived state is
//! mirrored onto both NPCs in [`WorldState`]. Lock order is record entry, then
//! NPC entry.

mod narrative;
mod record;

pub use narrative::{Interaction, InteractionCategory};
pub use record::{
    Dimensions, HistoryEntry, PairKey, RelationshipDeltas, RelationshipRecord, RelationshipState,
    MAX_HISTORY,
};

use crate::config::RelationshipSettings;
use crate::types::{now_millis, NodeId, Npc, NpcId, RelationshipSummary, Timestamp};
use crate::world::WorldState;
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

pub struct RelationshipEngine {
    world: Arc<WorldState>,
    records: DashMap<PairKey, RelationshipRecord>,
    stale_after_ms: u64,
    interaction_chance: f64,
}

impl RelationshipEngine {
    pub fn new(world: Arc<WorldState>, settings: &RelationshipSettings) -> Self {
        Self {
            world,
            records: DashMap::new(),
            stale_after_ms: settings.stale_after_secs.saturating_mul(1000),
            interaction_chance: settings.interaction_chance,
        }
    }

    pub fn get_or_create(&self, a: &NpcId, b: &NpcId) -> Option<RelationshipRecord> {
        self.get_or_create_at(a, b, now_millis())
    }

    pub fn get_or_create_at(
        &self,
        a: &NpcId,
        b: &NpcId,
        now: Timestamp,
    ) -> Option<RelationshipRecord> {
        let key = PairKey::new(a, b)?;
        let record = self
            .records
            .entry(key.clone())
            .or_insert_with(|| RelationshipRecord::new(key, now));
        Some(record.value().clone())
    }

    /// Lookup only; argument order does not matter.
    pub fn get_relationship(&self, a: &NpcId, b: &NpcId) -> Option<RelationshipRecord> {
        let key = PairKey::new(a, b)?;
        self.records.get(&key).map(|r| r.value().clone())
    }

    pub fn update(
        &self,
        a: &NpcId,
        b: &NpcId,
        deltas: &RelationshipDeltas,
        event: Option<&str>,
    ) -> Option<RelationshipRecord> {
        self.update_at(a, b, deltas, event, now_millis())
    }

    /// Applies clamped deltas, re-derives state and intensity, records the
    /// optional history entry and mirrors the summary onto both NPCs.
    pub fn update_at(
        &self,
        a: &NpcId,
        b: &NpcId,
        deltas: &RelationshipDeltas,
        event: Option<&str>,
        now: Timestamp,
    ) -> Option<RelationshipRecord> {
        let Some(key) = PairKey::new(a, b) else {
            debug!("Ignoring relationship update of {} with itself", a);
            return None;
        };

        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| RelationshipRecord::new(key, now));
        let previous = entry.state();
        entry.apply(deltas, event, now);
        if entry.state() != previous {
            debug!(
                "💞 {} / {}: {:?} -> {:?}",
                entry.value().pair().first(),
                entry.value().pair().second(),
                previous,
                entry.state()
            );
        }
        self.persist(&entry);
        Some(entry.value().clone())
    }

    fn persist(&self, record: &RelationshipRecord) {
        let summary = RelationshipSummary {
            state: record.state(),
            intensity: record.intensity(),
        };
        let (first, second) = (record.pair().first(), record.pair().second());
        let stored_first = self.world.with_npc_mut(first, |npc| {
            npc.relationships.insert(second.clone(), summary.clone());
        });
        let stored_second = self.world.with_npc_mut(second, |npc| {
            npc.relationships.insert(first.clone(), summary.clone());
        });
        if stored_first.is_none() || stored_second.is_none() {
            trace!("Relationship {} / {} involves an unknown NPC", first, second);
        }
    }

    pub fn decay_all(&self) -> usize {
        self.decay_all_at(now_millis())
    }

    /// Nudges every stale record one unit toward neutral. Returns the number
    /// of records that changed.
    pub fn decay_all_at(&self, now: Timestamp) -> usize {
        let mut changed = 0;
        for mut entry in self.records.iter_mut() {
            if !entry.is_stale(now, self.stale_after_ms) {
                continue;
            }
            let before = (entry.state(), entry.intensity());
            if entry.relax() {
                changed += 1;
                if (entry.state(), entry.intensity()) != before {
                    self.persist(&entry);
                }
            }
        }
        changed
    }

    pub fn generate_interaction(&self, a: &NpcId, b: &NpcId) -> Option<Interaction> {
        self.generate_interaction_with(&mut rand::thread_rng(), a, b, now_millis())
    }

    /// Draws and applies one narrative interaction. Both NPCs must exist, be
    /// alive and stand on the same node.
    pub fn generate_interaction_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        a: &NpcId,
        b: &NpcId,
        now: Timestamp,
    ) -> Option<Interaction> {
        let npc_a = self.world.get_npc(a)?;
        let npc_b = self.world.get_npc(b)?;
        let node_id = shared_node(&npc_a, &npc_b)?;

        let before = self.get_or_create_at(a, b, now)?;
        let category = InteractionCategory::from(before.state());
        let template = narrative::draw(rng, category)?;
        let description = narrative::render(template, &npc_a.name, &npc_b.name);

        let after = self.update_at(a, b, &template.deltas, Some(&description), now)?;
        Some(Interaction {
            npc_a: a.clone(),
            npc_b: b.clone(),
            node_id,
            category,
            kind: template.kind.to_string(),
            description,
            deltas: template.deltas,
            state_before: before.state(),
            state_after: after.state(),
            intensity: after.intensity(),
            at: now,
        })
    }

    /// One social pass: every pair of living NPCs sharing a node interacts
    /// with the configured chance.
    pub fn social_pass_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        now: Timestamp,
    ) -> Vec<Interaction> {
        let mut by_node: HashMap<NodeId, Vec<NpcId>> = HashMap::new();
        for npc in self.world.npcs() {
            if let (true, Some(node)) = (npc.is_alive(), npc.node_id) {
                by_node.entry(node).or_default().push(npc.id);
            }
        }

        let mut interactions = Vec::new();
        for mut ids in by_node.into_values() {
            ids.sort();
            for i in 0..ids.len() {
                for j in (i + 1)..ids.len() {
                    if !rng.gen_bool(self.interaction_chance) {
                        continue;
                    }
                    let (a, b) = (&ids[i], &ids[j]);
                    if let Some(interaction) = self.generate_interaction_with(rng, a, b, now) {
                        interactions.push(interaction);
                    }
                }
            }
        }
        interactions
    }

    /// Every record involving `npc`, strongest first.
    pub fn relationships_of(&self, npc: &NpcId) -> Vec<RelationshipRecord> {
        let mut records: Vec<RelationshipRecord> = self
            .records
            .iter()
            .filter(|r| r.value().pair().contains(npc))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| {
            b.intensity()
                .cmp(&a.intensity())
                .then_with(|| a.pair().cmp(b.pair()))
        });
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn shared_node(a: &Npc, b: &Npc) -> Option<NodeId> {
    if !a.is_alive() || !b.is_alive() {
        return None;
    }
    match (&a.node_id, &b.node_id) {
        (Some(x), Some(y)) if x == y => Some(x.clone()),
        _ => None,
    }
}
