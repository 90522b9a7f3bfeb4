//! Entity table with a node reverse index.
//!
//! The entities live in a `DashMap`; the per-node buckets live behind one
//! `RwLock`. Every operation that touches a bucket takes the index lock
//! before the entity shard, so a relocation is never observable half-applied.

use crate::types::{NodeId, Npc, NpcId, Player, PlayerId};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::hash::Hash;
use tracing::{debug, warn};

/// An entity that can stand on a node.
pub trait Placed: Clone {
    type Id: Clone + Eq + Hash + Display;

    fn id(&self) -> &Self::Id;
    fn node_id(&self) -> Option<&NodeId>;
    fn set_node_id(&mut self, node: Option<NodeId>);
}

impl Placed for Player {
    type Id = PlayerId;

    fn id(&self) -> &PlayerId {
        &self.id
    }

    fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    fn set_node_id(&mut self, node: Option<NodeId>) {
        self.node_id = node;
    }
}

impl Placed for Npc {
    type Id = NpcId;

    fn id(&self) -> &NpcId {
        &self.id
    }

    fn node_id(&self) -> Option<&NodeId> {
        self.node_id.as_ref()
    }

    fn set_node_id(&mut self, node: Option<NodeId>) {
        self.node_id = node;
    }
}

pub struct NodeIndexedMap<V: Placed> {
    kind: &'static str,
    entities: DashMap<V::Id, V>,
    by_node: RwLock<HashMap<NodeId, HashSet<V::Id>>>,
}

fn unlink<K: Eq + Hash>(buckets: &mut HashMap<NodeId, HashSet<K>>, node: &NodeId, id: &K) {
    if let Some(bucket) = buckets.get_mut(node) {
        bucket.remove(id);
        if bucket.is_empty() {
            buckets.remove(node);
        }
    }
}

fn link<K: Eq + Hash>(buckets: &mut HashMap<NodeId, HashSet<K>>, node: NodeId, id: K) {
    buckets.entry(node).or_default().insert(id);
}

impl<V: Placed> NodeIndexedMap<V> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entities: DashMap::new(),
            by_node: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts or replaces an entity. An entity without a node is stored
    /// but left out of the index.
    pub fn insert(&self, entity: V) -> Option<V> {
        let id = entity.id().clone();
        let node = entity.node_id().cloned();

        let mut buckets = self.by_node.write();
        let previous = self.entities.insert(id.clone(), entity);
        if let Some(old_node) = previous.as_ref().and_then(|p| p.node_id()) {
            unlink(&mut buckets, old_node, &id);
        }
        match node {
            Some(node) => link(&mut buckets, node, id),
            None => debug!("{} {} added without a node, left unindexed", self.kind, id),
        }
        previous
    }

    /// Unlinks from the index first, then drops the entity.
    pub fn remove(&self, id: &V::Id) -> Option<V> {
        let mut buckets = self.by_node.write();
        let node = self.entities.get(id).and_then(|e| e.node_id().cloned());
        if let Some(node) = node {
            unlink(&mut buckets, &node, id);
        }
        self.entities.remove(id).map(|(_, entity)| entity)
    }

    /// Removes the entity only if `predicate` still holds once both the index
    /// and the entity's shard are locked.
    pub fn remove_if(&self, id: &V::Id, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut buckets = self.by_node.write();
        let (_, entity) = self.entities.remove_if(id, |_, entity| predicate(entity))?;
        if let Some(node) = entity.node_id() {
            unlink(&mut buckets, node, id);
        }
        Some(entity)
    }

    pub fn get(&self, id: &V::Id) -> Option<V> {
        self.entities.get(id).map(|e| e.value().clone())
    }

    pub fn contains(&self, id: &V::Id) -> bool {
        self.entities.contains_key(id)
    }

    /// Runs `f` against the stored entity. The node id is owned by the index:
    /// a change made inside the closure is reverted.
    ///
    /// `f` must not call back into the owning `WorldState`.
    pub fn with_mut<R>(&self, id: &V::Id, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        let mut entry = self.entities.get_mut(id)?;
        let node_before = entry.node_id().cloned();
        let result = f(entry.value_mut());
        if entry.node_id() != node_before.as_ref() {
            warn!(
                "{} {} node changed outside of relocation, reverting to {:?}",
                self.kind, id, node_before
            );
            entry.set_node_id(node_before);
        }
        Some(result)
    }

    /// Atomic re-index from `old` (and whatever node is actually recorded)
    /// to `new`. Returns `false` only when the entity is unknown.
    pub fn relocate(&self, id: &V::Id, old: &NodeId, new: &NodeId) -> bool {
        let mut buckets = self.by_node.write();
        let Some(mut entity) = self.entities.get_mut(id) else {
            debug!("Ignoring relocation of unknown {} {}", self.kind, id);
            return false;
        };

        let recorded = entity.node_id().cloned();
        unlink(&mut buckets, old, id);
        if let Some(recorded) = recorded.filter(|r| r != old) {
            debug!(
                "{} {} was recorded on {} but moved from {}",
                self.kind, id, recorded, old
            );
            unlink(&mut buckets, &recorded, id);
        }
        entity.set_node_id(Some(new.clone()));
        link(&mut buckets, new.clone(), id.clone());
        true
    }

    pub fn ids_in_node(&self, node: &NodeId) -> Vec<V::Id> {
        self.by_node
            .read()
            .get(node)
            .map(|bucket| bucket.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn in_node(&self, node: &NodeId) -> Vec<V> {
        self.ids_in_node(node)
            .iter()
            .filter_map(|id| self.get(id))
            .collect()
    }

    pub fn count_in_node(&self, node: &NodeId) -> usize {
        self.by_node.read().get(node).map_or(0, HashSet::len)
    }

    pub fn ids(&self) -> Vec<V::Id> {
        self.entities.iter().map(|e| e.key().clone()).collect()
    }

    pub fn values(&self) -> Vec<V> {
        self.entities.iter().map(|e| e.value().clone()).collect()
    }

    pub fn filter(&self, mut predicate: impl FnMut(&V) -> bool) -> Vec<V> {
        self.entities
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Every placed entity sits in exactly its own bucket and no bucket
    /// holds a stray id.
    pub fn is_consistent(&self) -> bool {
        let buckets = self.by_node.read();
        let indexed: usize = buckets.values().map(HashSet::len).sum();
        let mut placed = 0;
        for entry in self.entities.iter() {
            if let Some(node) = entry.node_id() {
                placed += 1;
                let in_own = buckets.get(node).is_some_and(|b| b.contains(entry.key()));
                if !in_own {
                    return false;
                }
            }
        }
        placed == indexed
    }
}
