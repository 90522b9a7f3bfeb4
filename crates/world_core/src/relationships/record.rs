//! Relationship vector, derived state and bounded history.

use crate::types::{NpcId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const MAX_HISTORY: usize = 30;

const DIM_MIN: i32 = 0;
const DIM_MAX: i32 = 100;

/// Friendship and respect rest at this value; the others rest at zero.
const NEUTRAL_REGARD: i32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipState {
    Lovers,
    SexualTension,
    Enemies,
    Rivals,
    Friends,
    Jealous,
    Complicated,
    Neutral,
}

impl RelationshipState {
    /// First matching rule wins; the order matters.
    pub fn derive(d: &Dimensions) -> Self {
        if d.attraction > 70 && d.friendship > 50 {
            return RelationshipState::Lovers;
        }
        if d.attraction > 60 && d.friendship < 40 {
            return RelationshipState::SexualTension;
        }
        if d.rivalry > 70 {
            return RelationshipState::Enemies;
        }
        if d.rivalry > 40 && d.respect > 60 {
            return RelationshipState::Rivals;
        }
        if d.friendship > 70 && d.respect > 60 {
            return RelationshipState::Friends;
        }
        if d.jealousy > 70 {
            return RelationshipState::Jealous;
        }

        let strong = [d.friendship, d.attraction, d.rivalry, d.jealousy]
            .iter()
            .filter(|v| **v > 60)
            .count();
        if strong >= 2 {
            RelationshipState::Complicated
        } else {
            RelationshipState::Neutral
        }
    }
}

/// The five relationship dimensions, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub friendship: i32,
    pub attraction: i32,
    pub respect: i32,
    pub rivalry: i32,
    pub jealousy: i32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            friendship: NEUTRAL_REGARD,
            attraction: 0,
            respect: NEUTRAL_REGARD,
            rivalry: 0,
            jealousy: 0,
        }
    }
}

impl Dimensions {
    /// `clamp(floor(Σ|dim − baseline| / 25) + 1, 1, 10)`
    pub fn intensity(&self) -> u8 {
        let deviation = (self.friendship - NEUTRAL_REGARD).abs()
            + (self.respect - NEUTRAL_REGARD).abs()
            + self.attraction.abs()
            + self.rivalry.abs()
            + self.jealousy.abs();
        (deviation / 25 + 1).clamp(1, 10) as u8
    }

    fn apply(&mut self, deltas: &RelationshipDeltas) {
        self.friendship = clamp_dim(self.friendship.saturating_add(deltas.friendship));
        self.attraction = clamp_dim(self.attraction.saturating_add(deltas.attraction));
        self.respect = clamp_dim(self.respect.saturating_add(deltas.respect));
        self.rivalry = clamp_dim(self.rivalry.saturating_add(deltas.rivalry));
        self.jealousy = clamp_dim(self.jealousy.saturating_add(deltas.jealousy));
    }

    /// One unit toward each baseline. Returns whether anything moved.
    fn relax(&mut self) -> bool {
        let before = *self;
        self.friendship = step_toward(self.friendship, NEUTRAL_REGARD);
        self.respect = step_toward(self.respect, NEUTRAL_REGARD);
        self.attraction = step_toward(self.attraction, 0);
        self.rivalry = step_toward(self.rivalry, 0);
        self.jealousy = step_toward(self.jealousy, 0);
        *self != before
    }
}

fn clamp_dim(value: i32) -> i32 {
    value.clamp(DIM_MIN, DIM_MAX)
}

fn step_toward(value: i32, target: i32) -> i32 {
    value + (target - value).signum()
}

/// Signed change per dimension. Missing dimensions are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipDeltas {
    pub friendship: i32,
    pub attraction: i32,
    pub respect: i32,
    pub rivalry: i32,
    pub jealousy: i32,
}

impl RelationshipDeltas {
    pub const fn new(
        friendship: i32,
        attraction: i32,
        respect: i32,
        rivalry: i32,
        jealousy: i32,
    ) -> Self {
        Self {
            friendship,
            attraction,
            respect,
            rivalry,
            jealousy,
        }
    }
}

/// Unordered NPC pair stored smallest id first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: NpcId,
    second: NpcId,
}

impl PairKey {
    /// `None` for a pair of an NPC with itself.
    pub fn new(a: &NpcId, b: &NpcId) -> Option<Self> {
        match a.cmp(b) {
            std::cmp::Ordering::Less => Some(Self {
                first: a.clone(),
                second: b.clone(),
            }),
            std::cmp::Ordering::Greater => Some(Self {
                first: b.clone(),
                second: a.clone(),
            }),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn first(&self) -> &NpcId {
        &self.first
    }

    pub fn second(&self) -> &NpcId {
        &self.second
    }

    pub fn contains(&self, id: &NpcId) -> bool {
        &self.first == id || &self.second == id
    }

    pub fn other(&self, id: &NpcId) -> Option<&NpcId> {
        if &self.first == id {
            Some(&self.second)
        } else if &self.second == id {
            Some(&self.first)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: Timestamp,
    pub event: String,
}

/// Fields are private so the vector only changes through clamped updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pair: PairKey,
    dimensions: Dimensions,
    state: RelationshipState,
    intensity: u8,
    last_interaction: Timestamp,
    interaction_count: u64,
    history: VecDeque<HistoryEntry>,
}

impl RelationshipRecord {
    pub(super) fn new(pair: PairKey, now: Timestamp) -> Self {
        let dimensions = Dimensions::default();
        Self {
            pair,
            state: RelationshipState::derive(&dimensions),
            intensity: dimensions.intensity(),
            dimensions,
            last_interaction: now,
            interaction_count: 0,
            history: VecDeque::new(),
        }
    }

    pub fn pair(&self) -> &PairKey {
        &self.pair
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn friendship(&self) -> i32 {
        self.dimensions.friendship
    }

    pub fn attraction(&self) -> i32 {
        self.dimensions.attraction
    }

    pub fn respect(&self) -> i32 {
        self.dimensions.respect
    }

    pub fn rivalry(&self) -> i32 {
        self.dimensions.rivalry
    }

    pub fn jealousy(&self) -> i32 {
        self.dimensions.jealousy
    }

    pub fn state(&self) -> RelationshipState {
        self.state
    }

    pub fn intensity(&self) -> u8 {
        self.intensity
    }

    pub fn last_interaction(&self) -> Timestamp {
        self.last_interaction
    }

    pub fn interaction_count(&self) -> u64 {
        self.interaction_count
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub(super) fn apply(
        &mut self,
        deltas: &RelationshipDeltas,
        event: Option<&str>,
        now: Timestamp,
    ) {
        self.dimensions.apply(deltas);
        self.refresh_derived();
        if let Some(event) = event {
            self.history.push_back(HistoryEntry {
                at: now,
                event: event.to_string(),
            });
            while self.history.len() > MAX_HISTORY {
                self.history.pop_front();
            }
        }
        self.last_interaction = now;
        self.interaction_count += 1;
    }

    pub(super) fn is_stale(&self, now: Timestamp, stale_after_ms: u64) -> bool {
        now.saturating_sub(self.last_interaction) > stale_after_ms
    }

    /// Drifts one unit toward neutral without counting as an interaction.
    pub(super) fn relax(&mut self) -> bool {
        let moved = self.dimensions.relax();
        if moved {
            self.refresh_derived();
        }
        moved
    }

    fn refresh_derived(&mut self) {
        self.state = RelationshipState::derive(&self.dimensions);
        self.intensity = self.dimensions.intensity();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(f: i32, a: i32, r: i32, rv: i32, j: i32) -> Dimensions {
        Dimensions {
            friendship: f,
            attraction: a,
            respect: r,
            rivalry: rv,
            jealousy: j,
        }
    }

    #[test]
    fn test_state_rule_order() {
        // Lovers beats friends even though both match.
        assert_eq!(RelationshipState::derive(&dims(80, 75, 70, 0, 0)), RelationshipState::Lovers);
        assert_eq!(
            RelationshipState::derive(&dims(30, 65, 50, 0, 0)),
            RelationshipState::SexualTension
        );
        // Enemies beats rivals.
        assert_eq!(RelationshipState::derive(&dims(50, 0, 80, 75, 0)), RelationshipState::Enemies);
        assert_eq!(RelationshipState::derive(&dims(50, 0, 65, 45, 0)), RelationshipState::Rivals);
        assert_eq!(RelationshipState::derive(&dims(75, 0, 65, 0, 0)), RelationshipState::Friends);
        assert_eq!(RelationshipState::derive(&dims(50, 0, 50, 0, 80)), RelationshipState::Jealous);
        assert_eq!(
            RelationshipState::derive(&dims(65, 0, 50, 65, 0)),
            RelationshipState::Complicated
        );
        assert_eq!(RelationshipState::derive(&Dimensions::default()), RelationshipState::Neutral);
    }

    #[test]
    fn test_intensity_bounds() {
        assert_eq!(Dimensions::default().intensity(), 1);
        assert_eq!(dims(100, 80, 50, 0, 0).intensity(), 6);
        assert_eq!(dims(0, 100, 0, 100, 100).intensity(), 10);
    }

    #[test]
    fn test_pair_key_normalises() {
        let a = NpcId::from("ana");
        let b = NpcId::from("bruno");
        let ab = PairKey::new(&a, &b).unwrap();
        let ba = PairKey::new(&b, &a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.first(), &a);
        assert_eq!(ab.other(&b), Some(&a));
        assert!(PairKey::new(&a, &a).is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let pair = PairKey::new(&NpcId::from("a"), &NpcId::from("b")).unwrap();
        let mut record = RelationshipRecord::new(pair, 0);
        for i in 0..40 {
            record.apply(&RelationshipDeltas::default(), Some(&format!("event {i}")), i);
        }
        assert_eq!(record.history_len(), MAX_HISTORY);
        assert_eq!(record.history().next().map(|e| e.event.as_str()), Some("event 10"));
        assert_eq!(record.interaction_count(), 40);
    }
}
