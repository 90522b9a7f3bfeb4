//! Narrative interaction templates.
//!
//! Each relationship state maps to a category; each category holds a few
//! weighted templates whose deltas feed back into the relationship.

use super::record::{RelationshipDeltas, RelationshipState};
use crate::types::{NodeId, NpcId, Timestamp};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionCategory {
    Romance,
    Tension,
    Conflict,
    Rivalry,
    Friendship,
    Jealousy,
    Complex,
    Neutral,
}

impl From<RelationshipState> for InteractionCategory {
    fn from(state: RelationshipState) -> Self {
        match state {
            RelationshipState::Lovers => InteractionCategory::Romance,
            RelationshipState::SexualTension => InteractionCategory::Tension,
            RelationshipState::Enemies => InteractionCategory::Conflict,
            RelationshipState::Rivals => InteractionCategory::Rivalry,
            RelationshipState::Friends => InteractionCategory::Friendship,
            RelationshipState::Jealous => InteractionCategory::Jealousy,
            RelationshipState::Complicated => InteractionCategory::Complex,
            RelationshipState::Neutral => InteractionCategory::Neutral,
        }
    }
}

pub(super) struct Template {
    pub kind: &'static str,
    /// `{a}` and `{b}` are replaced with the NPC names.
    pub text: &'static str,
    pub weight: u32,
    pub deltas: RelationshipDeltas,
}

/// Deltas are in `[friendship, attraction, respect, rivalry, jealousy]` order.
const fn t(kind: &'static str, text: &'static str, weight: u32, d: [i32; 5]) -> Template {
    Template {
        kind,
        text,
        weight,
        deltas: RelationshipDeltas::new(d[0], d[1], d[2], d[3], d[4]),
    }
}

static ROMANCE: [Template; 3] = [
    t("shared_watch", "{a} and {b} keep watch together through the night", 5, [3, 4, 1, 0, 0]),
    t("gift", "{a} saves a rare can of peaches for {b}", 3, [4, 3, 0, 0, 0]),
    t("argument", "{a} and {b} argue about the risks {b} keeps taking", 2, [-3, -1, 0, 2, 2]),
];

static TENSION: [Template; 3] = [
    t("lingering_glance", "{a} can't stop glancing at {b} across the fire", 5, [0, 4, 0, 0, 1]),
    t(
        "heated_exchange",
        "A heated exchange between {a} and {b} ends too close for comfort",
        3,
        [-2, 5, 0, 2, 0],
    ),
    t(
        "confession",
        "{a} admits to {b} that the tension is getting hard to ignore",
        2,
        [6, 3, 2, -2, 0],
    ),
];

static CONFLICT: [Template; 3] = [
    t("shoving", "{a} shoves {b} over a missing ration", 5, [-4, 0, -2, 4, 0]),
    t("sabotage", "{a} is caught tampering with {b}'s gear", 2, [-6, 0, -4, 6, 0]),
    t("truce", "{a} and {b} agree to a grudging truce", 3, [3, 0, 3, -5, 0]),
];

static RIVALRY: [Template; 3] = [
    t("scavenge_race", "{a} and {b} race to clear the same supply cache", 5, [0, 0, 3, 3, 0]),
    t("boast", "{a} boasts about outscoring {b} on the last patrol", 3, [-2, 0, -1, 4, 1]),
    t("respect_earned", "{b} quietly admits {a} handled the horde well", 2, [3, 0, 5, -3, 0]),
];

static FRIENDSHIP: [Template; 3] = [
    t("share_food", "{a} splits a meal with {b}", 5, [4, 0, 2, 0, 0]),
    t("cover_fire", "{a} covers {b} during a supply run", 3, [5, 1, 4, 0, 0]),
    t("old_stories", "{a} and {b} trade stories from before the outbreak", 4, [3, 1, 1, 0, 0]),
];

static JEALOUSY: [Template; 3] = [
    t("cold_shoulder", "{a} gives {b} the cold shoulder", 5, [-3, 0, 0, 1, 3]),
    t("rumour", "{a} spreads a rumour about {b}", 3, [-4, 0, -3, 3, 2]),
    t("clear_air", "{a} and {b} finally talk it through", 2, [3, 0, 2, 0, -6]),
];

static COMPLEX: [Template; 3] = [
    t("mixed_signals", "{a} sends {b} mixed signals again", 5, [1, 2, 0, 1, 2]),
    t("late_talk", "{a} and {b} talk late into the night", 3, [3, 2, 2, -2, -2]),
    t("blowup", "Old grievances between {a} and {b} boil over", 2, [-5, 0, -2, 4, 3]),
];

static NEUTRAL: [Template; 4] = [
    t("small_talk", "{a} and {b} exchange a few words about the weather", 6, [2, 0, 1, 0, 0]),
    t("shared_chore", "{a} helps {b} reinforce the barricade", 4, [3, 0, 3, 0, 0]),
    t("spark", "{a} notices {b} in a new light", 1, [1, 5, 0, 0, 0]),
    t("disagreement", "{a} and {b} disagree about rationing", 2, [-2, 0, 0, 3, 0]),
];

fn templates(category: InteractionCategory) -> &'static [Template] {
    match category {
        InteractionCategory::Romance => &ROMANCE,
        InteractionCategory::Tension => &TENSION,
        InteractionCategory::Conflict => &CONFLICT,
        InteractionCategory::Rivalry => &RIVALRY,
        InteractionCategory::Friendship => &FRIENDSHIP,
        InteractionCategory::Jealousy => &JEALOUSY,
        InteractionCategory::Complex => &COMPLEX,
        InteractionCategory::Neutral => &NEUTRAL,
    }
}

pub(super) fn draw<R: Rng + ?Sized>(
    rng: &mut R,
    category: InteractionCategory,
) -> Option<&'static Template> {
    templates(category).choose_weighted(rng, |t| t.weight).ok()
}

pub(super) fn render(template: &Template, a: &str, b: &str) -> String {
    template.text.replace("{a}", a).replace("{b}", b)
}

/// A generated narrative event, already applied to the relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub npc_a: NpcId,
    pub npc_b: NpcId,
    pub node_id: NodeId,
    pub category: InteractionCategory,
    pub kind: String,
    pub description: String,
    pub deltas: RelationshipDeltas,
    pub state_before: RelationshipState,
    pub state_after: RelationshipState,
    pub intensity: u8,
    pub at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_every_category_has_templates() {
        let mut rng = StdRng::seed_from_u64(7);
        for state in [
            RelationshipState::Lovers,
            RelationshipState::SexualTension,
            RelationshipState::Enemies,
            RelationshipState::Rivals,
            RelationshipState::Friends,
            RelationshipState::Jealous,
            RelationshipState::Complicated,
            RelationshipState::Neutral,
        ] {
            assert!(draw(&mut rng, state.into()).is_some(), "no template for {state:?}");
        }
    }

    #[test]
    fn test_render_names() {
        let text = render(&FRIENDSHIP[0], "Rosa", "Tomas");
        assert_eq!(text, "Rosa splits a meal with Tomas");
    }
}
