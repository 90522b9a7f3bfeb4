//! Initial world content.
//!
//! A [`WorldSeed`] lists nodes, regions, region adjacency and NPCs. It is
//! validated as a whole before anything is inserted, so a bad seed leaves the
//! world untouched. The built-in [`WorldSeed::outbreak`] map is used when no
//! seed file is configured.
//!
//! ```toml
//! adjacency = [["centro", "sur"]]
//!
//! [[nodes]]
//! id = "refugio"
//! name = "Refugio"
//! region_id = "centro"
//! connections = ["plaza"]
//!
//! [[regions]]
//! id = "centro"
//! name = "Centro"
//! node_ids = ["refugio", "plaza"]
//!
//! [[npcs]]
//! id = "rosa"
//! name = "Rosa"
//! node_id = "refugio"
//! ```

use crate::error::{WorldError, WorldResult};
use crate::regions::{RegionManager, RegionSpec};
use crate::types::{Node, NodeId, Npc, NpcId, Personality, RegionId, ResourceStock};
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSeed {
    pub id: NpcId,
    pub name: String,
    pub node_id: Option<NodeId>,
    /// Scripted NPCs (traders, radio voices) skip need simulation.
    #[serde(default = "default_true")]
    pub simulate_needs: bool,
    #[serde(default)]
    pub personality: Option<Personality>,
}

impl NpcSeed {
    fn into_npc(self) -> Npc {
        let mut npc = Npc::new(self.id, self.name, self.node_id);
        if !self.simulate_needs {
            npc.needs = None;
        }
        if let Some(personality) = self.personality {
            npc.personality = personality;
        }
        npc
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub regions: Vec<RegionSpec>,
    #[serde(default)]
    pub adjacency: Vec<[RegionId; 2]>,
    #[serde(default)]
    pub npcs: Vec<NpcSeed>,
}

/// What [`WorldSeed::apply`] inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub nodes: usize,
    pub regions: usize,
    pub npcs: usize,
}

impl WorldSeed {
    pub fn from_toml(content: &str) -> WorldResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> WorldResult<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Loads a seed file; `.json` files are read as JSON, anything else as
    /// TOML.
    pub fn load_file(path: impl AsRef<Path>) -> WorldResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    /// Checks cross references: node links, region membership, adjacency and
    /// NPC placement.
    pub fn validate(&self) -> WorldResult<()> {
        let mut node_ids: HashSet<&NodeId> = HashSet::new();
        if let Some(node) = self.nodes.iter().find(|n| !node_ids.insert(&n.id)) {
            return Err(WorldError::DuplicateNode(node.id.clone()));
        }
        let mut region_ids: HashSet<&RegionId> = HashSet::new();
        if let Some(region) = self.regions.iter().find(|r| !region_ids.insert(&r.id)) {
            return Err(WorldError::DuplicateRegion(region.id.clone()));
        }

        for node in &self.nodes {
            if let Some(target) = node.connections.iter().find(|c| !node_ids.contains(c)) {
                return Err(WorldError::UnknownNode {
                    node: node.id.clone(),
                    target: target.clone(),
                });
            }
            if !region_ids.contains(&node.region_id) {
                return Err(WorldError::UnknownRegion(node.region_id.clone()));
            }
        }

        let mut owner: HashMap<&NodeId, &RegionId> = HashMap::new();
        for region in &self.regions {
            for node in &region.node_ids {
                if !node_ids.contains(node) {
                    return Err(WorldError::RegionNodeMissing {
                        region: region.id.clone(),
                        node: node.clone(),
                    });
                }
                if let Some(existing) = owner.insert(node, &region.id) {
                    return Err(WorldError::RegionConflict {
                        node: node.clone(),
                        existing: existing.clone(),
                        requested: region.id.clone(),
                    });
                }
            }
        }
        for node in &self.nodes {
            if owner.get(&node.id) != Some(&&node.region_id) {
                return Err(WorldError::RegionNodeMissing {
                    region: node.region_id.clone(),
                    node: node.id.clone(),
                });
            }
        }

        for [a, b] in &self.adjacency {
            for id in [a, b] {
                if !region_ids.contains(id) {
                    return Err(WorldError::UnknownRegion(id.clone()));
                }
            }
        }

        for npc in &self.npcs {
            if let Some(node) = npc.node_id.as_ref().filter(|n| !node_ids.contains(n)) {
                return Err(WorldError::MisplacedNpc {
                    npc: npc.id.clone(),
                    node: node.clone(),
                });
            }
        }
        Ok(())
    }

    /// Rejects regions or node claims that `regions` already holds.
    fn check_against(&self, regions: &RegionManager) -> WorldResult<()> {
        for spec in &self.regions {
            if regions.get_region(&spec.id).is_some() {
                return Err(WorldError::DuplicateRegion(spec.id.clone()));
            }
            for node in &spec.node_ids {
                if let Some(existing) = regions.region_of_node(node) {
                    return Err(WorldError::RegionConflict {
                        node: node.clone(),
                        existing,
                        requested: spec.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validates against itself and against what `regions` already holds,
    /// then inserts everything into `world` and `regions`.
    pub fn apply(self, world: &WorldState, regions: &RegionManager) -> WorldResult<SeedSummary> {
        self.validate()?;
        self.check_against(regions)?;
        let summary = SeedSummary {
            nodes: self.nodes.len(),
            regions: self.regions.len(),
            npcs: self.npcs.len(),
        };

        for spec in self.regions {
            regions.create_region(spec)?;
        }
        for [a, b] in &self.adjacency {
            regions.connect_regions(a, b)?;
        }
        for node in self.nodes {
            world.add_node(node);
        }
        for npc in self.npcs {
            world.add_npc(npc.into_npc());
        }

        info!(
            "🌱 World seeded: {} node(s), {} region(s), {} NPC(s)",
            summary.nodes, summary.regions, summary.npcs
        );
        Ok(summary)
    }

    /// A small outbreak map: a downtown shelter, the hospital district to the
    /// south, the police station to the north and the port on the coast.
    pub fn outbreak() -> Self {
        // (difficulty, zombie density, resource multiplier)
        let region = |id: &str, name: &str, nodes: &[&str], tuning: (u32, f64, f64)| RegionSpec {
            id: RegionId::from(id),
            name: name.to_string(),
            node_ids: nodes.iter().map(|n| NodeId::from(*n)).collect(),
            difficulty: tuning.0,
            zombie_density: tuning.1,
            resource_multiplier: tuning.2,
        };
        let npc = |id: &str, name: &str, node: &str, simulate_needs: bool| NpcSeed {
            id: NpcId::from(id),
            name: name.to_string(),
            node_id: Some(NodeId::from(node)),
            simulate_needs,
            personality: None,
        };

        Self {
            nodes: vec![
                outbreak_node(
                    "refugio",
                    "Refugio",
                    "centro",
                    &["plaza", "mercado"],
                    &[("food", 100.0, 1.0), ("water", 100.0, 1.5)],
                ),
                outbreak_node(
                    "plaza",
                    "Plaza Mayor",
                    "centro",
                    &["refugio", "mercado", "hospital", "comisaria"],
                    &[],
                ),
                outbreak_node(
                    "mercado",
                    "Mercado",
                    "centro",
                    &["refugio", "plaza"],
                    &[("food", 60.0, 0.5)],
                ),
                outbreak_node(
                    "hospital",
                    "Hospital",
                    "sur",
                    &["plaza", "farmacia"],
                    &[("medicine", 40.0, 0.2)],
                ),
                outbreak_node(
                    "farmacia",
                    "Farmacia",
                    "sur",
                    &["hospital", "puerto"],
                    &[("medicine", 20.0, 0.1)],
                ),
                outbreak_node(
                    "comisaria",
                    "Comisaría",
                    "norte",
                    &["plaza", "gasolinera"],
                    &[("ammo", 50.0, 0.2)],
                ),
                outbreak_node(
                    "gasolinera",
                    "Gasolinera",
                    "norte",
                    &["comisaria"],
                    &[("fuel", 80.0, 0.3)],
                ),
                outbreak_node(
                    "puerto",
                    "Puerto",
                    "costa",
                    &["farmacia"],
                    &[("water", 200.0, 2.0), ("fuel", 40.0, 0.1)],
                ),
            ],
            regions: vec![
                region("centro", "Centro", &["refugio", "plaza", "mercado"], (1, 1.0, 1.0)),
                region("sur", "Distrito Sur", &["hospital", "farmacia"], (2, 1.5, 0.8)),
                region("norte", "Distrito Norte", &["comisaria", "gasolinera"], (3, 2.0, 0.7)),
                region("costa", "Costa", &["puerto"], (2, 1.2, 1.2)),
            ],
            adjacency: vec![
                [RegionId::from("centro"), RegionId::from("sur")],
                [RegionId::from("centro"), RegionId::from("norte")],
                [RegionId::from("sur"), RegionId::from("costa")],
            ],
            npcs: vec![
                npc("rosa", "Rosa", "refugio", true),
                npc("tomas", "Tomás", "refugio", true),
                npc("lucia", "Lucía", "refugio", true),
                npc("marco", "Marco", "hospital", true),
                npc("elena", "Elena", "hospital", true),
                npc("viejo_juan", "Viejo Juan", "mercado", false),
            ],
        }
    }
}

/// Outbreak map node; stocks are (resource, cap, regen) and start half full.
fn outbreak_node(
    id: &str,
    name: &str,
    region: &str,
    links: &[&str],
    stock: &[(&str, f64, f64)],
) -> Node {
    let mut node = Node::new(id, name, region);
    node.connections = links.iter().map(|l| NodeId::from(*l)).collect();
    for (resource, cap, regen) in stock {
        let stock = ResourceStock::new(*cap / 2.0, *cap, 0.0, *regen);
        node.resources.insert(resource.to_string(), stock);
    }
    node
}
