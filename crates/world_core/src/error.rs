//! Error types for the world core.
//!
//! Queries and mutations on live state never fail: unknown ids degrade to
//! `None`/`false`. These errors only cover bootstrap, configuration and the
//! scheduler's per-step failure reporting.

use crate::types::{NodeId, NpcId, RegionId};
use thiserror::Error;

/// Errors raised while building or configuring a world.
#[derive(Debug, Error)]
pub enum WorldError {
    #[error("Region {0} already exists")]
    DuplicateRegion(RegionId),

    #[error("Node {0} is listed twice")]
    DuplicateNode(NodeId),

    #[error("Node {node} already belongs to region {existing}, cannot add it to {requested}")]
    RegionConflict {
        node: NodeId,
        existing: RegionId,
        requested: RegionId,
    },

    #[error("Unknown region {0}")]
    UnknownRegion(RegionId),

    #[error("Node {node} references unknown node {target}")]
    UnknownNode { node: NodeId, target: NodeId },

    #[error("Region {region} lists unknown node {node}")]
    RegionNodeMissing { region: RegionId, node: NodeId },

    #[error("NPC {npc} placed on unknown node {node}")]
    MisplacedNpc { npc: NpcId, node: NodeId },

    #[error("Unknown crisis type: {0}")]
    UnknownCrisis(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse seed (toml): {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse seed (json): {0}")]
    Json(#[from] serde_json::Error),
}

/// A failure inside one scheduler sub-step. Always logged and swallowed.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("Combat resolver failed: {0}")]
    Resolver(String),

    #[error("Step {step} panicked: {message}")]
    Panicked { step: &'static str, message: String },

    #[error("{0} entity update(s) failed")]
    Partial(usize),
}

pub type WorldResult<T> = Result<T, WorldError>;
pub type TickResult<T> = Result<T, TickError>;
