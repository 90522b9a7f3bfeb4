//! Wiring of the four core components into one explicitly owned handle.

use crate::bootstrap::{SeedSummary, WorldSeed};
use crate::config::WorldConfig;
use crate::error::WorldResult;
use crate::regions::RegionManager;
use crate::relationships::RelationshipEngine;
use crate::tick::TickEngine;
use crate::world::WorldState;
use std::sync::Arc;
use tracing::info;

/// Owns a world and its scheduler. Components are shared through `Arc` so
/// request handlers can hold them independently of the handle.
pub struct WorldCore {
    pub state: Arc<WorldState>,
    pub regions: Arc<RegionManager>,
    pub relationships: Arc<RelationshipEngine>,
    pub ticks: TickEngine,
    config: WorldConfig,
}

impl WorldCore {
    fn assemble(config: WorldConfig) -> Self {
        let state = Arc::new(WorldState::new(&config.state));
        let regions = RegionManager::new(state.clone());
        let relationships = Arc::new(RelationshipEngine::new(state.clone(), &config.relationships));
        let ticks = TickEngine::new(state.clone(), regions.clone(), relationships.clone(), &config);
        Self {
            state,
            regions,
            relationships,
            ticks,
            config,
        }
    }

    pub fn get_config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn seed(&self, seed: WorldSeed) -> WorldResult<SeedSummary> {
        seed.apply(&self.state, &self.regions)
    }

    /// Starts the scheduler. Must be called inside a tokio runtime.
    pub fn start(&self) -> bool {
        self.ticks.start()
    }

    /// Stops the scheduler and waits for its tasks to finish.
    pub async fn shutdown(&self) {
        if self.ticks.stop() {
            self.ticks.join().await;
            info!("🧹 World core stopped after {} main tick(s)", self.ticks.stats().main_ticks);
        }
    }
}

/// A world with default settings and no content.
pub fn create_world() -> WorldCore {
    WorldCore::assemble(WorldConfig::default())
}

/// A world with validated custom settings.
pub fn create_world_with_config(config: WorldConfig) -> WorldResult<WorldCore> {
    config.validate()?;
    Ok(WorldCore::assemble(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = WorldConfig::default();
        config.tick.main_interval_ms = 0;
        assert!(create_world_with_config(config).is_err());
    }

    #[tokio::test]
    async fn test_seed_start_shutdown() {
        let core = create_world();
        let summary = core.seed(WorldSeed::outbreak()).unwrap();
        assert_eq!(summary.nodes, core.state.node_ids().len());

        assert!(core.start());
        core.shutdown().await;
        assert!(!core.ticks.is_running());
    }
}
