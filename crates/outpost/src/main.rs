//! Outpost world server.
//!
//! Loads configuration, seeds the world, runs the tick scheduler until a
//! shutdown signal arrives, then stops it cleanly and optionally dumps a
//! snapshot of the final state.

mod cli;
mod config;
mod signals;

use anyhow::Context;
use cli::CliArgs;
use config::{AppConfig, LoggingSettings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use world_core::{create_world_with_config, BroadcastMessage, WorldCore, WorldSeed};

/// Initialize logging system
fn setup_logging(config: &LoggingSettings) -> anyhow::Result<()> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

pub struct Application {
    config: AppConfig,
    core: Arc<WorldCore>,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("loading {}", args.config_path.display()))?;
        apply_overrides(&mut config, &args);

        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

        setup_logging(&config.logging)?;
        display_banner();

        let core = create_world_with_config(config.world.clone())?;
        let seed = match &config.bootstrap.seed_file {
            Some(path) => {
                WorldSeed::load_file(path).with_context(|| format!("loading seed {}", path))?
            }
            None => WorldSeed::outbreak(),
        };
        let summary = core.seed(seed)?;
        info!(
            "🗺️ World seeded: {} nodes, {} regions, {} NPCs",
            summary.nodes, summary.regions, summary.npcs
        );
        info!("📂 Config: {}", args.config_path.display());

        Ok(Self {
            config,
            core: Arc::new(core),
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let world_config = self.core.get_config();
        let tick = &world_config.tick;
        info!("📋 Configuration Summary:");
        info!(
            "  ⏱️ Ticks: main {}ms | fast {}ms | slow {}ms",
            tick.main_interval_ms, tick.fast_interval_ms, tick.slow_interval_ms
        );
        info!(
            "  🤝 Social pass every {} main tick(s), chance {:.2}",
            tick.social_every, world_config.relationships.interaction_chance
        );
        for region in self.core.regions.regions() {
            let neighbours: Vec<String> = self
                .core
                .regions
                .adjacent_regions(&region.id)
                .iter()
                .map(ToString::to_string)
                .collect();
            info!(
                "  🗺️ {} ({} node(s), difficulty {}) borders [{}]",
                region.name,
                region.node_ids.len(),
                region.difficulty,
                neighbours.join(", ")
            );
        }

        if self.config.logging.trace_broadcasts {
            self.core.ticks.on_broadcast(log_broadcast);
        }

        if !self.core.start() {
            anyhow::bail!("tick scheduler did not start");
        }

        let monitoring_handle = {
            let core = self.core.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(60));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    let world = core.state.stats();
                    let ticks = core.ticks.stats();
                    info!(
                        "📊 World Health - {} online / {} players | {} living NPCs | {} events",
                        world.online_players, world.players, world.living_npcs, world.events
                    );
                    info!(
                        "⏱️ Scheduler - {} main ticks | {} step failures",
                        ticks.main_ticks, ticks.step_failures
                    );
                }
            })
        };

        info!("✅ Outpost world is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        match signals::wait_for_shutdown().await {
            Ok(()) => info!("🛑 Shutdown signal received, initiating graceful shutdown..."),
            Err(e) => error!("❌ Signal handling failed ({}), shutting down now", e),
        }

        monitoring_handle.abort();
        self.core.shutdown().await;

        let stats = self.core.ticks.stats();
        info!("📊 Final Statistics:");
        info!(
            "  - Ticks: {} main | {} fast | {} slow",
            stats.main_ticks, stats.fast_ticks, stats.slow_ticks
        );
        info!(
            "  - Step failures: {} | Skipped overlaps: {}",
            stats.step_failures, stats.skipped_overlaps
        );

        if let Some(path) = &self.config.bootstrap.snapshot_file {
            write_snapshot(&self.core, PathBuf::from(path)).await?;
        }

        info!("👋 Outpost world server stopped");
        Ok(())
    }
}

fn log_broadcast(message: &BroadcastMessage) {
    let target = message
        .node()
        .map_or_else(|| "direct".to_string(), ToString::to_string);
    match serde_json::to_string(message) {
        Ok(payload) => debug!("📣 [{}] {}", target, payload),
        Err(e) => error!("❌ Failed to encode broadcast {}: {}", message.kind(), e),
    }
}

fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(seed) = &args.seed_path {
        config.bootstrap.seed_file = Some(seed.to_string_lossy().to_string());
    }
    if let Some(snapshot) = &args.snapshot_path {
        config.bootstrap.snapshot_file = Some(snapshot.to_string_lossy().to_string());
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}

async fn write_snapshot(core: &WorldCore, path: PathBuf) -> anyhow::Result<()> {
    let snapshot = core.state.snapshot();
    let payload = serde_json::to_vec_pretty(&snapshot)?;
    tokio::fs::write(&path, payload)
        .await
        .with_context(|| format!("writing snapshot {}", path.display()))?;
    info!("💾 Snapshot written to {}", path.display());
    Ok(())
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("❌ Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }
}

fn display_banner() {
    let version = option_env!("CARGO_PKG_VERSION").unwrap_or("UNK");
    info!("╔══════════════════════════════════════════╗");
    info!("║            🧟 OUTPOST WORLD 🧟           ║");
    info!("║                 v{:<24}║", version);
    info!("╚══════════════════════════════════════════╝");
}
