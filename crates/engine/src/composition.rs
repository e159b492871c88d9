//! Composition root.
//!
//! Everything the engine runs on is assembled here at the application
//! boundary: storage, the content library, port adapters and the command
//! registry, wired into a [`WorldService`]. Optional capabilities get their
//! null adapters when nothing real is configured, so no call site branches
//! on presence.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::RwLock;
use tracing::info;

use crate::adapters::{
    HttpNarrative, NullCombat, NullNarrative, NullNotifier, StaticRules, SystemClock,
};
use crate::commands::CommandRegistry;
use crate::config::AppConfig;
use crate::content::ContentLibrary;
use crate::persistence::Persistence;
use crate::ports::{NarrativePort, Ports};
use crate::service::WorldService;
use crate::state::WorldState;

/// Builds a fully wired service from configuration. The schema is applied
/// before anything else touches the pool.
pub async fn build(config: &AppConfig) -> Result<WorldService> {
    let persistence = Persistence::connect(&config.database_path)
        .await
        .context("opening the world database")?;
    persistence
        .ensure_schema()
        .await
        .context("applying the database schema")?;

    let content = Arc::new(
        ContentLibrary::load_from_dir(&config.content_dir)
            .with_context(|| format!("loading content from {}", config.content_dir))?,
    );

    let ports = build_ports(config, Arc::clone(&content));
    let registry = Arc::new(CommandRegistry::with_builtin_handlers());
    let state = Arc::new(RwLock::new(WorldState::new(content)));

    Ok(WorldService::new(state, ports, persistence, registry))
}

/// Port wiring: content-driven rules, configured narrative, null adapters
/// for the capabilities nothing provides yet.
fn build_ports(config: &AppConfig, content: Arc<ContentLibrary>) -> Ports {
    let narrative: Arc<dyn NarrativePort> = if config.narrative.enabled {
        info!(
            base_url = %config.narrative.base_url,
            model = %config.narrative.model,
            "Narrative generation enabled"
        );
        Arc::new(HttpNarrative::new(
            &config.narrative.base_url,
            &config.narrative.model,
        ))
    } else {
        Arc::new(NullNarrative)
    };

    Ports {
        rules: Arc::new(StaticRules::new(content)),
        narrative,
        notifier: Arc::new(NullNotifier),
        combat: Arc::new(NullCombat),
        clock: Arc::new(SystemClock),
    }
}
