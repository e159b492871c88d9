//! Application configuration

use std::env;

use anyhow::{Context, Result};

/// Application configuration loaded from environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database path
    pub database_path: String,
    /// Directory holding JSON content files (templates, slots, durations)
    pub content_dir: String,
    /// Tick loop configuration
    pub tick: TickConfig,
    /// Narrative generation configuration
    pub narrative: NarrativeConfig,
}

/// Tick loop configuration
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Real seconds between tick passes
    pub interval_seconds: f64,
    /// World-seconds advanced per real second
    pub time_scale: f64,
    /// World-seconds of accumulated tick time between periodic saves
    pub save_interval: f64,
}

/// Narrative adapter configuration (OpenAI-compatible endpoint)
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    /// When false the null adapter is wired and no HTTP calls happen
    pub enabled: bool,
    pub base_url: String,
    pub model: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: env::var("WAYFARER_DATABASE_PATH")
                .unwrap_or_else(|_| "./data/wayfarer.db".to_string()),
            content_dir: env::var("WAYFARER_CONTENT_DIR")
                .unwrap_or_else(|_| "./content".to_string()),

            tick: TickConfig {
                interval_seconds: env::var("TICK_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .context("TICK_INTERVAL_SECONDS must be a number")?,
                time_scale: env::var("TICK_TIME_SCALE")
                    .unwrap_or_else(|_| "1.0".to_string())
                    .parse()
                    .unwrap_or(1.0),
                save_interval: env::var("SAVE_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300.0),
            },

            narrative: NarrativeConfig {
                enabled: env::var("NARRATIVE_ENABLED")
                    .unwrap_or_else(|_| "false".to_string())
                    .parse()
                    .unwrap_or(false),
                base_url: env::var("NARRATIVE_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434/v1".to_string()),
                model: env::var("NARRATIVE_MODEL").unwrap_or_else(|_| "llama3.1".to_string()),
            },
        })
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 10.0,
            time_scale: 1.0,
            save_interval: 300.0,
        }
    }
}
