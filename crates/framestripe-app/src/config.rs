use std::path::Path;

use anyhow::{Context, Result};
use framestripe_capture::SyntheticSourceConfig;
use framestripe_core::ComposerConfig;
use serde::{Deserialize, Serialize};
use tracing::info;

pub const CONFIG_ENV: &str = "FRAMESTRIPE_CONFIG";
pub const CONSUMERS_ENV: &str = "FRAMESTRIPE_CONSUMERS";
pub const RUN_SECONDS_ENV: &str = "FRAMESTRIPE_RUN_SECONDS";

const MAX_CONSUMERS: usize = 16;

/// Demo host configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub composer: ComposerConfig,
    pub source: SyntheticSourceConfig,
    /// Consumer workers pulling stripes, each counted as one viewer.
    pub consumers: usize,
    /// Stop after this many seconds; `None` runs until Ctrl-C.
    #[serde(alias = "runSeconds")]
    pub run_seconds: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            composer: ComposerConfig::default(),
            source: SyntheticSourceConfig::default(),
            consumers: 2,
            run_seconds: None,
        }
    }
}

impl AppConfig {
    /// Load from `$FRAMESTRIPE_CONFIG` (JSON) if set, then apply the
    /// single-field environment overrides.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(
            std::env::var(CONSUMERS_ENV).ok().as_deref(),
            std::env::var(RUN_SECONDS_ENV).ok().as_deref(),
        );
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("Parsing config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Unparseable values are ignored; the consumer count is clamped to
    /// `1..=16`.
    pub fn apply_overrides(&mut self, consumers: Option<&str>, run_seconds: Option<&str>) {
        if let Some(n) = consumers.and_then(|s| s.trim().parse::<usize>().ok()) {
            self.consumers = n;
        }
        if let Some(secs) = run_seconds.and_then(|s| s.trim().parse::<u64>().ok()) {
            self.run_seconds = Some(secs);
        }
        self.consumers = self.consumers.clamp(1, MAX_CONSUMERS);
    }
}
