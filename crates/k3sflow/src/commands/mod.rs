pub mod diff;
pub mod list;
pub mod synth;
pub mod validate;

use k3sflow_core::{ClusterAssets, ClusterConfig, load_cluster_config};
use std::path::{Path, PathBuf};

/// Loaded cluster description shared by the commands
pub struct Context {
    pub config: ClusterConfig,
    pub assets: ClusterAssets,
    /// Cluster file used, None when running on defaults
    pub source: Option<PathBuf>,
}

impl Context {
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let (config, source) = load_cluster_config(explicit)?;
        let assets = ClusterAssets::load(&config)?;
        Ok(Self {
            config,
            assets,
            source,
        })
    }

    pub fn source_label(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string())
    }
}
