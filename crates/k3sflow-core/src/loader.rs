//! Loading the cluster file and the payloads it points at

use crate::boot::{AGENT_TEMPLATE, CONTROL_PLANE_TEMPLATE, load_template};
use crate::error::{ClusterError, Result};
use crate::model::ClusterConfig;
use crate::parser::parse_cluster_file;
use k3sflow_config::{EnvOverrides, find_cluster_file};
use std::path::{Path, PathBuf};

/// Bundled SSH public key registered as the cluster key pair
pub const DEFAULT_PUBLIC_KEY: &str = include_str!("../assets/id_k3s.pub");

/// Text inputs of the topology: boot templates and the SSH public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssets {
    pub control_plane_template: String,
    pub agent_template: String,
    pub public_key: String,
}

impl ClusterAssets {
    pub fn bundled() -> Self {
        Self {
            control_plane_template: CONTROL_PLANE_TEMPLATE.to_string(),
            agent_template: AGENT_TEMPLATE.to_string(),
            public_key: DEFAULT_PUBLIC_KEY.to_string(),
        }
    }

    /// Bundled assets with the overrides named in `config`
    pub fn load(config: &ClusterConfig) -> Result<Self> {
        let public_key = match &config.ssh.public_key_file {
            Some(path) => std::fs::read_to_string(path).map_err(|e| ClusterError::IoError {
                path: path.clone(),
                message: e.to_string(),
            })?,
            None => DEFAULT_PUBLIC_KEY.to_string(),
        };
        Ok(Self {
            control_plane_template: load_template(
                config.boot.control_plane.as_deref(),
                CONTROL_PLANE_TEMPLATE,
            )?,
            agent_template: load_template(config.boot.agent.as_deref(), AGENT_TEMPLATE)?,
            public_key,
        })
    }
}

/// Read the cluster file (explicit path, else discovery) and apply
/// environment overrides. Returns the file used, if any.
pub fn load_cluster_config(explicit: Option<&Path>) -> Result<(ClusterConfig, Option<PathBuf>)> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_cluster_file()?,
    };

    let mut config = match &path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading cluster file");
            parse_cluster_file(path)?
        }
        None => ClusterConfig::default(),
    };
    config.apply_env(&EnvOverrides::from_env());
    Ok((config, path))
}
