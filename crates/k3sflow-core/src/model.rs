//! Cluster configuration model

use k3sflow_cloud::Environment;
use k3sflow_cloud_aws::{InstanceType, Ipv4Cidr, KeyType};
use k3sflow_config::EnvOverrides;
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;

/// Default k3s API port
pub const DEFAULT_API_PORT: u16 = 6443;

/// How the control plane is reached from outside the VPC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// Private subnet behind an internet-facing application load balancer
    #[default]
    LoadBalancer,
    /// Public subnet with an Elastic IP
    Public,
}

impl FromStr for Placement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "load-balancer" | "load_balancer" | "lb" => Ok(Placement::LoadBalancer),
            "public" => Ok(Placement::Public),
            other => Err(format!(
                "Unknown placement: {} (expected load-balancer or public)",
                other
            )),
        }
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::LoadBalancer => write!(f, "load-balancer"),
            Placement::Public => write!(f, "public"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub cidr: Ipv4Cidr,
    pub nat_gateways: usize,
    pub max_azs: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: Ipv4Cidr::masked(Ipv4Addr::new(10, 0, 3, 0), 24),
            nat_gateways: 1,
            max_azs: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ControlPlaneConfig {
    pub instance_type: InstanceType,
    pub placement: Placement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentsConfig {
    pub count: usize,
    pub instance_type: InstanceType,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            count: 2,
            instance_type: InstanceType::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SshConfig {
    pub key_name: String,
    pub key_type: KeyType,
    /// Public key file; the bundled key is used when unset
    pub public_key_file: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            key_name: "k3s-keypair".to_string(),
            key_type: KeyType::Ed25519,
            public_key_file: None,
        }
    }
}

/// Boot payload template overrides
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BootConfig {
    pub control_plane: Option<PathBuf>,
    pub agent: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentConfig {
    pub account: Option<String>,
    pub region: Option<String>,
}

/// Everything needed to declare the cluster topology
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterConfig {
    pub name: String,
    pub network: NetworkConfig,
    pub control_plane: ControlPlaneConfig,
    pub agents: AgentsConfig,
    pub ssh: SshConfig,
    pub boot: BootConfig,
    pub api_port: u16,
    pub environment: EnvironmentConfig,
    pub join_token: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "k3s".to_string(),
            network: NetworkConfig::default(),
            control_plane: ControlPlaneConfig::default(),
            agents: AgentsConfig::default(),
            ssh: SshConfig::default(),
            boot: BootConfig::default(),
            api_port: DEFAULT_API_PORT,
            environment: EnvironmentConfig::default(),
            join_token: None,
        }
    }
}

impl ClusterConfig {
    /// Environment variables take precedence over the cluster file
    pub fn apply_env(&mut self, env: &EnvOverrides) {
        if let Some(account) = &env.account {
            self.environment.account = Some(account.clone());
        }
        if let Some(region) = &env.region {
            self.environment.region = Some(region.clone());
        }
        if let Some(token) = &env.join_token {
            self.join_token = Some(token.clone());
        }
    }

    pub fn target_environment(&self) -> Environment {
        Environment::new(
            self.environment.account.clone(),
            self.environment.region.clone(),
        )
    }

    /// Instance names: `k3s-agent-01`, `k3s-agent-02`, ...
    pub fn agent_names(&self) -> Vec<String> {
        (1..=self.agents.count)
            .map(|i| format!("k3s-agent-{:02}", i))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClusterConfig::default();
        assert_eq!(config.network.cidr.to_string(), "10.0.3.0/24");
        assert_eq!(config.network.nat_gateways, 1);
        assert_eq!(config.control_plane.instance_type.as_str(), "t3a.micro");
        assert_eq!(config.control_plane.placement, Placement::LoadBalancer);
        assert_eq!(config.api_port, 6443);
        assert_eq!(config.agent_names(), vec!["k3s-agent-01", "k3s-agent-02"]);
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = ClusterConfig {
            join_token: Some("from-file".into()),
            ..Default::default()
        };
        config.apply_env(&EnvOverrides {
            account: Some("123456789012".into()),
            region: None,
            join_token: Some("from-env".into()),
        });
        assert_eq!(config.join_token.as_deref(), Some("from-env"));
        assert_eq!(
            config.target_environment().to_string(),
            "aws://123456789012/unknown-region"
        );
    }

    #[test]
    fn test_placement_parse() {
        assert_eq!("public".parse::<Placement>().unwrap(), Placement::Public);
        assert_eq!(
            "load-balancer".parse::<Placement>().unwrap(),
            Placement::LoadBalancer
        );
        assert!("nodeport".parse::<Placement>().is_err());
    }
}
