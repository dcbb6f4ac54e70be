//! Cluster file (KDL) parser
//!
//! ```kdl
//! cluster "dev" {
//!     network { cidr "10.0.3.0/24"; nat-gateways 1; max-azs 2 }
//!     control-plane { instance-type "t3a.small"; placement "public" }
//!     agents { count 3; instance-type "t3a.micro" }
//!     ssh { key-name "k3s-keypair"; key-type "ed25519"; public-key-file "id.pub" }
//!     boot { control-plane "cp.sh"; agent "agent.sh" }
//!     api-port 6443
//!     join-token "..."
//!     environment { account "123456789012"; region "ap-northeast-1" }
//! }
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use crate::error::{ClusterError, Result};
use crate::model::ClusterConfig;
use k3sflow_cloud_aws::MAX_AZS;
use kdl::{KdlDocument, KdlNode};
use std::fs;
use std::path::{Path, PathBuf};

/// Parse a cluster file
pub fn parse_cluster_file<P: AsRef<Path>>(path: P) -> Result<ClusterConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| ClusterError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    parse_cluster_string(&content, path.parent())
}

/// Parse cluster file content
pub fn parse_cluster_string(content: &str, base_dir: Option<&Path>) -> Result<ClusterConfig> {
    let doc: KdlDocument = content.parse()?;
    let mut config = ClusterConfig::default();
    let mut found = false;

    for node in doc.nodes() {
        match node.name().value() {
            "cluster" => {
                if found {
                    return Err(ClusterError::InvalidConfig(
                        "only one cluster node is allowed".to_string(),
                    ));
                }
                found = true;
                if let Some(name) = first_string(node) {
                    config.name = name.to_string();
                }
                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        parse_cluster_child(child, &mut config, base_dir)?;
                    }
                }
            }
            other => {
                tracing::warn!(node = %other, "Ignoring unknown top-level node");
            }
        }
    }

    tracing::debug!(cluster = %config.name, "Parsed cluster file");
    Ok(config)
}

fn parse_cluster_child(
    node: &KdlNode,
    config: &mut ClusterConfig,
    base_dir: Option<&Path>,
) -> Result<()> {
    match node.name().value() {
        "network" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "cidr" => {
                        config.network.cidr = required_string(child)?.parse()?;
                    }
                    "nat-gateways" | "nat_gateways" => {
                        config.network.nat_gateways = bounded_count(child, MAX_AZS)?;
                    }
                    "max-azs" | "max_azs" => {
                        config.network.max_azs = bounded_count(child, MAX_AZS)?;
                    }
                    other => unknown(node, other),
                }
            }
        }
        "control-plane" | "control_plane" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "instance-type" | "instance_type" => {
                        config.control_plane.instance_type = required_string(child)?.parse()?;
                    }
                    "placement" => {
                        config.control_plane.placement = required_string(child)?
                            .parse()
                            .map_err(ClusterError::InvalidConfig)?;
                    }
                    other => unknown(node, other),
                }
            }
        }
        "agents" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "count" => {
                        config.agents.count = required_integer(child)?
                            .try_into()
                            .map_err(|_| invalid(child, "must not be negative"))?;
                    }
                    "instance-type" | "instance_type" => {
                        config.agents.instance_type = required_string(child)?.parse()?;
                    }
                    other => unknown(node, other),
                }
            }
        }
        "ssh" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "key-name" | "key_name" => {
                        config.ssh.key_name = required_string(child)?.to_string();
                    }
                    "key-type" | "key_type" => {
                        config.ssh.key_type = required_string(child)?.parse()?;
                    }
                    "public-key-file" | "public_key_file" => {
                        config.ssh.public_key_file =
                            Some(resolve_path(required_string(child)?, base_dir));
                    }
                    other => unknown(node, other),
                }
            }
        }
        "boot" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "control-plane" | "control_plane" => {
                        config.boot.control_plane =
                            Some(resolve_path(required_string(child)?, base_dir));
                    }
                    "agent" => {
                        config.boot.agent = Some(resolve_path(required_string(child)?, base_dir));
                    }
                    other => unknown(node, other),
                }
            }
        }
        "api-port" | "api_port" => {
            config.api_port = required_integer(node)?
                .try_into()
                .map_err(|_| invalid(node, "must be a port number"))?;
            if config.api_port == 0 {
                return Err(invalid(node, "must be a port number"));
            }
        }
        "join-token" | "join_token" => {
            let token = required_string(node)?.trim();
            if token.is_empty() {
                return Err(invalid(node, "must not be empty"));
            }
            config.join_token = Some(token.to_string());
        }
        "environment" => {
            for child in child_nodes(node) {
                match child.name().value() {
                    "account" => {
                        config.environment.account = Some(required_string(child)?.to_string());
                    }
                    "region" => {
                        config.environment.region = Some(required_string(child)?.to_string());
                    }
                    other => unknown(node, other),
                }
            }
        }
        other => {
            tracing::warn!(node = %other, "Ignoring unknown cluster setting");
        }
    }
    Ok(())
}

fn child_nodes(node: &KdlNode) -> impl Iterator<Item = &KdlNode> {
    node.children().into_iter().flat_map(|doc| doc.nodes())
}

fn first_string(node: &KdlNode) -> Option<&str> {
    node.entries().first().and_then(|e| e.value().as_string())
}

fn required_string(node: &KdlNode) -> Result<&str> {
    first_string(node).ok_or_else(|| invalid(node, "requires a string value"))
}

fn required_integer(node: &KdlNode) -> Result<i128> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_integer())
        .ok_or_else(|| invalid(node, "requires an integer value"))
}

/// Integer in `1..=max`
fn bounded_count(node: &KdlNode, max: usize) -> Result<usize> {
    match usize::try_from(required_integer(node)?) {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(invalid(node, &format!("must be between 1 and {}", max))),
    }
}

fn invalid(node: &KdlNode, message: &str) -> ClusterError {
    ClusterError::InvalidConfig(format!("{} {}", node.name().value(), message))
}

fn unknown(parent: &KdlNode, name: &str) {
    tracing::warn!(parent = %parent.name().value(), node = %name, "Ignoring unknown setting");
}

fn resolve_path(value: &str, base_dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(value);
    match base_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Placement;
    use k3sflow_cloud_aws::KeyType;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = parse_cluster_string("", None).unwrap();
        assert_eq!(config, ClusterConfig::default());
    }

    #[test]
    fn test_full_cluster_file() {
        let kdl = r#"
cluster "dev" {
    network {
        cidr "10.1.0.0/16"
        nat-gateways 2
        max-azs 3
    }
    control-plane {
        instance-type "t3a.small"
        placement "public"
    }
    agents {
        count 3
        instance-type "t3a.medium"
    }
    ssh {
        key-name "dev-key"
        key-type "rsa"
        public-key-file "keys/dev.pub"
    }
    boot {
        agent "/etc/k3sflow/agent.sh"
    }
    api-port 7443
    join-token "abc123"
    environment {
        account "123456789012"
        region "ap-northeast-1"
    }
}
"#;
        let config = parse_cluster_string(kdl, Some(Path::new("/work"))).unwrap();
        assert_eq!(config.name, "dev");
        assert_eq!(config.network.cidr.to_string(), "10.1.0.0/16");
        assert_eq!(config.network.nat_gateways, 2);
        assert_eq!(config.network.max_azs, 3);
        assert_eq!(config.control_plane.placement, Placement::Public);
        assert_eq!(config.agents.count, 3);
        assert_eq!(config.agents.instance_type.as_str(), "t3a.medium");
        assert_eq!(config.ssh.key_type, KeyType::Rsa);
        assert_eq!(
            config.ssh.public_key_file,
            Some(PathBuf::from("/work/keys/dev.pub"))
        );
        assert_eq!(config.boot.agent, Some(PathBuf::from("/etc/k3sflow/agent.sh")));
        assert_eq!(config.boot.control_plane, None);
        assert_eq!(config.api_port, 7443);
        assert_eq!(config.join_token.as_deref(), Some("abc123"));
        assert_eq!(config.environment.region.as_deref(), Some("ap-northeast-1"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_cluster_string("cluster { agents { count 0 } }", None).unwrap();
        assert_eq!(config.name, "k3s");
        assert_eq!(config.agents.count, 0);
        assert_eq!(config.network.cidr.to_string(), "10.0.3.0/24");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(parse_cluster_string(r#"cluster { network { cidr "10.0.3.1/24" } }"#, None).is_err());
        assert!(parse_cluster_string("cluster { network { nat-gateways 0 } }", None).is_err());
        assert!(parse_cluster_string(r#"cluster { control-plane { placement "nodeport" } }"#, None).is_err());
        assert!(parse_cluster_string("cluster { api-port 70000 }", None).is_err());
        assert!(parse_cluster_string("cluster {} cluster {}", None).is_err());
    }

    #[test]
    fn test_az_count_bounded() {
        for kdl in [
            "cluster { network { max-azs 9223372036854775808 } }",
            "cluster { network { max-azs 17 } }",
            "cluster { network { nat-gateways 100 } }",
        ] {
            assert!(
                matches!(parse_cluster_string(kdl, None), Err(ClusterError::InvalidConfig(_))),
                "{}",
                kdl
            );
        }
        let config = parse_cluster_string("cluster { network { max-azs 16 } }", None).unwrap();
        assert_eq!(config.network.max_azs, 16);
    }

    #[test]
    fn test_blank_join_token_rejected() {
        for kdl in [r#"cluster { join-token "" }"#, r#"cluster { join-token "   " }"#] {
            assert!(matches!(
                parse_cluster_string(kdl, None),
                Err(ClusterError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_kdl_syntax_error() {
        let result = parse_cluster_string("cluster {", None);
        assert!(matches!(result, Err(ClusterError::KdlParse(_))));
    }
}
