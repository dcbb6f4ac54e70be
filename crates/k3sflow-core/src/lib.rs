//! k3sflow core
//!
//! Turns a cluster description (`cluster.kdl`, environment, defaults) into the
//! two-stack k3s topology.

pub mod boot;
pub mod error;
pub mod loader;
pub mod model;
pub mod parser;
pub mod topology;

pub use boot::{
    AGENT_TEMPLATE, AgentBootParams, CONTROL_PLANE_TEMPLATE, ControlPlaneBootParams, render_agent,
    render_control_plane,
};
pub use error::{ClusterError, Result};
pub use loader::{ClusterAssets, DEFAULT_PUBLIC_KEY, load_cluster_config};
pub use model::*;
pub use parser::{parse_cluster_file, parse_cluster_string};
pub use topology::{
    CLUSTER_STACK, ClusterOutputs, RULES_STACK, build_app, build_cluster_stack, build_rules_stack,
};
