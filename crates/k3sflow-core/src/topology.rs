//! k3s cluster topology
//!
//! Two stacks:
//!
//! - `K3SClusterStack`: VPC, security groups, key pair, IAM role, the
//!   control plane, agents and (by default) a load balancer in front of the
//!   control plane. Exports the control-plane instance id and security group.
//! - `K3SRulesStack`: imports the control-plane security group and opens the
//!   API port to members of that same group.

use crate::boot::{AgentBootParams, ControlPlaneBootParams, render_agent, render_control_plane};
use crate::error::{ClusterError, Result};
use crate::loader::ClusterAssets;
use crate::model::{ClusterConfig, Placement};
use k3sflow_cloud::{App, ExportRef, Output, Stack};
use k3sflow_cloud_aws::{
    AddTargetsProps, ApplicationLoadBalancer, ElasticIp, Instance, InstanceProps, InstanceTarget,
    KeyPair, KeyPairProps, LoadBalancerProps, MachineImage, Peer, Port, Role, RoleProps,
    SecurityGroup, SecurityGroupProps, SubnetType, UserData, Vpc, VpcProps,
};

pub const CLUSTER_STACK: &str = "K3SClusterStack";
pub const RULES_STACK: &str = "K3SRulesStack";

pub const EXPORT_CONTROL_PLANE_INSTANCE_ID: &str = "controlPlaneInstanceId";
pub const EXPORT_CONTROL_PLANE_SG_ID: &str = "sgControlPlaneId";
pub const EXPORT_CONTROL_PLANE_PUBLIC_IP: &str = "controlPlanePublicIp";

pub const CONTROL_PLANE_NAME: &str = "k3s-control-plane-01";
pub const TARGET_GROUP_NAME: &str = "k3s-control-plane-01-tg";
const LOAD_BALANCER_NAME: &str = "k3s-control-plane-lb";

const HTTP_PORT: u16 = 80;

/// Exports of the cluster stack that other stacks may import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterOutputs {
    pub control_plane_instance_id: ExportRef,
    pub control_plane_security_group_id: ExportRef,
    /// Only with public placement
    pub control_plane_public_ip: Option<ExportRef>,
}

/// Declare the network and compute stack
pub fn build_cluster_stack(
    config: &ClusterConfig,
    assets: &ClusterAssets,
) -> Result<(Stack, ClusterOutputs)> {
    let token = config
        .join_token
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or(ClusterError::MissingJoinToken)?;

    let mut stack = Stack::new(CLUSTER_STACK, config.target_environment()).with_description(
        format!("k3s cluster {}: network, security groups and nodes", config.name),
    );

    let vpc = Vpc::new(
        &mut stack,
        "k3s-vpc",
        VpcProps {
            cidr: config.network.cidr,
            max_azs: config.network.max_azs,
            nat_gateways: config.network.nat_gateways,
        },
    )?;

    let mut sg_control_plane = SecurityGroup::new(
        &mut stack,
        "k3s-security-group-cp",
        SecurityGroupProps {
            vpc: &vpc,
            description: "K3S Security Group for Control Plane".to_string(),
            allow_all_outbound: true,
        },
    )?;
    for (port, description) in [
        (80, "Allow HTTP inbound (IP v4)."),
        (443, "Allow HTTPS inbound (IP v4)."),
        (22, "Allow SSH inbound (IP v4)."),
    ] {
        sg_control_plane.add_ingress_rule(&mut stack, Peer::AnyIpv4, Port::Tcp(port), description)?;
    }

    let key_pair = KeyPair::new(
        &mut stack,
        "k3s-keypair",
        KeyPairProps {
            key_name: config.ssh.key_name.clone(),
            key_type: config.ssh.key_type,
            public_key_material: assets.public_key.clone(),
        },
    )?;

    let role = Role::new(
        &mut stack,
        "k3s-role",
        RoleProps {
            assumed_by: "ec2.amazonaws.com".to_string(),
            managed_policies: vec!["AmazonSSMManagedInstanceCore".to_string()],
        },
    )?;

    let control_plane_user_data = render_control_plane(
        &assets.control_plane_template,
        &ControlPlaneBootParams {
            token,
            api_port: config.api_port,
        },
    )?;
    let placement = config.control_plane.placement;
    let control_plane = Instance::new(
        &mut stack,
        CONTROL_PLANE_NAME,
        InstanceProps {
            vpc: &vpc,
            subnet_type: match placement {
                Placement::LoadBalancer => SubnetType::PrivateWithEgress,
                Placement::Public => SubnetType::Public,
            },
            security_group: &sg_control_plane,
            instance_type: config.control_plane.instance_type.clone(),
            machine_image: MachineImage::EcsOptimizedAmazonLinux2,
            key_name: Some(key_pair.key_name()),
            role: Some(&role),
            user_data: UserData::custom(control_plane_user_data),
            user_data_causes_replacement: true,
            detailed_monitoring: true,
            instance_name: Some(CONTROL_PLANE_NAME.to_string()),
        },
    )?;

    let control_plane_public_ip = match placement {
        Placement::LoadBalancer => {
            let lb = ApplicationLoadBalancer::new(
                &mut stack,
                LOAD_BALANCER_NAME,
                LoadBalancerProps {
                    vpc: &vpc,
                    internet_facing: true,
                    load_balancer_name: Some(LOAD_BALANCER_NAME.to_string()),
                    security_group: &sg_control_plane,
                },
            )?;
            let listener =
                lb.add_listener(&mut stack, "k3s-control-plane-lb-listener", HTTP_PORT)?;
            listener.add_targets(
                &mut stack,
                "k3s-control-plane-lb-listener-targets",
                AddTargetsProps {
                    port: HTTP_PORT,
                    target_group_name: Some(TARGET_GROUP_NAME.to_string()),
                    targets: vec![InstanceTarget::new(control_plane.instance_id(), HTTP_PORT)],
                },
            )?;
            stack.add_output(
                "loadBalancerDnsName",
                Output::new(lb.dns_name()).with_description("Control plane load balancer"),
            )?;
            None
        }
        Placement::Public => {
            let eip = ElasticIp::associate(
                &mut stack,
                &format!("{}-eip", CONTROL_PLANE_NAME),
                &control_plane,
            )?;
            stack.add_output(
                EXPORT_CONTROL_PLANE_PUBLIC_IP,
                Output::new(eip.public_ip())
                    .with_description("Control plane public address")
                    .with_export_name(EXPORT_CONTROL_PLANE_PUBLIC_IP),
            )?
        }
    };

    let control_plane_instance_id = stack
        .add_output(
            EXPORT_CONTROL_PLANE_INSTANCE_ID,
            Output::new(control_plane.instance_id()).with_export_name(EXPORT_CONTROL_PLANE_INSTANCE_ID),
        )?
        .ok_or_else(|| missing_export(EXPORT_CONTROL_PLANE_INSTANCE_ID))?;
    let control_plane_security_group_id = stack
        .add_output(
            EXPORT_CONTROL_PLANE_SG_ID,
            Output::new(sg_control_plane.security_group_id())
                .with_export_name(EXPORT_CONTROL_PLANE_SG_ID),
        )?
        .ok_or_else(|| missing_export(EXPORT_CONTROL_PLANE_SG_ID))?;

    let mut sg_agents = SecurityGroup::new(
        &mut stack,
        "k3s-security-group-agents",
        SecurityGroupProps {
            vpc: &vpc,
            description: "K3S Security Group for agents".to_string(),
            allow_all_outbound: true,
        },
    )?;
    sg_agents.add_ingress_rule(
        &mut stack,
        Peer::vpc_cidr(&vpc),
        Port::AllTraffic,
        "Allow an inbound from VPC (IP v4).",
    )?;

    let agent_user_data = render_agent(
        &assets.agent_template,
        &AgentBootParams::new(token, &control_plane, config.api_port),
    )?;
    for name in config.agent_names() {
        Instance::new(
            &mut stack,
            &name,
            InstanceProps {
                vpc: &vpc,
                subnet_type: SubnetType::PrivateWithEgress,
                security_group: &sg_agents,
                instance_type: config.agents.instance_type.clone(),
                machine_image: MachineImage::EcsOptimizedAmazonLinux2,
                key_name: Some(key_pair.key_name()),
                role: None,
                user_data: UserData::custom(agent_user_data.clone()),
                user_data_causes_replacement: true,
                detailed_monitoring: true,
                instance_name: Some(name.clone()),
            },
        )?;
    }

    sg_control_plane.add_ingress_rule(
        &mut stack,
        Peer::security_group(&sg_agents),
        Port::Tcp(config.api_port),
        "Allow k3s api inbound (IP v4).",
    )?;

    tracing::info!(
        cluster = %config.name,
        placement = %placement,
        agents = config.agents.count,
        "Declared cluster stack"
    );

    Ok((
        stack,
        ClusterOutputs {
            control_plane_instance_id,
            control_plane_security_group_id,
            control_plane_public_ip,
        },
    ))
}

/// Declare the cross-stack rule stack against the cluster stack's exports
pub fn build_rules_stack(config: &ClusterConfig, outputs: &ClusterOutputs) -> Result<Stack> {
    let mut stack = Stack::new(RULES_STACK, config.target_environment())
        .with_description("k3s cluster: cross-stack security group rules");
    stack.add_dependency(
        &outputs.control_plane_security_group_id.producer,
        "sg rules depends on base stack",
    );

    let group_id = stack.import_value(&outputs.control_plane_security_group_id);
    let mut sg_control_plane = SecurityGroup::from_id("sgControlPlane", group_id.clone());
    sg_control_plane.add_ingress_rule(
        &mut stack,
        Peer::SecurityGroupId(group_id),
        Port::Tcp(config.api_port),
        "Allow k3s api inbound (IP v4).",
    )?;

    tracing::info!(cluster = %config.name, "Declared rules stack");
    Ok(stack)
}

/// Both stacks, ready to synthesize
pub fn build_app(config: &ClusterConfig, assets: &ClusterAssets) -> Result<App> {
    let (cluster, outputs) = build_cluster_stack(config, assets)?;
    let rules = build_rules_stack(config, &outputs)?;

    let mut app = App::new();
    app.add_stack(cluster)?;
    app.add_stack(rules)?;
    Ok(app)
}

fn missing_export(name: &str) -> ClusterError {
    ClusterError::InvalidConfig(format!("output {} was declared without an export", name))
}
