//! Security groups and ingress rules

use crate::error::{AwsError, Result};
use crate::name_tags;
use crate::vpc::Vpc;
use k3sflow_cloud::{Reference, Stack, digest_hex};
use serde_json::{Map, Value, json};
use std::fmt;

/// Source of inbound traffic
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    /// 0.0.0.0/0
    AnyIpv4,
    /// A literal or tokenized IPv4 CIDR
    Ipv4(String),
    /// Members of another security group
    SecurityGroupId(Reference),
}

impl Peer {
    pub fn ipv4(cidr: impl Into<String>) -> Self {
        Peer::Ipv4(cidr.into())
    }

    /// Traffic from the VPC's own address range
    pub fn vpc_cidr(vpc: &Vpc) -> Self {
        Peer::Ipv4(vpc.cidr_block().to_token_string())
    }

    pub fn security_group(group: &SecurityGroup) -> Self {
        Peer::SecurityGroupId(group.security_group_id())
    }

    fn is_security_group(&self) -> bool {
        matches!(self, Peer::SecurityGroupId(_))
    }

    fn fill(&self, rule: &mut Map<String, Value>) {
        match self {
            Peer::AnyIpv4 => {
                rule.insert("CidrIp".into(), json!("0.0.0.0/0"));
            }
            Peer::Ipv4(cidr) => {
                rule.insert("CidrIp".into(), json!(cidr));
            }
            Peer::SecurityGroupId(group) => {
                rule.insert("SourceSecurityGroupId".into(), group.into());
            }
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peer::AnyIpv4 => write!(f, "0.0.0.0/0"),
            Peer::Ipv4(cidr) => write!(f, "{}", cidr),
            Peer::SecurityGroupId(group) => write!(f, "{}", group),
        }
    }
}

/// Protocol and port range of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    Tcp(u16),
    TcpRange(u16, u16),
    Udp(u16),
    AllTraffic,
}

impl Port {
    fn fill(&self, rule: &mut Map<String, Value>) {
        let (protocol, range) = match *self {
            Port::Tcp(port) => ("tcp", Some((port, port))),
            Port::TcpRange(from, to) => ("tcp", Some((from, to))),
            Port::Udp(port) => ("udp", Some((port, port))),
            Port::AllTraffic => ("-1", None),
        };
        rule.insert("IpProtocol".into(), json!(protocol));
        if let Some((from, to)) = range {
            rule.insert("FromPort".into(), json!(from));
            rule.insert("ToPort".into(), json!(to));
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Tcp(port) => write!(f, "tcp {}", port),
            Port::TcpRange(from, to) => write!(f, "tcp {}-{}", from, to),
            Port::Udp(port) => write!(f, "udp {}", port),
            Port::AllTraffic => write!(f, "all traffic"),
        }
    }
}

/// One inbound rule as recorded on a group
#[derive(Debug, Clone, PartialEq)]
pub struct IngressRule {
    pub peer: Peer,
    pub port: Port,
    pub description: String,
}

impl IngressRule {
    fn to_json(&self) -> Map<String, Value> {
        let mut rule = Map::new();
        self.peer.fill(&mut rule);
        self.port.fill(&mut rule);
        rule.insert("Description".into(), json!(self.description));
        rule
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroupProps<'a> {
    pub vpc: &'a Vpc,
    pub description: String,
    pub allow_all_outbound: bool,
}

/// A security group declared in, or imported into, a stack
#[derive(Debug, Clone)]
pub struct SecurityGroup {
    id: String,
    /// None for groups imported by id
    logical_id: Option<String>,
    group_id: Reference,
    vpc_logical_id: Option<String>,
    rules: Vec<IngressRule>,
}

impl SecurityGroup {
    pub fn new(stack: &mut Stack, id: &str, props: SecurityGroupProps<'_>) -> Result<Self> {
        if props.description.is_empty() {
            return Err(AwsError::InvalidConfig(format!(
                "security group {} needs a description",
                id
            )));
        }

        let egress = if props.allow_all_outbound {
            json!([{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1",
            }])
        } else {
            // A rule matching nothing replaces the implicit allow-all
            json!([{
                "CidrIp": "255.255.255.255/32",
                "Description": "Disallow all traffic",
                "FromPort": 252,
                "IpProtocol": "icmp",
                "ToPort": 86,
            }])
        };

        let resource = stack
            .new_resource(&[id], "AWS::EC2::SecurityGroup")
            .with_property("GroupDescription", props.description)
            .with_property("SecurityGroupEgress", egress)
            .with_property("VpcId", props.vpc.vpc_id())
            .with_property("Tags", name_tags(&stack.path(&[id])));
        let logical_id = resource.logical_id.clone();
        let group_id = resource.attribute("GroupId");
        stack.add_resource(resource)?;

        Ok(Self {
            id: id.to_string(),
            logical_id: Some(logical_id),
            group_id,
            vpc_logical_id: Some(props.vpc.logical_id().to_string()),
            rules: Vec::new(),
        })
    }

    /// Reference a group owned by another stack; rules become standalone
    /// ingress resources in the importing stack
    pub fn from_id(id: &str, group_id: Reference) -> Self {
        Self {
            id: id.to_string(),
            logical_id: None,
            group_id,
            vpc_logical_id: None,
            rules: Vec::new(),
        }
    }

    pub fn security_group_id(&self) -> Reference {
        self.group_id.clone()
    }

    pub fn logical_id(&self) -> Option<&str> {
        self.logical_id.as_deref()
    }

    /// VPC of an owned group; imported groups report None
    pub fn vpc_logical_id(&self) -> Option<&str> {
        self.vpc_logical_id.as_deref()
    }

    pub fn is_imported(&self) -> bool {
        self.logical_id.is_none()
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    /// Allow inbound traffic from `peer` on `port`.
    ///
    /// CIDR rules on owned groups are written inline. Rules whose source is
    /// another group, and any rule on an imported group, become an
    /// `AWS::EC2::SecurityGroupIngress` in `stack`.
    pub fn add_ingress_rule(
        &mut self,
        stack: &mut Stack,
        peer: Peer,
        port: Port,
        description: impl Into<String>,
    ) -> Result<()> {
        let rule = IngressRule {
            peer,
            port,
            description: description.into(),
        };
        if self.rules.contains(&rule) {
            tracing::debug!(group = %self.id, peer = %rule.peer, port = %rule.port, "Duplicate ingress rule ignored");
            return Ok(());
        }

        match &self.logical_id {
            Some(logical_id) if !rule.peer.is_security_group() => {
                stack
                    .resource_mut(logical_id)?
                    .push_property("SecurityGroupIngress", Value::Object(rule.to_json()));
            }
            _ => {
                let key = format!("{}:{}", rule.peer, rule.port);
                let suffix = format!("from{}", digest_hex(key.as_bytes(), 4));
                let mut properties = rule.to_json();
                properties.insert("GroupId".into(), self.group_id.clone().into());
                let mut resource =
                    stack.new_resource(&[&self.id, &suffix], "AWS::EC2::SecurityGroupIngress");
                resource.properties = properties;
                stack.add_resource(resource)?;
            }
        }

        tracing::debug!(group = %self.id, peer = %rule.peer, port = %rule.port, "Added ingress rule");
        self.rules.push(rule);
        Ok(())
    }
}
