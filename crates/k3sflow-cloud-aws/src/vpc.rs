//! VPC with public and private subnets and NAT egress

use crate::cidr::Ipv4Cidr;
use crate::error::{AwsError, Result};
use crate::name_tags;
use k3sflow_cloud::token::{fn_get_azs, fn_select};
use k3sflow_cloud::{Reference, Stack};
use serde_json::{Value, json};
use std::fmt;

/// Placement class of a subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubnetType {
    /// Routed through the internet gateway; instances get public addresses
    Public,
    /// Egress through a NAT gateway only
    PrivateWithEgress,
}

impl SubnetType {
    fn label(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateWithEgress => "Private",
        }
    }
}

impl fmt::Display for SubnetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubnetType::Public => write!(f, "public"),
            SubnetType::PrivateWithEgress => write!(f, "private-with-egress"),
        }
    }
}

/// Most availability zones a VPC spreads its subnets over
pub const MAX_AZS: usize = 16;

/// VPC settings
#[derive(Debug, Clone)]
pub struct VpcProps {
    pub cidr: Ipv4Cidr,
    pub max_azs: usize,
    pub nat_gateways: usize,
}

impl VpcProps {
    /// Two AZs with a single shared NAT gateway
    pub fn new(cidr: Ipv4Cidr) -> Self {
        Self {
            cidr,
            max_azs: 2,
            nat_gateways: 1,
        }
    }
}

/// One declared subnet
#[derive(Debug, Clone)]
pub struct Subnet {
    pub logical_id: String,
    pub subnet_type: SubnetType,
    pub cidr: Ipv4Cidr,
    pub az_index: usize,
    pub route_table_id: String,
    pub association_id: String,
    pub default_route_id: String,
}

impl Subnet {
    pub fn subnet_id(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    /// `Fn::Select` of this subnet's availability zone
    pub fn availability_zone(&self) -> Value {
        fn_select(self.az_index, fn_get_azs())
    }
}

/// A declared VPC and its subnets
#[derive(Debug, Clone)]
pub struct Vpc {
    logical_id: String,
    cidr: Ipv4Cidr,
    public_subnets: Vec<Subnet>,
    private_subnets: Vec<Subnet>,
    internet_gateway_id: String,
    nat_gateway_ids: Vec<String>,
}

impl Vpc {
    /// Declare the VPC, one public and one private subnet per AZ, an
    /// internet gateway and `nat_gateways` NAT gateways in the first
    /// public subnets
    pub fn new(stack: &mut Stack, id: &str, props: VpcProps) -> Result<Self> {
        if props.max_azs == 0 || props.max_azs > MAX_AZS {
            return Err(AwsError::InvalidConfig(format!(
                "max_azs must be between 1 and {} (got {})",
                MAX_AZS, props.max_azs
            )));
        }
        if props.nat_gateways == 0 || props.nat_gateways > props.max_azs {
            return Err(AwsError::InvalidConfig(format!(
                "nat_gateways must be between 1 and {} (got {})",
                props.max_azs, props.nat_gateways
            )));
        }

        let subnet_count = props.max_azs.checked_mul(2).ok_or_else(|| {
            AwsError::InvalidConfig(format!("max_azs {} is out of range", props.max_azs))
        })?;
        let blocks = props.cidr.split(subnet_count)?;
        let (public_blocks, private_blocks) = blocks.split_at(props.max_azs);

        let vpc = stack
            .new_resource(&[id], "AWS::EC2::VPC")
            .with_property("CidrBlock", props.cidr.to_string())
            .with_property("EnableDnsHostnames", true)
            .with_property("EnableDnsSupport", true)
            .with_property("InstanceTenancy", "default")
            .with_property("Tags", name_tags(&stack.path(&[id])));
        let logical_id = vpc.logical_id.clone();
        let vpc_ref = stack.add_resource(vpc)?;

        let igw = stack
            .new_resource(&[id, "IGW"], "AWS::EC2::InternetGateway")
            .with_property("Tags", name_tags(&stack.path(&[id])));
        let internet_gateway_id = igw.logical_id.clone();
        let igw_ref = stack.add_resource(igw)?;

        let attachment = stack
            .new_resource(&[id, "VPCGW"], "AWS::EC2::VPCGatewayAttachment")
            .with_property("InternetGatewayId", igw_ref)
            .with_property("VpcId", vpc_ref.clone());
        let attachment_id = attachment.logical_id.clone();
        stack.add_resource(attachment)?;

        let mut this = Self {
            logical_id,
            cidr: props.cidr,
            public_subnets: Vec::new(),
            private_subnets: Vec::new(),
            internet_gateway_id,
            nat_gateway_ids: Vec::new(),
        };

        for (i, block) in public_blocks.iter().enumerate() {
            let subnet = this.declare_subnet(stack, id, SubnetType::Public, i, *block)?;
            let route = stack
                .new_resource(
                    &[id, &subnet_name(SubnetType::Public, i), "DefaultRoute"],
                    "AWS::EC2::Route",
                )
                .with_property("DestinationCidrBlock", "0.0.0.0/0")
                .with_property("GatewayId", Reference::to_ref(&this.internet_gateway_id))
                .with_property("RouteTableId", Reference::to_ref(&subnet.route_table_id))
                .depends_on(attachment_id.clone());
            stack.add_resource(route)?;
            this.public_subnets.push(subnet);
        }

        for i in 0..props.nat_gateways {
            let subnet = &this.public_subnets[i];
            let name = subnet_name(SubnetType::Public, i);
            let eip = stack
                .new_resource(&[id, &name, "EIP"], "AWS::EC2::EIP")
                .with_property("Domain", "vpc")
                .with_property("Tags", name_tags(&stack.path(&[id, &name])));
            let eip_ref = eip.attribute("AllocationId");
            stack.add_resource(eip)?;

            let nat = stack
                .new_resource(&[id, &name, "NATGateway"], "AWS::EC2::NatGateway")
                .with_property("AllocationId", eip_ref)
                .with_property("SubnetId", subnet.subnet_id())
                .with_property("Tags", name_tags(&stack.path(&[id, &name])))
                .depends_on(subnet.default_route_id.clone())
                .depends_on(subnet.association_id.clone());
            let nat_id = nat.logical_id.clone();
            stack.add_resource(nat)?;
            this.nat_gateway_ids.push(nat_id);
        }

        for (i, block) in private_blocks.iter().enumerate() {
            let subnet =
                this.declare_subnet(stack, id, SubnetType::PrivateWithEgress, i, *block)?;
            let nat_id = &this.nat_gateway_ids[i % this.nat_gateway_ids.len()];
            let route = stack
                .new_resource(
                    &[id, &subnet_name(SubnetType::PrivateWithEgress, i), "DefaultRoute"],
                    "AWS::EC2::Route",
                )
                .with_property("DestinationCidrBlock", "0.0.0.0/0")
                .with_property("NatGatewayId", Reference::to_ref(nat_id))
                .with_property("RouteTableId", Reference::to_ref(&subnet.route_table_id));
            stack.add_resource(route)?;
            this.private_subnets.push(subnet);
        }

        tracing::debug!(
            vpc = %this.logical_id,
            cidr = %this.cidr,
            azs = props.max_azs,
            nat_gateways = props.nat_gateways,
            "Declared VPC"
        );
        Ok(this)
    }

    fn declare_subnet(
        &self,
        stack: &mut Stack,
        id: &str,
        subnet_type: SubnetType,
        index: usize,
        cidr: Ipv4Cidr,
    ) -> Result<Subnet> {
        let name = subnet_name(subnet_type, index);
        let path = stack.path(&[id, &name]);

        let resource = stack
            .new_resource(&[id, &name, "Subnet"], "AWS::EC2::Subnet")
            .with_property("AvailabilityZone", fn_select(index, fn_get_azs()))
            .with_property("CidrBlock", cidr.to_string())
            .with_property("MapPublicIpOnLaunch", subnet_type == SubnetType::Public)
            .with_property("VpcId", self.vpc_id())
            .with_property(
                "Tags",
                json!([
                    { "Key": "Name", "Value": path },
                    { "Key": "k3sflow:subnet-type", "Value": subnet_type.label() },
                ]),
            );
        let logical_id = resource.logical_id.clone();
        let subnet_ref = stack.add_resource(resource)?;

        let route_table = stack
            .new_resource(&[id, &name, "RouteTable"], "AWS::EC2::RouteTable")
            .with_property("VpcId", self.vpc_id())
            .with_property("Tags", name_tags(&path));
        let route_table_id = route_table.logical_id.clone();
        let route_table_ref = stack.add_resource(route_table)?;

        let association = stack
            .new_resource(
                &[id, &name, "RouteTableAssociation"],
                "AWS::EC2::SubnetRouteTableAssociation",
            )
            .with_property("RouteTableId", route_table_ref)
            .with_property("SubnetId", subnet_ref);
        let association_id = association.logical_id.clone();
        stack.add_resource(association)?;

        Ok(Subnet {
            logical_id,
            subnet_type,
            cidr,
            az_index: index,
            default_route_id: stack.logical_id(&[id, &name, "DefaultRoute"]),
            route_table_id,
            association_id,
        })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn vpc_id(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    /// The VPC's CIDR as resolved by the engine
    pub fn cidr_block(&self) -> Reference {
        Reference::get_att(&self.logical_id, "CidrBlock")
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn subnets(&self, subnet_type: SubnetType) -> &[Subnet] {
        match subnet_type {
            SubnetType::Public => &self.public_subnets,
            SubnetType::PrivateWithEgress => &self.private_subnets,
        }
    }

    /// First subnet of a type
    pub fn select_subnet(&self, subnet_type: SubnetType) -> Result<&Subnet> {
        self.subnets(subnet_type)
            .first()
            .ok_or_else(|| AwsError::NoSubnets {
                vpc: self.logical_id.clone(),
                subnet_type: subnet_type.to_string(),
            })
    }

    /// Whether a subnet logical id belongs to this VPC
    pub fn owns_subnet(&self, subnet_logical_id: &str) -> bool {
        self.public_subnets
            .iter()
            .chain(&self.private_subnets)
            .any(|s| s.logical_id == subnet_logical_id)
    }

    pub fn nat_gateway_ids(&self) -> &[String] {
        &self.nat_gateway_ids
    }
}

fn subnet_name(subnet_type: SubnetType, index: usize) -> String {
    format!("{}Subnet{}", subnet_type.label(), index + 1)
}
