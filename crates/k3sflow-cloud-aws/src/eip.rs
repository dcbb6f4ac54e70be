//! Elastic IP addresses bound to instances

use crate::error::{AwsError, Result};
use crate::instance::Instance;
use crate::vpc::SubnetType;
use k3sflow_cloud::{Reference, Stack};

#[derive(Debug, Clone)]
pub struct ElasticIp {
    logical_id: String,
}

impl ElasticIp {
    /// Allocate an address and attach it to `instance`, which must sit in
    /// a public subnet
    pub fn associate(stack: &mut Stack, id: &str, instance: &Instance) -> Result<Self> {
        if instance.subnet_type() != SubnetType::Public {
            return Err(AwsError::InvalidConfig(format!(
                "Elastic IP {} needs an instance in a public subnet, {} is {}",
                id,
                instance.id(),
                instance.subnet_type()
            )));
        }
        let resource = stack
            .new_resource(&[id], "AWS::EC2::EIP")
            .with_property("Domain", "vpc")
            .with_property("InstanceId", instance.instance_id());
        let logical_id = resource.logical_id.clone();
        stack.add_resource(resource)?;
        Ok(Self { logical_id })
    }

    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// `Ref` of an EIP is the address itself
    pub fn public_ip(&self) -> Reference {
        Reference::to_ref(&self.logical_id)
    }

    pub fn allocation_id(&self) -> Reference {
        Reference::get_att(&self.logical_id, "AllocationId")
    }
}
