//! IPv4 CIDR blocks and subnet carving

use crate::error::{AwsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Smallest subnet AWS accepts
const MIN_SUBNET_PREFIX: u8 = 28;

/// IPv4 network with CIDR notation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(AwsError::InvalidCidr(
                "IPv4 prefix length must be <= 32".into(),
            ));
        }
        let cidr = Self {
            address,
            prefix_len,
        };
        if u32::from(address) & !cidr.mask() != 0 {
            return Err(AwsError::InvalidCidr(format!(
                "{}/{} has host bits set",
                address, prefix_len
            )));
        }
        Ok(cidr)
    }

    /// Network containing `address`, host bits cleared
    pub fn masked(address: Ipv4Addr, prefix_len: u8) -> Self {
        let mut cidr = Self {
            address,
            prefix_len: prefix_len.min(32),
        };
        cidr.address = Ipv4Addr::from(u32::from(address) & cidr.mask());
        cidr
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn mask(&self) -> u32 {
        if self.prefix_len == 0 {
            0
        } else {
            u32::MAX << (32 - self.prefix_len)
        }
    }

    /// Number of addresses in the block
    pub fn size(&self) -> u64 {
        1u64 << (32 - self.prefix_len)
    }

    pub fn contains(&self, other: &Ipv4Cidr) -> bool {
        other.prefix_len >= self.prefix_len
            && u32::from(other.address) & self.mask() == u32::from(self.address)
    }

    /// Carve the block into `count` equally sized, consecutive subnets
    pub fn split(&self, count: usize) -> Result<Vec<Ipv4Cidr>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let too_small = || AwsError::SubnetTooSmall {
            cidr: self.to_string(),
            count,
        };
        let bits = count
            .checked_next_power_of_two()
            .ok_or_else(too_small)?
            .trailing_zeros() as u8;
        let new_prefix = self.prefix_len + bits;
        if new_prefix > MIN_SUBNET_PREFIX {
            return Err(too_small());
        }
        let step = 1u64 << (32 - new_prefix);
        let base = u64::from(u32::from(self.address));
        (0..count as u64)
            .map(|i| Ipv4Cidr::new(Ipv4Addr::from((base + i * step) as u32), new_prefix))
            .collect()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = AwsError;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix_len) = s
            .split_once('/')
            .ok_or_else(|| AwsError::InvalidCidr(format!("Invalid CIDR notation: {}", s)))?;

        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|e| AwsError::InvalidCidr(format!("Invalid IPv4 address: {}", e)))?;

        let prefix_len = prefix_len
            .parse::<u8>()
            .map_err(|e| AwsError::InvalidCidr(format!("Invalid prefix length: {}", e)))?;

        Self::new(address, prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let net: Ipv4Cidr = "10.0.3.0/24".parse().unwrap();
        assert_eq!(net.prefix_len(), 24);
        assert_eq!(net.to_string(), "10.0.3.0/24");
        assert_eq!(net.size(), 256);
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("10.0.3.0".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.3.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.300.0/24".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.3.7/24".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn test_masked_clears_host_bits() {
        let net = Ipv4Cidr::masked(Ipv4Addr::new(10, 0, 3, 77), 24);
        assert_eq!(net.to_string(), "10.0.3.0/24");
    }

    #[test]
    fn test_split_into_four() {
        let net: Ipv4Cidr = "10.0.3.0/24".parse().unwrap();
        let parts: Vec<String> = net.split(4).unwrap().iter().map(|c| c.to_string()).collect();
        assert_eq!(
            parts,
            vec!["10.0.3.0/26", "10.0.3.64/26", "10.0.3.128/26", "10.0.3.192/26"]
        );
    }

    #[test]
    fn test_split_rounds_up_to_power_of_two() {
        let net: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let parts = net.split(6).unwrap();
        assert_eq!(parts.len(), 6);
        assert!(parts.iter().all(|p| p.prefix_len() == 19 && net.contains(p)));
    }

    #[test]
    fn test_split_too_small() {
        let net: Ipv4Cidr = "10.0.3.0/27".parse().unwrap();
        assert!(matches!(
            net.split(4),
            Err(AwsError::SubnetTooSmall { .. })
        ));
        assert!(matches!(
            net.split(usize::MAX),
            Err(AwsError::SubnetTooSmall { .. })
        ));
    }
}
