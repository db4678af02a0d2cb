//! The shared isolated network.
//!
//! The network is built once and then only read. Attachments to external
//! services are owned by the path that needs them: the network hands out the
//! endpoint descriptors, and the graph's unique logical ids guarantee at most
//! one attachment per service.

use std::net::Ipv4Addr;
use tracing::info;
use vpce_aws::{
    AwsService, EndpointPlacement, IngressRule, RouteTable, SecurityGroup, Subnet,
    SubnetRouteTableAssociation, Vpc, VpcEndpoint,
};
use vpce_core::{Graph, ResourceId};

use crate::config::NetworkConfig;
use crate::error::{Result, TopologyError};

const MAX_AZS: usize = 6;

/// IPv4 block in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    pub addr: Ipv4Addr,
    pub prefix: u8,
}

impl Cidr {
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || TopologyError::validation(format!("'{s}' is not an IPv4 CIDR block"));
        let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid())?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid())?;
        if prefix > 32 {
            return Err(invalid());
        }
        let cidr = Self { addr, prefix };
        if u32::from(addr) & cidr.mask() != u32::from(addr) {
            return Err(TopologyError::validation(format!("'{s}' has host bits set")));
        }
        Ok(cidr)
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 { 0 } else { u32::MAX << (32 - self.prefix) }
    }

    /// The `index`-th block of length `prefix` inside this one.
    pub fn subdivide(&self, prefix: u8, index: usize) -> Option<Cidr> {
        if prefix < self.prefix || prefix > 32 {
            return None;
        }
        let count = 1u64 << (prefix - self.prefix);
        if index as u64 >= count {
            return None;
        }
        let step = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.addr)) + step * index as u64;
        Some(Cidr { addr: Ipv4Addr::from(base as u32), prefix })
    }
}

impl std::fmt::Display for Cidr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsolatedSubnet {
    pub subnet: ResourceId,
    pub route_table: ResourceId,
    pub cidr: Cidr,
    pub az_index: usize,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: ResourceId,
    pub name: String,
    pub cidr: Cidr,
    pub subnets: Vec<IsolatedSubnet>,
}

impl Network {
    /// Adds the VPC and one isolated subnet tier (subnet, route table,
    /// association per zone). No route is ever added to those tables.
    pub fn build(graph: &mut Graph, cfg: &NetworkConfig) -> Result<Self> {
        let cidr = Cidr::parse(&cfg.cidr)?;
        if !(16..=28).contains(&cidr.prefix) {
            return Err(TopologyError::validation(format!("VPC prefix /{} outside /16../28", cidr.prefix)));
        }
        if cfg.cidr_mask <= cidr.prefix || cfg.cidr_mask > 28 {
            return Err(TopologyError::validation(format!(
                "subnet mask /{} must be longer than /{} and at most /28", cfg.cidr_mask, cidr.prefix
            )));
        }
        if cfg.max_azs == 0 || cfg.max_azs > MAX_AZS {
            return Err(TopologyError::validation(format!("max_azs {} outside 1..={MAX_AZS}", cfg.max_azs)));
        }
        if cfg.name.is_empty() {
            return Err(TopologyError::missing_input("network name"));
        }

        let vpc = graph.add(Vpc { id: ResourceId::new("Vpc")?, name: cfg.name.clone(), cidr_block: cidr.to_string() })?;
        let mut subnets = Vec::with_capacity(cfg.max_azs);
        for i in 0..cfg.max_azs {
            let block = cidr.subdivide(cfg.cidr_mask, i).ok_or_else(|| TopologyError::validation(format!(
                "{cidr} cannot hold {} subnets of /{}", cfg.max_azs, cfg.cidr_mask
            )))?;
            let n = i + 1;
            let subnet_id = vpc.child(&format!("IsolatedSubnet{n}"))?;
            let name = format!("{}/IsolatedSubnet{n}", cfg.name);
            let subnet = graph.add(Subnet {
                id: subnet_id.clone(),
                vpc: vpc.clone(),
                name: name.clone(),
                cidr_block: block.to_string(),
                az_index: i,
            })?;
            let route_table = graph.add(RouteTable { id: subnet_id.child("RouteTable")?, vpc: vpc.clone(), name })?;
            graph.add(SubnetRouteTableAssociation {
                id: subnet_id.child("RouteTableAssociation")?,
                subnet: subnet.clone(),
                route_table: route_table.clone(),
            })?;
            subnets.push(IsolatedSubnet { subnet, route_table, cidr: block, az_index: i });
        }
        info!(vpc = %vpc, cidr = %cidr, subnets = subnets.len(), "isolated network built");
        Ok(Self { vpc, name: cfg.name.clone(), cidr, subnets })
    }

    pub fn subnet_ids(&self) -> Vec<ResourceId> { self.subnets.iter().map(|s| s.subnet.clone()).collect() }

    pub fn route_table_ids(&self) -> Vec<ResourceId> { self.subnets.iter().map(|s| s.route_table.clone()).collect() }

    pub fn is_isolated_subnet(&self, id: &ResourceId) -> bool { self.subnets.iter().any(|s| &s.subnet == id) }

    /// Logical id of the attachment to `service`; deterministic, so a second
    /// attachment to the same service collides in the graph.
    pub fn attachment_id(&self, service: AwsService) -> Result<ResourceId> {
        let suffix = match service {
            AwsService::S3 => "S3GatewayEndpoint",
            AwsService::SecretsManager => "SecretsManagerInterfaceEndpoint",
        };
        Ok(self.vpc.child(suffix)?)
    }

    /// Route-table-level attachment covering every isolated route table.
    pub fn gateway_attachment(&self, service: AwsService) -> Result<VpcEndpoint> {
        if !service.has_gateway_endpoint() {
            return Err(TopologyError::validation(format!("{service} has no gateway endpoint; use an interface attachment")));
        }
        Ok(VpcEndpoint {
            id: self.attachment_id(service)?,
            vpc: self.vpc.clone(),
            service,
            placement: EndpointPlacement::Gateway { route_tables: self.route_table_ids() },
        })
    }

    /// Interface attachment with a network interface in every isolated subnet
    /// and a security group admitting HTTPS from inside the network.
    pub fn interface_attachment(&self, service: AwsService) -> Result<(SecurityGroup, VpcEndpoint)> {
        let id = self.attachment_id(service)?;
        let sg = SecurityGroup {
            id: id.child("SecurityGroup")?,
            vpc: self.vpc.clone(),
            description: format!("{} {service} endpoint", self.name),
            ingress: vec![IngressRule { port: 443, description: "HTTPS from inside the network".to_string() }],
        };
        let endpoint = VpcEndpoint {
            id,
            vpc: self.vpc.clone(),
            service,
            placement: EndpointPlacement::Interface {
                subnets: self.subnet_ids(),
                security_groups: vec![sg.id.clone()],
            },
        };
        Ok((sg, endpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> NetworkConfig { NetworkConfig::default() }

    #[test]
    fn carves_one_isolated_subnet_per_zone() {
        let mut g = Graph::new();
        let net = Network::build(&mut g, &cfg()).unwrap();
        assert_eq!(net.subnets.len(), 2);
        assert_eq!(net.subnets[0].cidr.to_string(), "10.0.0.0/24");
        assert_eq!(net.subnets[1].cidr.to_string(), "10.0.1.0/24");
        assert_eq!(net.subnets[1].subnet.as_str(), "VpcIsolatedSubnet2");
        // vpc + 3 per subnet, and nothing that routes outward
        assert_eq!(g.len(), 7);
        assert_eq!(g.of_kind("AWS::EC2::Route").count(), 0);
        assert_eq!(g.of_kind("AWS::EC2::InternetGateway").count(), 0);
    }

    #[test]
    fn rejects_invalid_address_space() {
        for (cidr, mask, azs) in [
            ("10.0.0.0", 24, 2),
            ("10.0.0.1/16", 24, 2),
            ("10.0.0.0/8", 24, 2),
            ("10.0.0.0/16", 16, 2),
            ("10.0.0.0/16", 30, 2),
            ("10.0.0.0/27", 28, 3),
            ("10.0.0.0/16", 24, 0),
            ("300.0.0.0/16", 24, 2),
        ] {
            let mut g = Graph::new();
            let c = NetworkConfig { cidr: cidr.into(), cidr_mask: mask, max_azs: azs, ..cfg() };
            let err = Network::build(&mut g, &c).unwrap_err();
            assert!(matches!(err, TopologyError::Validation(_)), "{cidr} /{mask} x{azs}: {err}");
        }
    }

    #[test]
    fn subdivide_bounds() {
        let c = Cidr::parse("10.0.0.0/27").unwrap();
        assert_eq!(c.subdivide(28, 1).unwrap().to_string(), "10.0.0.16/28");
        assert!(c.subdivide(28, 2).is_none());
        assert!(c.subdivide(26, 0).is_none());
    }

    #[test]
    fn one_attachment_per_service() {
        let mut g = Graph::new();
        let net = Network::build(&mut g, &cfg()).unwrap();
        g.add(net.gateway_attachment(AwsService::S3).unwrap()).unwrap();
        assert!(g.add(net.gateway_attachment(AwsService::S3).unwrap()).is_err());
        assert!(net.gateway_attachment(AwsService::SecretsManager).is_err());
    }

    #[test]
    fn interface_attachment_spans_isolated_subnets() {
        let mut g = Graph::new();
        let net = Network::build(&mut g, &cfg()).unwrap();
        let (sg, ep) = net.interface_attachment(AwsService::SecretsManager).unwrap();
        match &ep.placement {
            EndpointPlacement::Interface { subnets, security_groups } => {
                assert!(subnets.iter().all(|s| net.is_isolated_subnet(s)));
                assert_eq!(security_groups, &vec![sg.id.clone()]);
            }
            other => panic!("unexpected placement {other:?}"),
        }
        g.add(sg).unwrap();
        g.add(ep).unwrap();
    }
}
