use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeSet;
use vpce_cfn::intrinsic::{get_att, get_azs, reference, select, service_endpoint};
use vpce_core::{Resource, ResourceId};

use crate::{name_tag, AwsService};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpc {
    pub id: ResourceId,
    pub name: String,
    pub cidr_block: String,
}

impl Resource for Vpc {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::VPC" }
    fn properties(&self) -> Json {
        json!({
            "CidrBlock": self.cidr_block,
            // interface endpoints resolve through private DNS
            "EnableDnsHostnames": true,
            "EnableDnsSupport": true,
            "InstanceTenancy": "default",
            "Tags": [name_tag(&self.name)],
        })
    }
}

/// A subnet with no public addressing. Whether it is actually isolated is a
/// property of its route table, which never receives a route.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: ResourceId,
    pub vpc: ResourceId,
    pub name: String,
    pub cidr_block: String,
    pub az_index: usize,
}

impl Resource for Subnet {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::Subnet" }
    fn deps(&self) -> BTreeSet<ResourceId> { BTreeSet::from([self.vpc.clone()]) }
    fn properties(&self) -> Json {
        json!({
            "VpcId": reference(&self.vpc),
            "CidrBlock": self.cidr_block,
            "AvailabilityZone": select(self.az_index, get_azs()),
            "MapPublicIpOnLaunch": false,
            "Tags": [
                name_tag(&self.name),
                { "Key": "vpce:subnet-type", "Value": "Isolated" },
            ],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTable {
    pub id: ResourceId,
    pub vpc: ResourceId,
    pub name: String,
}

impl Resource for RouteTable {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::RouteTable" }
    fn deps(&self) -> BTreeSet<ResourceId> { BTreeSet::from([self.vpc.clone()]) }
    fn properties(&self) -> Json {
        json!({ "VpcId": reference(&self.vpc), "Tags": [name_tag(&self.name)] })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetRouteTableAssociation {
    pub id: ResourceId,
    pub subnet: ResourceId,
    pub route_table: ResourceId,
}

impl Resource for SubnetRouteTableAssociation {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::SubnetRouteTableAssociation" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        BTreeSet::from([self.subnet.clone(), self.route_table.clone()])
    }
    fn properties(&self) -> Json {
        json!({ "SubnetId": reference(&self.subnet), "RouteTableId": reference(&self.route_table) })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: ResourceId,
    pub vpc: ResourceId,
    pub description: String,
    /// TCP ingress, always sourced from the VPC's own CIDR.
    #[serde(default)]
    pub ingress: Vec<IngressRule>,
}

impl Resource for SecurityGroup {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::SecurityGroup" }
    fn deps(&self) -> BTreeSet<ResourceId> { BTreeSet::from([self.vpc.clone()]) }
    fn properties(&self) -> Json {
        let mut body = json!({
            "GroupDescription": self.description,
            "VpcId": reference(&self.vpc),
            "SecurityGroupEgress": [{
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default",
                "IpProtocol": "-1",
            }],
        });
        if !self.ingress.is_empty() {
            body["SecurityGroupIngress"] = Json::Array(self.ingress.iter().map(|r| json!({
                "CidrIp": get_att(&self.vpc, "CidrBlock"),
                "Description": r.description,
                "FromPort": r.port,
                "ToPort": r.port,
                "IpProtocol": "tcp",
            })).collect());
        }
        body
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EndpointPlacement {
    /// Route-table-level attachment; no network interface is consumed.
    Gateway { route_tables: Vec<ResourceId> },
    /// One network interface per subnet, reachable through private DNS.
    Interface { subnets: Vec<ResourceId>, security_groups: Vec<ResourceId> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpcEndpoint {
    pub id: ResourceId,
    pub vpc: ResourceId,
    pub service: AwsService,
    pub placement: EndpointPlacement,
}

impl Resource for VpcEndpoint {
    fn id(&self) -> &ResourceId { &self.id }
    fn kind(&self) -> &'static str { "AWS::EC2::VPCEndpoint" }
    fn deps(&self) -> BTreeSet<ResourceId> {
        let mut d = BTreeSet::from([self.vpc.clone()]);
        match &self.placement {
            EndpointPlacement::Gateway { route_tables } => d.extend(route_tables.iter().cloned()),
            EndpointPlacement::Interface { subnets, security_groups } => {
                d.extend(subnets.iter().cloned());
                d.extend(security_groups.iter().cloned());
            }
        }
        d
    }
    fn properties(&self) -> Json {
        let mut body = json!({
            "ServiceName": service_endpoint(self.service.endpoint_name()),
            "VpcId": reference(&self.vpc),
        });
        match &self.placement {
            EndpointPlacement::Gateway { route_tables } => {
                body["VpcEndpointType"] = json!("Gateway");
                body["RouteTableIds"] = Json::Array(route_tables.iter().map(reference).collect());
            }
            EndpointPlacement::Interface { subnets, security_groups } => {
                body["VpcEndpointType"] = json!("Interface");
                body["PrivateDnsEnabled"] = json!(true);
                body["SubnetIds"] = Json::Array(subnets.iter().map(reference).collect());
                body["SecurityGroupIds"] = Json::Array(
                    security_groups.iter().map(|g| get_att(g, "GroupId")).collect(),
                );
            }
        }
        body
    }
}
