// Copyright (c) 2025 - Cowboy AI, Inc.
//! Topology Builder
//!
//! Pure synthesis of a complete, dependency-ordered resource graph for one
//! virtual network. No I/O, no external state: the builder only describes
//! desired state, it never mutates any.
//!
//! # Determinism
//!
//! Re-running [`build`] on an unchanged request yields a byte-identical
//! graph - same names, same CIDRs, same edges. The external engine relies
//! on this to recognize "no change" instead of creating duplicates, which
//! is also what makes at-least-once message delivery safe.
//!
//! # Dependency order
//!
//! ```text
//! Network ─┬─ InternetGateway ──────────────┬─ PublicRoute ──┐
//!          ├─ ElasticIp ──┐                 │                │
//!          ├─ Subnets ────┴─ NatGateway ────┴─ PrivateRoute ─┤
//!          └─ RouteTables ──────────────────────────────────  Associations
//! ```
//!
//! The order is encoded as explicit `depends_on` edges on every resource,
//! not as incidental call order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::cidr::CidrBlock;
use crate::domain::network::{NetworkRequest, ValidationError, SUBNET_PREFIX};

/// Kind of a provisioned resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Network,
    InternetGateway,
    ElasticIp,
    PublicSubnet,
    PrivateSubnet,
    NatGateway,
    PublicRouteTable,
    PrivateRouteTable,
    PublicRoute,
    PrivateRoute,
    PublicRouteTableAssociation,
    PrivateRouteTableAssociation,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Network => "network",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::ElasticIp => "elastic_ip",
            ResourceKind::PublicSubnet => "public_subnet",
            ResourceKind::PrivateSubnet => "private_subnet",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::PublicRouteTable => "public_route_table",
            ResourceKind::PrivateRouteTable => "private_route_table",
            ResourceKind::PublicRoute => "public_route",
            ResourceKind::PrivateRoute => "private_route",
            ResourceKind::PublicRouteTableAssociation => "public_route_table_association",
            ResourceKind::PrivateRouteTableAssociation => "private_route_table_association",
        };
        write!(f, "{s}")
    }
}

/// One node of the desired-state graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Deterministic resource identifier
    pub name: String,

    /// Resource kind
    pub kind: ResourceKind,

    /// Names of resources that must exist before this one
    pub depends_on: Vec<String>,

    /// Engine-facing attributes (CIDR blocks, references, tags)
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// Complete desired-state graph for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    /// Network name the graph was derived from
    pub network: String,

    /// Parent address block
    pub cidr: CidrBlock,

    /// Resources in dependency order
    pub resources: Vec<ResourceSpec>,
}

impl NetworkTopology {
    /// Look up a resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// All resources of one kind, in build order
    pub fn of_kind(&self, kind: ResourceKind) -> impl Iterator<Item = &ResourceSpec> {
        self.resources.iter().filter(move |r| r.kind == kind)
    }

    /// Output keys the engine is expected to export for this network
    pub fn export_names(&self) -> Vec<String> {
        ["vpc_id", "vpc_cidr", "public_subnet_ids", "private_subnet_ids"]
            .iter()
            .map(|key| format!("{}.{key}", self.network))
            .collect()
    }
}

/// Deterministic resource identifier for `(network, kind, index)`.
///
/// This naming scheme is a contract: the engine converges repeated applies
/// of the same request because the identifiers never change.
pub fn resource_name(network: &str, kind: ResourceKind, index: Option<u32>) -> String {
    match (kind, index) {
        (ResourceKind::Network, _) => format!("{network}-vpc"),
        (ResourceKind::InternetGateway, _) => format!("{network}-igw"),
        (ResourceKind::ElasticIp, _) => format!("{network}-nat-eip"),
        (ResourceKind::PublicSubnet, Some(i)) => format!("{network}-public-subnet-{i}"),
        (ResourceKind::PrivateSubnet, Some(i)) => format!("{network}-private-subnet-{i}"),
        (ResourceKind::NatGateway, _) => format!("{network}-nat-gw"),
        (ResourceKind::PublicRouteTable, _) => format!("{network}-public-rt"),
        (ResourceKind::PrivateRouteTable, _) => format!("{network}-private-rt"),
        (ResourceKind::PublicRoute, _) => format!("{network}-public-route"),
        (ResourceKind::PrivateRoute, _) => format!("{network}-private-route"),
        (ResourceKind::PublicRouteTableAssociation, Some(i)) => {
            format!("{network}-public-rt-assoc-{i}")
        }
        (ResourceKind::PrivateRouteTableAssociation, Some(i)) => {
            format!("{network}-private-rt-assoc-{i}")
        }
        // Indexed kinds without an index cannot be produced by `build`
        (kind, None) => format!("{network}-{kind}"),
    }
}

/// Build the complete resource graph for one request.
///
/// Validates every request invariant first; on violation returns the
/// [`ValidationError`] and produces no partial topology.
pub fn build(request: &NetworkRequest) -> Result<NetworkTopology, ValidationError> {
    request.validate()?;

    let n = request.name.as_str();
    let vpc = resource_name(n, ResourceKind::Network, None);
    let igw = resource_name(n, ResourceKind::InternetGateway, None);

    let mut resources = Vec::with_capacity(6 + 3 * request.total_subnets() as usize);

    resources.push(ResourceSpec {
        name: vpc.clone(),
        kind: ResourceKind::Network,
        depends_on: vec![],
        properties: props([
            ("cidr_block", serde_json::json!(request.cidr.to_string())),
            ("tags", tags_for(request, &vpc)),
        ]),
    });

    resources.push(ResourceSpec {
        name: igw.clone(),
        kind: ResourceKind::InternetGateway,
        depends_on: vec![vpc.clone()],
        properties: props([
            ("vpc", serde_json::json!(vpc)),
            ("tags", tags_for(request, &igw)),
        ]),
    });

    let eip = resource_name(n, ResourceKind::ElasticIp, None);
    if request.wants_nat() {
        resources.push(ResourceSpec {
            name: eip.clone(),
            kind: ResourceKind::ElasticIp,
            depends_on: vec![vpc.clone()],
            properties: props([("vpc", serde_json::json!(true))]),
        });
    }

    // Public tier: indices 0..public_subnets
    let mut public_subnets = Vec::new();
    for i in 0..request.public_subnets {
        let name = resource_name(n, ResourceKind::PublicSubnet, Some(i));
        let block = subnet_block(request, i)?;
        resources.push(ResourceSpec {
            name: name.clone(),
            kind: ResourceKind::PublicSubnet,
            depends_on: vec![vpc.clone()],
            properties: props([
                ("vpc", serde_json::json!(vpc)),
                ("cidr_block", serde_json::json!(block.to_string())),
                ("map_public_ip_on_launch", serde_json::json!(true)),
                ("availability_zone_index", serde_json::json!(i)),
                ("tags", tags_for(request, &name)),
            ]),
        });
        public_subnets.push(name);
    }

    // Private tier: indices continue after the public range so the two
    // tiers never collide inside the parent block
    let mut private_subnets = Vec::new();
    for i in 0..request.private_subnets {
        let name = resource_name(n, ResourceKind::PrivateSubnet, Some(i));
        let block = subnet_block(request, request.public_subnets + i)?;
        resources.push(ResourceSpec {
            name: name.clone(),
            kind: ResourceKind::PrivateSubnet,
            depends_on: vec![vpc.clone()],
            properties: props([
                ("vpc", serde_json::json!(vpc)),
                ("cidr_block", serde_json::json!(block.to_string())),
                ("map_public_ip_on_launch", serde_json::json!(false)),
                (
                    "availability_zone_index",
                    serde_json::json!(request.public_subnets + i),
                ),
                ("tags", tags_for(request, &name)),
            ]),
        });
        private_subnets.push(name);
    }

    // NAT gateway lives in the first public subnet - deterministic, not
    // arbitrary, so repeated builds are structurally identical
    let nat = resource_name(n, ResourceKind::NatGateway, None);
    if request.wants_nat() {
        resources.push(ResourceSpec {
            name: nat.clone(),
            kind: ResourceKind::NatGateway,
            depends_on: vec![public_subnets[0].clone(), eip.clone()],
            properties: props([
                ("subnet", serde_json::json!(public_subnets[0])),
                ("allocation", serde_json::json!(eip)),
                ("tags", tags_for(request, &nat)),
            ]),
        });
    }

    let public_rt = resource_name(n, ResourceKind::PublicRouteTable, None);
    resources.push(ResourceSpec {
        name: public_rt.clone(),
        kind: ResourceKind::PublicRouteTable,
        depends_on: vec![vpc.clone()],
        properties: props([
            ("vpc", serde_json::json!(vpc)),
            ("tags", tags_for(request, &public_rt)),
        ]),
    });

    let private_rt = resource_name(n, ResourceKind::PrivateRouteTable, None);
    if request.wants_nat() {
        resources.push(ResourceSpec {
            name: private_rt.clone(),
            kind: ResourceKind::PrivateRouteTable,
            depends_on: vec![vpc.clone()],
            properties: props([
                ("vpc", serde_json::json!(vpc)),
                ("tags", tags_for(request, &private_rt)),
            ]),
        });
    }

    // Default routes: public egress via the internet gateway, private
    // egress via the NAT gateway
    let public_route = resource_name(n, ResourceKind::PublicRoute, None);
    resources.push(ResourceSpec {
        name: public_route,
        kind: ResourceKind::PublicRoute,
        depends_on: vec![public_rt.clone(), igw.clone()],
        properties: props([
            ("route_table", serde_json::json!(public_rt)),
            ("destination", serde_json::json!("0.0.0.0/0")),
            ("gateway", serde_json::json!(igw)),
        ]),
    });

    if request.wants_nat() {
        let private_route = resource_name(n, ResourceKind::PrivateRoute, None);
        resources.push(ResourceSpec {
            name: private_route,
            kind: ResourceKind::PrivateRoute,
            depends_on: vec![private_rt.clone(), nat.clone()],
            properties: props([
                ("route_table", serde_json::json!(private_rt)),
                ("destination", serde_json::json!("0.0.0.0/0")),
                ("nat_gateway", serde_json::json!(nat)),
            ]),
        });
    }

    // The public table is associated with every public subnet and only
    // those; same for the private table
    for (i, subnet) in public_subnets.iter().enumerate() {
        let name = resource_name(n, ResourceKind::PublicRouteTableAssociation, Some(i as u32));
        resources.push(ResourceSpec {
            name,
            kind: ResourceKind::PublicRouteTableAssociation,
            depends_on: vec![subnet.clone(), public_rt.clone()],
            properties: props([
                ("subnet", serde_json::json!(subnet)),
                ("route_table", serde_json::json!(public_rt)),
            ]),
        });
    }
    for (i, subnet) in private_subnets.iter().enumerate() {
        let name = resource_name(n, ResourceKind::PrivateRouteTableAssociation, Some(i as u32));
        resources.push(ResourceSpec {
            name,
            kind: ResourceKind::PrivateRouteTableAssociation,
            depends_on: vec![subnet.clone(), private_rt.clone()],
            properties: props([
                ("subnet", serde_json::json!(subnet)),
                ("route_table", serde_json::json!(private_rt)),
            ]),
        });
    }

    Ok(NetworkTopology {
        network: request.name.clone(),
        cidr: request.cidr,
        resources,
    })
}

/// Merge the graphs of a batch into one engine submission.
///
/// Request order is preserved. Duplicate names (two identical requests for
/// the same network in one batch) converge to the first occurrence.
pub fn merge_graphs(topologies: &[NetworkTopology]) -> Vec<ResourceSpec> {
    let mut merged: Vec<ResourceSpec> = Vec::new();
    for topology in topologies {
        for resource in &topology.resources {
            if !merged.iter().any(|r| r.name == resource.name) {
                merged.push(resource.clone());
            }
        }
    }
    merged
}

fn subnet_block(request: &NetworkRequest, index: u32) -> Result<CidrBlock, ValidationError> {
    request
        .cidr
        .subnet(SUBNET_PREFIX, index)
        .map_err(|e| ValidationError::new("cidr", e.to_string()))
}

fn tags_for(request: &NetworkRequest, name: &str) -> serde_json::Value {
    let mut tags = request.tags.clone();
    tags.insert("Name".to_string(), name.to_string());
    serde_json::json!(tags)
}

fn props<const N: usize>(
    entries: [(&str, serde_json::Value); N],
) -> BTreeMap<String, serde_json::Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
