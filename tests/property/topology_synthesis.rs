// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Topology Synthesis
//!
//! Verifies the determinism and address-space properties the external
//! engine depends on: identical requests yield identical graphs, carved
//! subnets never overlap, and every derived identifier is unique.

use proptest::prelude::*;
use std::collections::{BTreeMap, HashSet};

use cim_network_provisioner::topology::{build, merge_graphs, ResourceKind};
use cim_network_provisioner::{CidrBlock, NetworkRequest};

// ============================================================================
// Strategies
// ============================================================================

/// Valid network names: lowercase labels, no leading or trailing hyphen
fn network_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}(-[a-z0-9]{1,5})?"
}

/// Parent blocks wide enough for any generated subnet count
fn parent_cidr() -> impl Strategy<Value = CidrBlock> {
    (0u8..=255, 16u8..=21).prop_map(|(octet, prefix)| {
        CidrBlock::parse(&format!("10.{octet}.0.0/{prefix}")).expect("well-formed literal")
    })
}

/// Subnet counts satisfying the request invariants
fn subnet_counts() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=4, 0u32..=4)
}

fn valid_request() -> impl Strategy<Value = NetworkRequest> {
    (network_name(), parent_cidr(), subnet_counts()).prop_map(
        |(name, cidr, (public, private))| {
            NetworkRequest::new(name, cidr, public, private, BTreeMap::new())
                .expect("generated request satisfies every invariant")
        },
    )
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Building the same request twice yields byte-identical graphs
    #[test]
    fn prop_build_is_deterministic(request in valid_request()) {
        let a = build(&request).expect("valid request builds");
        let b = build(&request).expect("valid request builds");
        prop_assert_eq!(a, b);
    }

    /// Carved subnets are pairwise disjoint and inside the parent block
    #[test]
    fn prop_subnets_disjoint_and_contained(request in valid_request()) {
        let topology = build(&request).expect("valid request builds");

        let blocks: Vec<CidrBlock> = topology
            .resources
            .iter()
            .filter(|r| {
                r.kind == ResourceKind::PublicSubnet || r.kind == ResourceKind::PrivateSubnet
            })
            .map(|r| {
                CidrBlock::parse(r.properties["cidr_block"].as_str().unwrap())
                    .expect("builder emits well-formed blocks")
            })
            .collect();

        prop_assert_eq!(blocks.len() as u32, request.total_subnets());

        for block in &blocks {
            prop_assert!(request.cidr.contains(block), "{block} outside {}", request.cidr);
        }
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                prop_assert!(!a.overlaps(b), "{a} overlaps {b}");
            }
        }
    }

    /// Every resource identifier is unique and derived from the network name
    #[test]
    fn prop_resource_names_unique_and_prefixed(request in valid_request()) {
        let topology = build(&request).expect("valid request builds");

        let mut seen = HashSet::new();
        for resource in &topology.resources {
            prop_assert!(seen.insert(&resource.name), "duplicate name {}", resource.name);
            prop_assert!(
                resource.name.starts_with(&format!("{}-", request.name)),
                "{} not derived from {}",
                resource.name,
                request.name
            );
        }
    }

    /// Every dependency edge points at a resource that appears earlier
    #[test]
    fn prop_dependencies_precede_dependents(request in valid_request()) {
        let topology = build(&request).expect("valid request builds");

        for (position, resource) in topology.resources.iter().enumerate() {
            for dep in &resource.depends_on {
                let dep_position = topology.resources.iter().position(|r| &r.name == dep);
                prop_assert!(
                    matches!(dep_position, Some(p) if p < position),
                    "{dep} must precede {}",
                    resource.name
                );
            }
        }
    }

    /// The NAT path exists exactly when private subnets were requested
    #[test]
    fn prop_nat_path_iff_private_subnets(request in valid_request()) {
        let topology = build(&request).expect("valid request builds");
        let nat_count = topology.of_kind(ResourceKind::NatGateway).count();

        if request.private_subnets > 0 {
            prop_assert_eq!(nat_count, 1);
            prop_assert_eq!(topology.of_kind(ResourceKind::ElasticIp).count(), 1);
            prop_assert_eq!(topology.of_kind(ResourceKind::PrivateRoute).count(), 1);
        } else {
            prop_assert_eq!(nat_count, 0);
            prop_assert_eq!(topology.of_kind(ResourceKind::ElasticIp).count(), 0);
            prop_assert_eq!(topology.of_kind(ResourceKind::PrivateRoute).count(), 0);
        }
    }

    /// Merging a graph with itself changes nothing
    #[test]
    fn prop_merge_is_idempotent(request in valid_request()) {
        let topology = build(&request).expect("valid request builds");
        let merged = merge_graphs(&[topology.clone(), topology.clone()]);
        prop_assert_eq!(merged, topology.resources);
    }
}
