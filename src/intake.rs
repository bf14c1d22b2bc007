// Copyright (c) 2025 - Cowboy AI, Inc.
//! Request Intake and Batching
//!
//! Turns opaque queue payloads into validated [`NetworkRequest`]s. Each
//! payload is decoded independently: one malformed message never blocks
//! the rest of its batch.
//!
//! # Defaulting policy
//!
//! Missing fields are filled from [`RequestDefaults`], so an
//! under-specified request still produces a valid, usable network.
//! Rejection is reserved for malformed or contradictory values, never for
//! merely absent ones.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::RequestDefaults;
use crate::domain::cidr::CidrBlock;
use crate::domain::network::{NetworkRequest, ValidationError};
use crate::queue::{QueueMessage, ReceiptHandle};
use crate::stack::{GroupingMode, StackKey};

/// Service label that marks a message as a network provisioning request
pub const NETWORK_SERVICE: &str = "vpc";

/// Wire schema of an inbound provisioning message.
///
/// Every field is optional; the defaulting policy fills the gaps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawProvisionMessage {
    pub project_name: Option<String>,
    pub services: Option<Vec<String>>,
    pub vpc_name: Option<String>,
    pub cidr_block: Option<String>,
    pub num_public_subnets: Option<u32>,
    pub num_private_subnets: Option<u32>,
    pub tags: Option<BTreeMap<String, String>>,
}

impl RawProvisionMessage {
    /// Whether this message asks for network provisioning at all
    pub fn requests_network(&self) -> bool {
        self.services
            .as_deref()
            .is_some_and(|services| services.iter().any(|s| s == NETWORK_SERVICE))
    }
}

/// Per-message intake result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Valid network request, ready for topology synthesis
    Requested(NetworkRequest),

    /// Message does not ask for network provisioning; terminally handled
    /// without building anything
    OutOfScope,

    /// Malformed or contradictory message; terminal, never retried
    Rejected(ValidationError),
}

/// One normalized message, paired with its queue origin
#[derive(Debug, Clone)]
pub struct IntakeRecord {
    /// Queue message id (for logging)
    pub message_id: String,

    /// Receipt used to delete the message after terminal handling
    pub receipt: ReceiptHandle,

    /// Engine project the request belongs to
    pub project: String,

    /// What intake decided about the message
    pub disposition: Disposition,
}

/// Decode and validate a batch of raw messages, in arrival order.
pub fn normalize(messages: &[QueueMessage], defaults: &RequestDefaults) -> Vec<IntakeRecord> {
    messages
        .iter()
        .map(|message| {
            let (project, disposition) = normalize_one(&message.body, defaults);
            debug!(message_id = %message.id, ?disposition, "Normalized inbound message");
            IntakeRecord {
                message_id: message.id.clone(),
                receipt: message.receipt.clone(),
                project,
                disposition,
            }
        })
        .collect()
}

fn normalize_one(body: &[u8], defaults: &RequestDefaults) -> (String, Disposition) {
    let raw: RawProvisionMessage = match serde_json::from_slice(body) {
        Ok(raw) => raw,
        Err(e) => {
            return (
                defaults.project_name.clone(),
                Disposition::Rejected(ValidationError::new("body", e.to_string())),
            );
        }
    };

    let project = raw
        .project_name
        .clone()
        .unwrap_or_else(|| defaults.project_name.clone());

    if !raw.requests_network() {
        return (project, Disposition::OutOfScope);
    }

    let cidr = match raw.cidr_block.as_deref() {
        Some(s) => match CidrBlock::parse(s) {
            Ok(cidr) => cidr,
            Err(e) => {
                return (
                    project,
                    Disposition::Rejected(ValidationError::new("cidr", e.to_string())),
                );
            }
        },
        None => defaults.cidr_block,
    };

    let request = NetworkRequest::new(
        raw.vpc_name.unwrap_or_else(|| defaults.vpc_name.clone()),
        cidr,
        raw.num_public_subnets.unwrap_or(defaults.public_subnets),
        raw.num_private_subnets.unwrap_or(defaults.private_subnets),
        raw.tags.unwrap_or_default(),
    );

    match request {
        Ok(request) => (project, Disposition::Requested(request)),
        Err(e) => (project, Disposition::Rejected(e)),
    }
}

/// Indices of requested records sharing one provisioning unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitGroup {
    /// Unit the group will be applied under
    pub key: StackKey,

    /// Indices into the normalized record slice, in arrival order
    pub indices: Vec<usize>,
}

/// Group requested records by provisioning unit.
///
/// Arrival order is preserved within each group, which keeps naming
/// deterministic when several networks share one unit.
pub fn group_by_unit(
    records: &[IntakeRecord],
    mode: GroupingMode,
    stack_name: &str,
) -> Vec<UnitGroup> {
    let mut groups: Vec<UnitGroup> = Vec::new();

    for (index, record) in records.iter().enumerate() {
        let Disposition::Requested(request) = &record.disposition else {
            continue;
        };

        let key = match mode {
            GroupingMode::PerNetwork => StackKey::for_network(&record.project, &request.name),
            GroupingMode::Batched => StackKey::shared(&record.project, stack_name),
        };

        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.indices.push(index),
            None => groups.push(UnitGroup {
                key,
                indices: vec![index],
            }),
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn message(id: &str, body: &str) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            receipt: ReceiptHandle::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn defaults() -> RequestDefaults {
        RequestDefaults::default()
    }

    #[test]
    fn test_fully_specified_message() {
        let body = r#"{
            "ProjectName": "team-a-project",
            "Services": ["vpc"],
            "VpcName": "team-a",
            "CidrBlock": "10.2.0.0/16",
            "NumPublicSubnets": 2,
            "NumPrivateSubnets": 1,
            "Tags": {"env": "dev"}
        }"#;
        let records = normalize(&[message("m1", body)], &defaults());

        assert_eq!(records[0].project, "team-a-project");
        let Disposition::Requested(request) = &records[0].disposition else {
            panic!("expected request");
        };
        assert_eq!(request.name, "team-a");
        assert_eq!(request.cidr.to_string(), "10.2.0.0/16");
        assert_eq!(request.public_subnets, 2);
        assert_eq!(request.private_subnets, 1);
        assert_eq!(request.tags["env"], "dev");
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let records = normalize(&[message("m1", r#"{"Services": ["vpc"]}"#)], &defaults());

        let Disposition::Requested(request) = &records[0].disposition else {
            panic!("expected request");
        };
        assert_eq!(request.name, "default-vpc");
        assert_eq!(request.cidr.to_string(), "10.0.0.0/16");
        assert_eq!(request.public_subnets, 1);
        assert_eq!(request.private_subnets, 1);
        assert!(request.tags.is_empty());
        assert_eq!(records[0].project, "default-project");
    }

    #[test]
    fn test_non_network_services_out_of_scope() {
        let records = normalize(
            &[
                message("m1", r#"{"Services": ["storage"]}"#),
                message("m2", r#"{}"#),
            ],
            &defaults(),
        );
        assert_eq!(records[0].disposition, Disposition::OutOfScope);
        assert_eq!(records[1].disposition, Disposition::OutOfScope);
    }

    #[test]
    fn test_decode_failure_is_isolated() {
        let records = normalize(
            &[
                message("m1", r#"{"Services": ["vpc"], "VpcName": "a"}"#),
                message("m2", "not json at all"),
                message("m3", r#"{"Services": ["vpc"], "VpcName": "b"}"#),
            ],
            &defaults(),
        );

        assert!(matches!(records[0].disposition, Disposition::Requested(_)));
        assert!(matches!(
            records[1].disposition,
            Disposition::Rejected(ref e) if e.field == "body"
        ));
        assert!(matches!(records[2].disposition, Disposition::Requested(_)));
    }

    #[test]
    fn test_bad_cidr_rejected() {
        let records = normalize(
            &[message(
                "m1",
                r#"{"Services": ["vpc"], "CidrBlock": "not-a-cidr"}"#,
            )],
            &defaults(),
        );
        assert!(matches!(
            records[0].disposition,
            Disposition::Rejected(ref e) if e.field == "cidr"
        ));
    }

    #[test]
    fn test_contradictory_counts_rejected_not_defaulted() {
        // Explicit zeros are contradictory (no subnets at all), not absent
        let records = normalize(
            &[message(
                "m1",
                r#"{"Services": ["vpc"], "NumPublicSubnets": 0, "NumPrivateSubnets": 0}"#,
            )],
            &defaults(),
        );
        assert!(matches!(records[0].disposition, Disposition::Rejected(_)));
    }

    #[test]
    fn test_grouping_per_network() {
        let records = normalize(
            &[
                message("m1", r#"{"Services": ["vpc"], "VpcName": "a"}"#),
                message("m2", r#"{"Services": ["vpc"], "VpcName": "b"}"#),
                message("m3", r#"{"Services": ["vpc"], "VpcName": "a"}"#),
            ],
            &defaults(),
        );
        let groups = group_by_unit(&records, GroupingMode::PerNetwork, "dev");

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key, StackKey::for_network("default-project", "a"));
        assert_eq!(groups[0].indices, vec![0, 2]);
        assert_eq!(groups[1].indices, vec![1]);
    }

    #[test]
    fn test_grouping_batched_shares_one_unit() {
        let records = normalize(
            &[
                message("m1", r#"{"Services": ["vpc"], "VpcName": "a"}"#),
                message("m2", r#"{"Services": ["vpc"], "VpcName": "b"}"#),
            ],
            &defaults(),
        );
        let groups = group_by_unit(&records, GroupingMode::Batched, "dev");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].key, StackKey::shared("default-project", "dev"));
        assert_eq!(groups[0].indices, vec![0, 1]);
    }

    #[test]
    fn test_grouping_skips_non_requests() {
        let records = normalize(
            &[
                message("m1", r#"{"Services": ["storage"]}"#),
                message("m2", r#"{"Services": ["vpc"], "VpcName": "a"}"#),
                message("m3", "garbage"),
            ],
            &defaults(),
        );
        let groups = group_by_unit(&records, GroupingMode::Batched, "dev");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].indices, vec![1]);
    }
}
