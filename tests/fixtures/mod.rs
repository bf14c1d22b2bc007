// Copyright (c) 2025 - Cowboy AI, Inc.
//! Shared test doubles: an in-memory queue and a deterministic engine.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use cim_network_provisioner::engine::{ApplyReport, EngineFault, ProvisioningEngine, UnitHandle};
use cim_network_provisioner::errors::{TransportError, TransportResult};
use cim_network_provisioner::queue::{MessageQueue, QueueMessage, ReceiptHandle};
use cim_network_provisioner::stack::StackKey;
use cim_network_provisioner::topology::{ResourceKind, ResourceSpec};

/// In-memory work queue with at-least-once delete tracking
#[derive(Default)]
pub struct MockQueue {
    inbox: Mutex<VecDeque<QueueMessage>>,
    deleted: Mutex<Vec<ReceiptHandle>>,
    fail_receive: AtomicBool,
}

impl MockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue one raw payload, returning its receipt
    pub fn push(&self, id: &str, body: &str) -> ReceiptHandle {
        let receipt = ReceiptHandle::new();
        self.inbox.lock().unwrap().push_back(QueueMessage {
            id: id.to_string(),
            receipt: receipt.clone(),
            body: body.as_bytes().to_vec(),
        });
        receipt
    }

    /// Make the next receive fail with a transport error
    pub fn fail_next_receive(&self) {
        self.fail_receive.store(true, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<ReceiptHandle> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.inbox.lock().unwrap().len()
    }
}

#[async_trait]
impl MessageQueue for MockQueue {
    async fn receive(
        &self,
        max_messages: usize,
        _wait: Duration,
    ) -> TransportResult<Vec<QueueMessage>> {
        if self.fail_receive.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Receive("connection reset".to_string()));
        }

        let mut inbox = self.inbox.lock().unwrap();
        let count = max_messages.min(inbox.len());
        Ok(inbox.drain(..count).collect())
    }

    async fn delete(&self, receipt: &ReceiptHandle) -> TransportResult<()> {
        let mut deleted = self.deleted.lock().unwrap();
        if deleted.contains(receipt) {
            return Err(TransportError::Acknowledge(format!(
                "receipt {receipt} already deleted"
            )));
        }
        deleted.push(receipt.clone());
        Ok(())
    }
}

/// Deterministic in-memory engine.
///
/// Outputs are a pure function of the staged graph, so repeated applies of
/// the same request produce identical results. One apply may be in flight
/// per unit; a second one fails with `ConcurrentUpdate`.
#[derive(Default)]
pub struct MockEngine {
    units: Mutex<HashMap<StackKey, Vec<ResourceSpec>>>,
    in_flight: Mutex<HashSet<StackKey>>,
    calls: Mutex<Vec<String>>,
    apply_delay: Option<Duration>,
    fail_next_apply: Mutex<Option<EngineFault>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine that holds each apply open for `delay`, so overlapping
    /// applies on one unit actually collide
    pub fn with_apply_delay(delay: Duration) -> Self {
        Self {
            apply_delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_next_apply(&self, fault: EngineFault) {
        *self.fail_next_apply.lock().unwrap() = Some(fault);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn apply_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with("apply:"))
            .count()
    }

    /// Graph most recently staged on a unit
    pub fn staged_graph(&self, key: &StackKey) -> Option<Vec<ResourceSpec>> {
        self.units.lock().unwrap().get(key).cloned()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ProvisioningEngine for MockEngine {
    async fn select_or_create_unit(
        &self,
        key: &StackKey,
        graph: &[ResourceSpec],
    ) -> Result<UnitHandle, EngineFault> {
        self.record(format!("select:{key}"));
        self.units.lock().unwrap().insert(key.clone(), graph.to_vec());
        Ok(UnitHandle {
            key: key.clone(),
            token: format!("session-{key}"),
        })
    }

    async fn install_dependencies(&self, handle: &UnitHandle) -> Result<(), EngineFault> {
        self.record(format!("install:{}", handle.key));
        Ok(())
    }

    async fn configure(
        &self,
        handle: &UnitHandle,
        key: &str,
        value: &str,
    ) -> Result<(), EngineFault> {
        self.record(format!("configure:{}:{key}={value}", handle.key));
        Ok(())
    }

    async fn reconcile(&self, handle: &UnitHandle) -> Result<(), EngineFault> {
        self.record(format!("reconcile:{}", handle.key));
        Ok(())
    }

    async fn apply(&self, handle: &UnitHandle) -> Result<ApplyReport, EngineFault> {
        self.record(format!("apply:{}", handle.key));

        if let Some(fault) = self.fail_next_apply.lock().unwrap().take() {
            return Err(fault);
        }

        if !self.in_flight.lock().unwrap().insert(handle.key.clone()) {
            return Err(EngineFault::ConcurrentUpdate {
                unit: handle.key.to_string(),
                detail: "another update is currently in progress".to_string(),
            });
        }

        if let Some(delay) = self.apply_delay {
            tokio::time::sleep(delay).await;
        }

        let graph = self
            .units
            .lock()
            .unwrap()
            .get(&handle.key)
            .cloned()
            .unwrap_or_default();
        let report = ApplyReport {
            outputs: outputs_for(&graph),
            summary: Some(format!("{} resources converged", graph.len())),
        };

        self.in_flight.lock().unwrap().remove(&handle.key);
        Ok(report)
    }
}

/// Deterministic outputs derived from the staged graph, mirroring what a
/// real engine would export per network
fn outputs_for(graph: &[ResourceSpec]) -> BTreeMap<String, serde_json::Value> {
    let mut outputs = BTreeMap::new();

    for vpc in graph.iter().filter(|r| r.kind == ResourceKind::Network) {
        let network = vpc.name.strip_suffix("-vpc").unwrap_or(&vpc.name);

        outputs.insert(
            format!("{network}.vpc_id"),
            serde_json::json!(format!("vpc-{network}")),
        );
        outputs.insert(
            format!("{network}.vpc_cidr"),
            vpc.properties["cidr_block"].clone(),
        );

        let subnet_ids = |kind: ResourceKind| -> serde_json::Value {
            let ids: Vec<String> = graph
                .iter()
                .filter(|r| r.kind == kind && r.name.starts_with(&format!("{network}-")))
                .map(|r| format!("subnet-{}", r.name))
                .collect();
            serde_json::json!(ids)
        };
        outputs.insert(
            format!("{network}.public_subnet_ids"),
            subnet_ids(ResourceKind::PublicSubnet),
        );
        outputs.insert(
            format!("{network}.private_subnet_ids"),
            subnet_ids(ResourceKind::PrivateSubnet),
        );
    }

    outputs
}
