//! Service configuration
//!
//! One explicit [`ProvisionerConfig`] is constructed at startup - from
//! defaults, code, or the process environment - and passed by reference
//! into the worker and orchestrator. Nothing reads ambient global state
//! after construction; credentials and region are resolved exactly once.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::cidr::CidrBlock;
use crate::orchestrator::OrchestratorOptions;
use crate::stack::GroupingMode;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unusable value
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Queue transport configuration
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// NATS server URLs
    pub servers: Vec<String>,

    /// Client connection name
    pub client_name: String,

    /// Stream holding inbound provisioning requests
    pub stream_name: String,

    /// Subject the stream captures
    pub subject: String,

    /// Durable consumer name
    pub consumer_name: String,

    /// Maximum messages pulled per poll cycle
    pub max_messages: usize,

    /// Long-poll wait for the first message of a batch
    pub wait_time: Duration,

    /// Redelivery window for messages that never reach a terminal outcome
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            client_name: "network-provisioner".to_string(),
            stream_name: "NETWORK_REQUESTS".to_string(),
            subject: "provisioning.network.requests".to_string(),
            consumer_name: "network-provisioner".to_string(),
            max_messages: 10,
            wait_time: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

/// Values filled in for fields an inbound message omits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDefaults {
    /// Engine project for messages without `ProjectName`
    pub project_name: String,

    /// Network name for messages without `VpcName`
    pub vpc_name: String,

    /// Parent block for messages without `CidrBlock`
    pub cidr_block: CidrBlock,

    /// Public subnet count for messages without `NumPublicSubnets`
    pub public_subnets: u32,

    /// Private subnet count for messages without `NumPrivateSubnets`
    pub private_subnets: u32,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            project_name: "default-project".to_string(),
            vpc_name: "default-vpc".to_string(),
            cidr_block: CidrBlock::parse("10.0.0.0/16").unwrap(),
            public_subnets: 1,
            private_subnets: 1,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Queue transport settings
    pub queue: QueueConfig,

    /// Defaulting policy for under-specified requests
    pub defaults: RequestDefaults,

    /// How requests map onto provisioning units
    pub grouping: GroupingMode,

    /// Shared unit name used in batched grouping mode
    pub stack_name: String,

    /// Target region handed to the engine
    pub region: Option<String>,

    /// Sync engine state before each apply
    pub reconcile_state: bool,

    /// Delay before retrying the poll loop after a transport error
    pub poll_backoff: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            defaults: RequestDefaults::default(),
            grouping: GroupingMode::default(),
            stack_name: "dev".to_string(),
            region: Some("us-east-1".to_string()),
            reconcile_state: false,
            poll_backoff: Duration::from_secs(5),
        }
    }
}

impl ProvisionerConfig {
    /// Build configuration from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(servers) = std::env::var("NATS_URL") {
            config.queue.servers = servers.split(',').map(str::to_string).collect();
        }
        if let Ok(stream) = std::env::var("PROVISIONER_STREAM") {
            config.queue.stream_name = stream;
        }
        if let Ok(subject) = std::env::var("PROVISIONER_SUBJECT") {
            config.queue.subject = subject;
        }
        if let Ok(consumer) = std::env::var("PROVISIONER_CONSUMER") {
            config.queue.consumer_name = consumer;
        }
        if let Some(max) = parse_env("PROVISIONER_MAX_MESSAGES")? {
            config.queue.max_messages = max;
        }
        if let Some(secs) = parse_env("PROVISIONER_WAIT_SECONDS")? {
            config.queue.wait_time = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("PROVISIONER_VISIBILITY_SECONDS")? {
            config.queue.visibility_timeout = Duration::from_secs(secs);
        }

        if let Ok(region) = std::env::var("PROVISIONER_REGION") {
            config.region = Some(region);
        }
        if let Ok(stack) = std::env::var("PROVISIONER_STACK") {
            config.stack_name = stack;
        }
        if let Ok(grouping) = std::env::var("PROVISIONER_GROUPING") {
            config.grouping = match grouping.as_str() {
                "per_network" => GroupingMode::PerNetwork,
                "batched" => GroupingMode::Batched,
                other => {
                    return Err(ConfigError::Invalid {
                        var: "PROVISIONER_GROUPING",
                        reason: format!("expected per_network or batched, got {other}"),
                    });
                }
            };
        }
        if let Some(reconcile) = parse_env("PROVISIONER_RECONCILE")? {
            config.reconcile_state = reconcile;
        }
        if let Some(secs) = parse_env("PROVISIONER_BACKOFF_SECONDS")? {
            config.poll_backoff = Duration::from_secs(secs);
        }

        if let Ok(cidr) = std::env::var("PROVISIONER_DEFAULT_CIDR") {
            config.defaults.cidr_block =
                CidrBlock::parse(&cidr).map_err(|e| ConfigError::Invalid {
                    var: "PROVISIONER_DEFAULT_CIDR",
                    reason: e.to_string(),
                })?;
        }
        if let Some(count) = parse_env("PROVISIONER_DEFAULT_PUBLIC_SUBNETS")? {
            config.defaults.public_subnets = count;
        }
        if let Some(count) = parse_env("PROVISIONER_DEFAULT_PRIVATE_SUBNETS")? {
            config.defaults.private_subnets = count;
        }

        Ok(config)
    }

    /// Orchestrator options derived from this configuration
    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            region: self.region.clone(),
            reconcile_state: self.reconcile_state,
        }
    }
}

fn parse_env<T>(var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                var,
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.queue.stream_name, "NETWORK_REQUESTS");
        assert_eq!(config.queue.max_messages, 10);
        assert_eq!(config.defaults.public_subnets, 1);
        assert_eq!(config.defaults.private_subnets, 1);
        assert_eq!(config.defaults.cidr_block.to_string(), "10.0.0.0/16");
        assert_eq!(config.grouping, GroupingMode::PerNetwork);
        assert!(!config.reconcile_state);
    }

    // Single test mutating the environment, to keep parallel tests
    // from racing on shared process state
    #[test]
    fn test_from_env() {
        std::env::set_var("PROVISIONER_STACK", "staging");
        std::env::set_var("PROVISIONER_GROUPING", "batched");
        std::env::set_var("PROVISIONER_DEFAULT_PUBLIC_SUBNETS", "2");

        let config = ProvisionerConfig::from_env().unwrap();
        assert_eq!(config.stack_name, "staging");
        assert_eq!(config.grouping, GroupingMode::Batched);
        assert_eq!(config.defaults.public_subnets, 2);

        std::env::set_var("PROVISIONER_GROUPING", "sideways");
        assert!(ProvisionerConfig::from_env().is_err());

        std::env::remove_var("PROVISIONER_STACK");
        std::env::remove_var("PROVISIONER_GROUPING");
        std::env::remove_var("PROVISIONER_DEFAULT_PUBLIC_SUBNETS");
    }
}
