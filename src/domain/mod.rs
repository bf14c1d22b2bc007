// Copyright (c) 2025 - Cowboy AI, Inc.
//! Domain value objects for network provisioning
//!
//! Immutable, validated building blocks consumed by the topology builder.

pub mod cidr;
pub mod network;

pub use cidr::{CidrBlock, CidrError};
pub use network::{NetworkRequest, ValidationError, MAX_NAME_LEN, SUBNET_PREFIX};
