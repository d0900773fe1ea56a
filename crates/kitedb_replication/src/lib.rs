//! # KiteDB Replication
//!
//! Master to slave replication for KiteDB.
//!
//! This crate provides:
//! - The replication supervisor: worker lifecycle, stop/resync
//!   signals, WAL update subscription
//! - The per-namespace sync state machine: WAL catch-up, forced full
//!   resync, and the race protocol between bulk catch-up and live
//!   streaming updates
//! - The master-client contract, with an in-process implementation for
//!   embedded pairs and tests

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod master;
mod replicator;

pub use config::{ReplicationConfig, ReplicationRole};
pub use master::{InProcessMaster, MasterClient};
pub use replicator::{MasterConnector, Replicator};
