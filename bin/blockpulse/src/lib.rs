//! Blockpulse polls a registry of blockchain RPC endpoints, probes each one
//! concurrently for its current chain height, computes per-chain height
//! divergence, and records every probe into InfluxDB.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod divergence;
pub mod endpoint;
pub mod error;
pub mod influx;
pub mod opts;
pub mod poller;
pub mod probe;
pub mod round;
