//! Orchestrator
//!
//! Ties the Connection Enumerator, Risk Scorer, Alert Engine,
//! Enforcement, Resource Scanner, and IP Reputation Cache together into
//! the periodic tick that drives PortWatch, and exposes a broadcast
//! channel of snapshots to subscribers (the web façade, the CLI's
//! tail-snapshot command).

pub mod net;
pub mod orchestrator;

pub use net::NetSampler;
pub use orchestrator::Orchestrator;
