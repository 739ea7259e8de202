//! DNS Sniffer and Analyzer
//!
//! Passive UDP/53 capture that binds resolved domain names to the IP
//! addresses they resolved to, and a pure heuristic classifier for domain
//! names (entropy, length, TLD/keyword blacklists, IP-in-name).

pub mod analyzer;
pub mod config;
pub mod sniffer;

pub use analyzer::{analyze, calculate_entropy};
pub use config::{ConfigHandle, DnsAnalyzerConfig};
pub use sniffer::{DnsMap, DnsSniffer};
