//! Resource Scanner
//!
//! Per-process CPU/RSS/write-throughput sampling, producing a threat
//! score orthogonal to the connection risk score.

pub mod scanner;

pub use scanner::{ResourceScanner, ThreatRecord};
