//! Alert Engine and Notifier
//!
//! Per-connection allow/deny/ask policy decisions backed by the Rule
//! Store, plus system notification dispatch.

pub mod engine;
pub mod notifier;

pub use engine::{AlertEngine, Decision};
pub use notifier::{platform_notifier, NoopNotifier, Notifier};
