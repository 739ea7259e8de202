//! Rule Store
//!
//! Durable SQLite-backed allow/deny rules with priority matching,
//! TTL/once housekeeping, and export/import.

pub mod store;

pub use store::{NewRule, RuleStore};
