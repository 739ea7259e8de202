//! Connection Enumerator and Beacon Tracker
//!
//! Produces enriched [`portwatch_core::types::ConnectionRow`]s once per
//! tick: raw socket-table collection (`/proc/net` on Linux, `lsof`
//! fallback elsewhere), joined with process/signing data, DNS bindings,
//! and beacon cadence detection.

mod beacon;
mod enumerator;
mod lsof;
mod proc_net;
mod raw;

pub use beacon::BeaconTracker;
pub use enumerator::ConnectionEnumerator;
pub use raw::RawSocket;
