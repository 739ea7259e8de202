//! IP Reputation Cache
//!
//! TTL-cached, best-effort reputation scoring for public remote
//! addresses, plus the country-code attachment seam.

pub mod cache;
pub mod country;

pub use cache::ReputationCache;
pub use country::{CountryLookup, NoopCountryLookup};
