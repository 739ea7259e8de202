//! Stable identity hashing
//!
//! Every alert and beacon-history entry needs an identifier that is the
//! same across restarts given the same logical input, with no timestamp
//! component. We use SHA-256 rather than reaching for a dedicated digest
//! crate since `sha2` is already part of the dependency graph.

use sha2::{Digest, Sha256};

/// Fingerprint a `(process, destination, port)` triple into a stable,
/// restart-independent identifier.
pub fn connection_fingerprint(process: &str, destination: &str, port: u16) -> String {
    stable_hash(&format!("{process}|{destination}|{port}"))
}

/// Hash an arbitrary key into a hex digest, truncated to 32 characters to
/// stay a convenient, short, stable identifier.
pub fn stable_hash(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let hex = format!("{digest:x}");
    hex[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_fingerprint() {
        let a = connection_fingerprint("curl", "1.2.3.4", 443);
        let b = connection_fingerprint("curl", "1.2.3.4", 443);
        assert_eq!(a, b);
    }

    #[test]
    fn different_port_different_fingerprint() {
        let a = connection_fingerprint("curl", "1.2.3.4", 443);
        let b = connection_fingerprint("curl", "1.2.3.4", 8443);
        assert_ne!(a, b);
    }

    #[test]
    fn fingerprint_is_32_hex_chars() {
        let f = connection_fingerprint("x", "y", 1);
        assert_eq!(f.len(), 32);
        assert!(f.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
