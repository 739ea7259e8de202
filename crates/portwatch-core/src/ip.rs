//! IP address classification and endpoint-string parsing
//!
//! Centralizes the private/public classification used to gate reputation
//! and country lookups, and the host:port splitting needed everywhere an
//! endpoint string crosses a component boundary (bracketed IPv6 included).

use std::net::{IpAddr, Ipv6Addr};

/// True if `addr` is routable on the public internet: not loopback, not
/// link-local, not multicast, not unspecified, and not one of the
/// IPv4 private ranges or the IPv6 unique-local range (`fc00::/7`).
pub fn is_public_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => !(v6.is_loopback()
            || v6.is_multicast()
            || v6.is_unspecified()
            || is_unique_local(v6)
            || is_unicast_link_local(v6)),
    }
}

fn is_unique_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

fn is_unicast_link_local(addr: &Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}

/// Split an endpoint string into `(host, port)`, handling both the bracketed
/// IPv6 form (`[::1]:443`) and the bare form (`1.2.3.4:443`, `example.com:443`).
/// Returns `None` if no port separator can be found.
pub fn split_host_port(endpoint: &str) -> Option<(String, u16)> {
    let endpoint = endpoint.trim();
    if let Some(rest) = endpoint.strip_prefix('[') {
        let close = rest.find(']')?;
        let host = &rest[..close];
        let after = &rest[close + 1..];
        let port_str = after.strip_prefix(':')?;
        let port = port_str.parse().ok()?;
        return Some((host.to_string(), port));
    }

    let colon = endpoint.rfind(':')?;
    let (host, port_str) = endpoint.split_at(colon);
    let port_str = &port_str[1..];
    let port = port_str.parse().ok()?;
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges_are_not_public() {
        assert!(!is_public_ip(&"10.0.0.1".parse().unwrap()));
        assert!(!is_public_ip(&"192.168.1.1".parse().unwrap()));
        assert!(!is_public_ip(&"127.0.0.1".parse().unwrap()));
        assert!(!is_public_ip(&"::1".parse().unwrap()));
        assert!(!is_public_ip(&"fc00::1".parse().unwrap()));
        assert!(!is_public_ip(&"fe80::1".parse().unwrap()));
    }

    #[test]
    fn public_addresses_are_public() {
        assert!(is_public_ip(&"8.8.8.8".parse().unwrap()));
        assert!(is_public_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn splits_bare_ipv4_endpoint() {
        assert_eq!(
            split_host_port("1.2.3.4:443"),
            Some(("1.2.3.4".to_string(), 443))
        );
    }

    #[test]
    fn splits_bracketed_ipv6_endpoint() {
        assert_eq!(
            split_host_port("[2001:db8::1]:8443"),
            Some(("2001:db8::1".to_string(), 8443))
        );
    }

    #[test]
    fn splits_hostname_endpoint() {
        assert_eq!(
            split_host_port("example.com:443"),
            Some(("example.com".to_string(), 443))
        );
    }

    #[test]
    fn rejects_endpoint_without_port() {
        assert_eq!(split_host_port("no-port-here"), None);
    }
}
