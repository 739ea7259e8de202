//! Input validation framework for security
//!
//! Untrusted input enters PortWatch at a handful of boundaries: rule
//! fields coming from the action API, hostnames/ports parsed out of
//! connection endpoints, and arguments handed to external tools
//! (`codesign`, `spctl`, `xattr`, `tcpdump`). These helpers validate or
//! sanitize at those boundaries; internal data produced by our own
//! components is trusted.

use anyhow::{bail, Result};
use std::net::IpAddr;

/// Validate an IP address.
pub fn validate_ip_address(ip: &str) -> Result<IpAddr> {
    ip.parse::<IpAddr>()
        .map_err(|e| anyhow::anyhow!("Invalid IP address '{}': {}", ip, e))
}

/// Validate a port number.
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        bail!("Port cannot be 0");
    }
    Ok(())
}

/// Validate a hostname/domain name.
pub fn validate_hostname(hostname: &str) -> Result<()> {
    if hostname.is_empty() {
        bail!("Hostname cannot be empty");
    }

    if hostname.len() > 253 {
        bail!("Hostname too long (max 253 characters)");
    }

    for label in hostname.split('.') {
        if label.is_empty() || label.len() > 63 {
            bail!("Invalid hostname label length");
        }

        let first_char = label.chars().next();
        let last_char = label.chars().last();

        match (first_char, last_char) {
            (Some(first), Some(last)) => {
                if !first.is_alphanumeric() || !last.is_alphanumeric() {
                    bail!("Hostname labels must start and end with alphanumeric characters");
                }
            }
            _ => bail!("Invalid hostname label"),
        }

        if !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            bail!("Hostname contains invalid characters");
        }
    }

    Ok(())
}

/// Validate a destination: either a valid IP address or a valid hostname.
pub fn validate_destination(destination: &str) -> Result<()> {
    if validate_ip_address(destination).is_ok() {
        return Ok(());
    }
    validate_hostname(destination)
}

/// Validate a rule action string (`allow`/`deny`).
pub fn validate_rule_action(action: &str) -> Result<()> {
    const VALID: &[&str] = &["allow", "deny"];
    if !VALID.contains(&action) {
        bail!("Invalid action '{}'. Must be one of: {:?}", action, VALID);
    }
    Ok(())
}

/// Validate a rule scope string (`once`/`always`/`temporary`).
pub fn validate_rule_scope(scope: &str) -> Result<()> {
    const VALID: &[&str] = &["once", "always", "temporary"];
    if !VALID.contains(&scope) {
        bail!("Invalid scope '{}'. Must be one of: {:?}", scope, VALID);
    }
    Ok(())
}

/// A `scope=temporary` rule must carry a positive TTL in hours.
pub fn validate_ttl_hours(scope: &str, ttl_hours: Option<i64>) -> Result<()> {
    if scope == "temporary" {
        match ttl_hours {
            Some(h) if h > 0 => Ok(()),
            _ => bail!("scope=temporary requires a positive ttl_hours"),
        }
    } else {
        Ok(())
    }
}

/// Validate and sanitize a comment/description field.
pub fn sanitize_comment(comment: &str, max_length: usize) -> Result<String> {
    if comment.len() > max_length {
        bail!("Comment too long (max {} characters)", max_length);
    }

    let sanitized: String = comment
        .chars()
        .filter(|c| {
            !c.is_control()
                && *c != '\\'
                && *c != '"'
                && *c != '\''
                && *c != '`'
                && *c != '$'
                && *c != '&'
                && *c != '|'
                && *c != ';'
        })
        .collect();

    Ok(sanitized)
}

/// Validate an alphanumeric identifier (process names, rule ids, etc).
pub fn validate_identifier(id: &str, max_length: usize) -> Result<()> {
    if id.is_empty() {
        bail!("Identifier cannot be empty");
    }

    if id.len() > max_length {
        bail!("Identifier too long (max {} characters)", max_length);
    }

    Ok(())
}

/// Escape a string for safe use as a single shell argument.
pub fn escape_shell_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ip_address() {
        assert!(validate_ip_address("192.168.1.1").is_ok());
        assert!(validate_ip_address("::1").is_ok());
        assert!(validate_ip_address("2001:db8::1").is_ok());
        assert!(validate_ip_address("invalid").is_err());
        assert!(validate_ip_address("256.1.1.1").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(443).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_hostname() {
        assert!(validate_hostname("example.com").is_ok());
        assert!(validate_hostname("sub.example.com").is_ok());
        assert!(validate_hostname("").is_err());
        assert!(validate_hostname("-invalid").is_err());
        assert!(validate_hostname("invalid..com").is_err());
    }

    #[test]
    fn test_validate_destination() {
        assert!(validate_destination("1.2.3.4").is_ok());
        assert!(validate_destination("example.com").is_ok());
        assert!(validate_destination("..").is_err());
    }

    #[test]
    fn test_validate_rule_action_and_scope() {
        assert!(validate_rule_action("allow").is_ok());
        assert!(validate_rule_action("reject").is_err());
        assert!(validate_rule_scope("temporary").is_ok());
        assert!(validate_rule_scope("forever").is_err());
    }

    #[test]
    fn test_validate_ttl_hours() {
        assert!(validate_ttl_hours("temporary", Some(24)).is_ok());
        assert!(validate_ttl_hours("temporary", None).is_err());
        assert!(validate_ttl_hours("always", None).is_ok());
    }

    #[test]
    fn test_sanitize_comment() {
        assert_eq!(
            sanitize_comment("Normal comment", 100).unwrap(),
            "Normal comment"
        );
        let result = sanitize_comment("Comment with $injection; attempt", 100).unwrap();
        assert!(!result.contains('$'));
        assert!(!result.contains(';'));
        assert!(sanitize_comment("x".repeat(200).as_str(), 50).is_err());
    }

    #[test]
    fn test_escape_shell_arg() {
        assert_eq!(escape_shell_arg("normal"), "'normal'");
        assert_eq!(escape_shell_arg("with'quote"), "'with'\\''quote'");
    }
}
