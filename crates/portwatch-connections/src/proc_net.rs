//! Primary enumeration strategy: the kernel socket table via `/proc/net/*`
//! on Linux, joined to owning pids via `/proc/<pid>/fd/*` inode symlinks.
//!
//! Rows without a remote endpoint (rare for the raw table entries, since we
//! only look at sockets actually past the listen state) are discarded by
//! the caller, not here -- this module's job is just to reconstruct the
//! `(local, remote, status, inode)` records and resolve their pid.

use super::raw::RawSocket;
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

const TCP_ESTABLISHED: &str = "01";

struct TableEntry {
    laddr: String,
    lport: u16,
    raddr: String,
    rport: u16,
    status_code: String,
    inode: u64,
}

fn hex_to_ipv4_port(field: &str) -> Option<(Ipv4Addr, u16)> {
    let (addr_hex, port_hex) = field.split_once(':')?;
    if addr_hex.len() != 8 {
        return None;
    }
    let bytes = u32::from_str_radix(addr_hex, 16).ok()?;
    // /proc/net/tcp stores the address in native (little-endian on x86) byte
    // order, so the octets appear reversed relative to dotted-quad form.
    let octets = bytes.to_le_bytes();
    let addr = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let port = u16::from_str_radix(port_hex, 16).ok()?;
    Some((addr, port))
}

fn parse_table(path: &Path) -> Vec<TableEntry> {
    let Ok(text) = fs::read_to_string(path) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for line in text.lines().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let Some((laddr, lport)) = hex_to_ipv4_port(fields[1]) else {
            continue;
        };
        let Some((raddr, rport)) = hex_to_ipv4_port(fields[2]) else {
            continue;
        };
        // Only rows with a remote endpoint matter to this agent.
        if raddr.is_unspecified() && rport == 0 {
            continue;
        }
        let status_code = fields[3].to_string();
        let Ok(inode) = fields[9].parse::<u64>() else {
            continue;
        };

        entries.push(TableEntry {
            laddr: laddr.to_string(),
            lport,
            raddr: raddr.to_string(),
            rport,
            status_code,
            inode,
        });
    }
    entries
}

/// Map socket inode -> owning pid, built by walking `/proc/<pid>/fd/*` and
/// resolving each `socket:[N]` symlink target.
fn inode_to_pid_map() -> HashMap<u64, u32> {
    let mut map = HashMap::new();
    let Ok(proc_entries) = fs::read_dir("/proc") else {
        return map;
    };

    for entry in proc_entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let fd_dir = entry.path().join("fd");
        let Ok(fds) = fs::read_dir(&fd_dir) else {
            continue;
        };
        for fd in fds.flatten() {
            if let Ok(target) = fs::read_link(fd.path()) {
                if let Some(name) = target.to_str() {
                    if let Some(inode_str) = name
                        .strip_prefix("socket:[")
                        .and_then(|s| s.strip_suffix(']'))
                    {
                        if let Ok(inode) = inode_str.parse::<u64>() {
                            map.insert(inode, pid);
                        }
                    }
                }
            }
        }
    }
    map
}

fn status_string(code: &str) -> String {
    match code {
        "01" => "ESTABLISHED",
        "02" => "SYN_SENT",
        "03" => "SYN_RECV",
        "04" => "FIN_WAIT1",
        "05" => "FIN_WAIT2",
        "06" => "TIME_WAIT",
        "07" => "CLOSE",
        "08" => "CLOSE_WAIT",
        "09" => "LAST_ACK",
        "0A" => "LISTEN",
        "0B" => "CLOSING",
        _ => "UNKNOWN",
    }
    .to_string()
}

/// Collect the raw TCP/UDP socket table from `/proc/net/*`, with remote
/// endpoints only, joined to owning pids. Returns an empty vector on any
/// non-Linux platform or if `/proc` is unreadable (e.g. insufficient
/// privilege), so callers can fall through to the `lsof` fallback.
pub fn collect(established_only: bool) -> Vec<RawSocket> {
    collect_from("/proc", established_only)
}

pub(crate) fn collect_from(proc_root: &str, established_only: bool) -> Vec<RawSocket> {
    let root = Path::new(proc_root);
    let tcp = parse_table(&root.join("net/tcp"));
    let udp = parse_table(&root.join("net/udp"));
    let inode_pid = inode_to_pid_map();

    let mut rows = Vec::new();
    for (entries, protocol) in [(tcp, "tcp"), (udp, "udp")] {
        for entry in entries {
            if protocol == "tcp" && established_only && entry.status_code != TCP_ESTABLISHED {
                continue;
            }
            let Some(&pid) = inode_pid.get(&entry.inode) else {
                continue;
            };
            rows.push(RawSocket {
                pid,
                laddr: entry.laddr,
                lport: entry.lport,
                raddr: entry.raddr,
                rport: entry.rport,
                protocol: protocol.to_string(),
                status: status_string(&entry.status_code),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_ipv4_and_port() {
        // 100007F = 127.0.0.1 little-endian octets, 1F90 = 8080
        let (addr, port) = hex_to_ipv4_port("0100007F:1F90").unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1");
        assert_eq!(port, 8080);
    }

    #[test]
    fn status_codes_map_to_names() {
        assert_eq!(status_string("01"), "ESTABLISHED");
        assert_eq!(status_string("0A"), "LISTEN");
        assert_eq!(status_string("FF"), "UNKNOWN");
    }

    #[test]
    fn missing_proc_tables_yield_empty_result() {
        let rows = collect_from("/nonexistent-proc-root", false);
        assert!(rows.is_empty());
    }
}
