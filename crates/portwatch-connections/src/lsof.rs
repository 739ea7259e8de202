//! Fallback enumeration strategy for platforms without a readable
//! `/proc/net` (macOS, or a sandboxed/restricted Linux). Streams
//! `lsof -i -P -n -F pcnTu` and reassembles its tag-prefixed, field-per-line
//! output into [`RawSocket`] records.
//!
//! `lsof`'s `-F` output groups fields under the pid that introduced them: a
//! `p<pid>` line starts a process block, a `c<command>` line names it, and
//! each following `n<name>`/`T<key>=<value>` pair describes one socket
//! owned by that pid. This is a small state machine over that stream
//! rather than a per-line regex, because the socket's owning pid and
//! protocol only appear once per block, not once per line.

use super::raw::RawSocket;
use std::process::Stdio;
use std::time::Duration;

const LSOF_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Block {
    pid: Option<u32>,
    protocol: String,
}

fn split_endpoint(field: &str) -> Option<(String, u16)> {
    portwatch_core::ip::split_host_port(field)
}

fn parse_name_field(name: &str) -> Option<(String, u16, String, u16)> {
    // Established: "laddr:lport->raddr:rport". Anything without "->" (listen
    // sockets, bare local endpoints) has no remote side and is not useful here.
    let (local, remote) = name.split_once("->")?;
    let (laddr, lport) = split_endpoint(local)?;
    let (raddr, rport) = split_endpoint(remote)?;
    Some((laddr, lport, raddr, rport))
}

/// Parse the raw `-F pcnTu` stream into raw socket records.
pub(crate) fn parse_field_output(text: &str) -> Vec<RawSocket> {
    let mut rows = Vec::new();
    let mut block = Block::default();
    let mut pending_name: Option<(String, u16, String, u16)> = None;

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }
        let (tag, value) = line.split_at(1);

        match tag {
            "p" => {
                block = Block::default();
                block.pid = value.parse::<u32>().ok();
                pending_name = None;
            }
            "c" => {
                // command name is resolved by the process table, not lsof;
                // nothing to record here.
            }
            "P" => {
                block.protocol = value.to_ascii_lowercase();
            }
            "n" => {
                pending_name = parse_name_field(value);
            }
            "T" => {
                // TST=<state> is the only T field we asked for.
                if let Some(state) = value.strip_prefix("ST=") {
                    if let (Some(pid), Some((laddr, lport, raddr, rport))) =
                        (block.pid, pending_name.clone())
                    {
                        rows.push(RawSocket {
                            pid,
                            laddr,
                            lport,
                            raddr,
                            rport,
                            protocol: if block.protocol.is_empty() {
                                "tcp".to_string()
                            } else {
                                block.protocol.clone()
                            },
                            status: state.to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    rows
}

/// Run `lsof -i -P -n -F pcnTu` with a timeout and parse its output.
/// Returns an empty vector if `lsof` is missing, times out, or fails --
/// the caller treats that identically to "no data available."
pub async fn collect() -> Vec<RawSocket> {
    let output = tokio::time::timeout(
        LSOF_TIMEOUT,
        tokio::process::Command::new("lsof")
            .args(["-i", "-P", "-n", "-F", "pcnTu"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output(),
    )
    .await;

    match output {
        Ok(Ok(out)) if out.status.success() || !out.stdout.is_empty() => {
            parse_field_output(&String::from_utf8_lossy(&out.stdout))
        }
        Ok(Ok(_)) => Vec::new(),
        Ok(Err(e)) => {
            tracing::warn!("lsof enumeration failed: {e}");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("lsof enumeration timed out");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_established_block() {
        let text = "p1234\ncbash\nftest\nPTCP\nn10.0.0.5:51000->93.184.216.34:443\nTST=ESTABLISHED\n";
        let rows = parse_field_output(text);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.pid, 1234);
        assert_eq!(row.raddr, "93.184.216.34");
        assert_eq!(row.rport, 443);
        assert_eq!(row.status, "ESTABLISHED");
        assert_eq!(row.protocol, "tcp");
    }

    #[test]
    fn skips_listen_only_sockets_without_remote_side() {
        let text = "p1\ncsshd\nn*:22\nTST=LISTEN\n";
        let rows = parse_field_output(text);
        assert!(rows.is_empty());
    }

    #[test]
    fn handles_multiple_blocks_for_different_pids() {
        let text = concat!(
            "p1\ncfoo\nn10.0.0.1:1->1.1.1.1:53\nTST=ESTABLISHED\n",
            "p2\ncbar\nn10.0.0.1:2->2.2.2.2:443\nTST=ESTABLISHED\n",
        );
        let rows = parse_field_output(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pid, 1);
        assert_eq!(rows[1].pid, 2);
    }
}
