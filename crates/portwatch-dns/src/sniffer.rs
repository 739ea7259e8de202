//! Passive DNS sniffer
//!
//! Owns a single long-lived `tcpdump -l -n udp port 53` child process, read
//! line-by-line on a dedicated blocking task. Query and response lines are
//! correlated by DNS transaction id; a successful correlation analyzes the
//! queried name and stores `{domain, analysis, ts}` under the resolved IPv4
//! address in a shared map. The rest of the system must keep functioning
//! with an empty map if the subprocess is unavailable or dies.

use crate::analyzer::analyze;
use crate::config::ConfigHandle;
use once_cell::sync::Lazy;
use portwatch_core::types::DnsAnalysis;
use regex::Regex;
use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const ENTRY_TTL: Duration = Duration::from_secs(3600);
const MAX_PENDING_TRANSACTIONS: usize = 1000;

static QUERY_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r": (\d+)\+? A\? ([A-Za-z0-9._-]+)\.?").unwrap());
static RESPONSE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r": (\d+) .* A (\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})").unwrap());

struct DnsEntry {
    domain: String,
    analysis: DnsAnalysis,
    ts: Instant,
}

/// Shared `ip -> {domain, analysis, ts}` map, written by the sniffer thread
/// and read by tick workers. Entries older than [`ENTRY_TTL`] are evicted
/// lazily on read rather than by a background sweep.
#[derive(Clone, Default)]
pub struct DnsMap {
    inner: Arc<Mutex<HashMap<String, DnsEntry>>>,
}

impl DnsMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, ip: String, domain: String, analysis: DnsAnalysis) {
        let mut map = self.inner.lock().expect("dns map lock poisoned");
        map.insert(
            ip,
            DnsEntry {
                domain,
                analysis,
                ts: Instant::now(),
            },
        );
    }

    /// Look up `ip`, evicting it (and nothing else) if stale. Returns the
    /// bound domain and its risk analysis.
    pub fn lookup(&self, ip: &str) -> Option<(String, DnsAnalysis)> {
        let mut map = self.inner.lock().expect("dns map lock poisoned");
        let stale = map
            .get(ip)
            .map(|e| e.ts.elapsed() >= ENTRY_TTL)
            .unwrap_or(false);
        if stale {
            map.remove(ip);
            return None;
        }
        map.get(ip).map(|e| (e.domain.clone(), e.analysis.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("dns map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Whether the sniffer's subprocess is running or has given up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnifferState {
    Running,
    Stopped,
}

/// Passive DNS sniffer. Spawns `tcpdump` on a blocking task; publishes into
/// a [`DnsMap`] shared with the rest of the pipeline.
pub struct DnsSniffer {
    map: DnsMap,
    state: Arc<Mutex<SnifferState>>,
}

impl DnsSniffer {
    pub fn new(map: DnsMap) -> Self {
        Self {
            map,
            state: Arc::new(Mutex::new(SnifferState::Stopped)),
        }
    }

    pub fn map(&self) -> DnsMap {
        self.map.clone()
    }

    pub fn state(&self) -> SnifferState {
        *self.state.lock().expect("sniffer state lock poisoned")
    }

    /// Start the capture subprocess on a dedicated blocking thread. Returns
    /// immediately; failures are logged and the sniffer transitions to
    /// [`SnifferState::Stopped`] without affecting the rest of the system.
    pub fn start(&self, config: Arc<ConfigHandle>) {
        let map = self.map.clone();
        let state = Arc::clone(&self.state);
        std::thread::spawn(move || run_capture(map, config, state));
    }
}

fn run_capture(map: DnsMap, config: Arc<ConfigHandle>, state: Arc<Mutex<SnifferState>>) {
    let child = Command::new("tcpdump")
        .args(["-l", "-n", "udp", "port", "53"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();

    let mut child = match child {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("DNS sniffer: failed to spawn tcpdump: {e}");
            *state.lock().expect("sniffer state lock poisoned") = SnifferState::Stopped;
            return;
        }
    };

    *state.lock().expect("sniffer state lock poisoned") = SnifferState::Running;

    let stdout = match child.stdout.take() {
        Some(s) => s,
        None => {
            tracing::warn!("DNS sniffer: tcpdump produced no stdout pipe");
            *state.lock().expect("sniffer state lock poisoned") = SnifferState::Stopped;
            return;
        }
    };

    let mut pending: HashMap<String, String> = HashMap::new();
    let reader = BufReader::new(stdout);

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!("DNS sniffer: read error: {e}");
                break;
            }
        };

        if let Some(caps) = QUERY_LINE.captures(&line) {
            let txid = caps[1].to_string();
            let qname = caps[2].to_string();
            if pending.len() >= MAX_PENDING_TRANSACTIONS {
                pending.clear();
            }
            pending.insert(txid, qname);
            continue;
        }

        if let Some(caps) = RESPONSE_LINE.captures(&line) {
            let txid = caps[1].to_string();
            let ip = caps[2].to_string();
            if let Some(qname) = pending.get(&txid).cloned() {
                let analysis = analyze(&qname, &config.get());
                map.insert(ip, qname, analysis);
            }
        }
    }

    tracing::warn!("DNS sniffer: tcpdump exited, DNS enrichment disabled");
    *state.lock().expect("sniffer state lock poisoned") = SnifferState::Stopped;
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_core::types::DnsRiskLevel;

    fn sample_analysis() -> DnsAnalysis {
        DnsAnalysis {
            domain: "example.com".to_string(),
            score: 0,
            risk: DnsRiskLevel::Safe,
            reasons: vec![],
            entropy: 0.0,
        }
    }

    #[test]
    fn query_line_pattern_extracts_txid_and_name() {
        let line = "12:00:00.000000 IP 10.0.0.1.5353 > 8.8.8.8.53: 1234+ A? example.com.";
        let caps = QUERY_LINE.captures(line).unwrap();
        assert_eq!(&caps[1], "1234");
        assert_eq!(&caps[2], "example.com");
    }

    #[test]
    fn response_line_pattern_extracts_txid_and_ip() {
        let line = "12:00:00.100000 IP 8.8.8.8.53 > 10.0.0.1.5353: 1234 1/0/0 A 93.184.216.34";
        let caps = RESPONSE_LINE.captures(line).unwrap();
        assert_eq!(&caps[1], "1234");
        assert_eq!(&caps[2], "93.184.216.34");
    }

    #[test]
    fn map_lookup_returns_inserted_entry() {
        let map = DnsMap::new();
        map.insert(
            "93.184.216.34".to_string(),
            "example.com".to_string(),
            sample_analysis(),
        );
        let (domain, _) = map.lookup("93.184.216.34").unwrap();
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn map_lookup_misses_unknown_ip() {
        let map = DnsMap::new();
        assert!(map.lookup("1.2.3.4").is_none());
    }
}
