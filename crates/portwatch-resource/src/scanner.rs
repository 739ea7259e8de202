//! Resource Scanner
//!
//! Samples every running process each sweep and assigns a threat score
//! orthogonal to the connection risk score: CPU/RSS pressure, unsigned
//! binaries, execution from a temp directory, and -- the signature the
//! sweep exists to catch -- sustained high-throughput disk writes paired
//! with high CPU, which reads as ransomware-style bulk encryption.

use portwatch_signing::SigningCache;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;
use sysinfo::{Pid, System};

const CPU_HIGH: f32 = 70.0;
const CPU_ELEVATED: f32 = 50.0;
const RSS_HIGH: u64 = 1024 * 1024 * 1024;
const RSS_ELEVATED: u64 = 512 * 1024 * 1024;
const WRITE_RANSOMWARE_BYTES_PER_SEC: f64 = 50.0 * 1024.0 * 1024.0;
const WRITE_ELEVATED_BYTES_PER_SEC: f64 = 20.0 * 1024.0 * 1024.0;
const CPU_RANSOMWARE: f32 = 40.0;
const CPU_WRITE_ELEVATED: f32 = 30.0;
const THREAT_THRESHOLD: i32 = 4;

const TEMP_DIR_PREFIXES: &[&str] = &["/tmp", "/var/tmp", "/dev/shm"];

/// One process's threat assessment for a single sweep.
#[derive(Debug, Clone)]
pub struct ThreatRecord {
    pub pid: u32,
    pub name: String,
    pub score: i32,
    pub reasons: Vec<String>,
    pub cpu_percent: f32,
    pub rss_bytes: u64,
    pub write_bytes_per_sec: f64,
}

impl ThreatRecord {
    pub fn is_threat(&self) -> bool {
        self.score >= THREAT_THRESHOLD
    }
}

struct WriteSample {
    ts: Instant,
    total_written_bytes: u64,
}

/// Periodic per-process resource sampler. Owns its own `sysinfo::System`
/// rather than sharing the signing cache's process table, since it needs
/// disk-usage counters the signing cache does not track.
pub struct ResourceScanner {
    system: Mutex<System>,
    last_write: Mutex<HashMap<u32, WriteSample>>,
    self_pid: u32,
    self_protection: bool,
}

impl ResourceScanner {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            last_write: Mutex::new(HashMap::new()),
            self_pid: std::process::id(),
            self_protection: true,
        }
    }

    pub fn set_self_protection(&mut self, enabled: bool) {
        self.self_protection = enabled;
    }

    /// Run one sweep, returning a threat record per process that scored
    /// above zero. Self and self-ancestry are excluded entirely when
    /// self-protection is enabled.
    pub async fn sweep(&self, signing: &SigningCache) -> Vec<ThreatRecord> {
        let now = Instant::now();
        let snapshot: Vec<(u32, String, Option<String>, f32, u64, u64, bool)> = {
            let mut sys = self.system.lock().expect("resource scanner lock poisoned");
            sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

            let ancestry = if self.self_protection {
                self_ancestry(&sys, self.self_pid)
            } else {
                Default::default()
            };

            sys.processes()
                .iter()
                .filter(|(pid, _)| {
                    !self.self_protection || !ancestry.contains(&pid.as_u32())
                })
                .map(|(pid, proc_)| {
                    let disk = proc_.disk_usage();
                    (
                        pid.as_u32(),
                        proc_.name().to_string_lossy().to_string(),
                        proc_.exe().map(|p| p.display().to_string()),
                        proc_.cpu_usage(),
                        proc_.memory(),
                        disk.written_bytes,
                        true,
                    )
                })
                .collect()
        };

        let live_pids: std::collections::HashSet<u32> =
            snapshot.iter().map(|(pid, ..)| *pid).collect();

        let mut records = Vec::new();
        for (pid, name, exe_path, cpu_percent, rss_bytes, written_bytes, _) in snapshot {
            let write_bytes_per_sec = self.write_throughput(pid, now, written_bytes);

            let mut score = 0i32;
            let mut reasons = Vec::new();

            if cpu_percent > CPU_HIGH {
                score += 3;
                reasons.push("high CPU".to_string());
            } else if cpu_percent > CPU_ELEVATED {
                score += 1;
                reasons.push("elevated CPU".to_string());
            }

            if rss_bytes > RSS_HIGH {
                score += 2;
                reasons.push("high RSS".to_string());
            } else if rss_bytes > RSS_ELEVATED {
                score += 1;
                reasons.push("elevated RSS".to_string());
            }

            if let Some(path) = &exe_path {
                let verdict = signing.verdict(path).await;
                if !verdict.signed && !verdict.apple {
                    score += 2;
                    reasons.push("unsigned".to_string());
                }
                if TEMP_DIR_PREFIXES.iter().any(|p| path.starts_with(p)) {
                    score += 3;
                    reasons.push("executing from temp dir".to_string());
                }
            }

            if write_bytes_per_sec > WRITE_RANSOMWARE_BYTES_PER_SEC && cpu_percent > CPU_RANSOMWARE
            {
                score += 5;
                reasons.push("RANSOMWARE".to_string());
            } else if write_bytes_per_sec > WRITE_ELEVATED_BYTES_PER_SEC
                && cpu_percent > CPU_WRITE_ELEVATED
            {
                score += 2;
                reasons.push("elevated write throughput".to_string());
            }

            if score > 0 {
                records.push(ThreatRecord {
                    pid,
                    name,
                    score,
                    reasons,
                    cpu_percent,
                    rss_bytes,
                    write_bytes_per_sec,
                });
            }
        }

        self.evict_vanished(&live_pids);
        records
    }

    fn write_throughput(&self, pid: u32, now: Instant, total_written_bytes: u64) -> f64 {
        let mut last_write = self.last_write.lock().expect("write-sample lock poisoned");
        let rate = match last_write.get(&pid) {
            Some(prev) => {
                let dt = now.duration_since(prev.ts).as_secs_f64();
                if dt > 0.0 && total_written_bytes >= prev.total_written_bytes {
                    (total_written_bytes - prev.total_written_bytes) as f64 / dt
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        last_write.insert(
            pid,
            WriteSample {
                ts: now,
                total_written_bytes,
            },
        );
        rate
    }

    fn evict_vanished(&self, live_pids: &std::collections::HashSet<u32>) {
        self.last_write
            .lock()
            .expect("write-sample lock poisoned")
            .retain(|pid, _| live_pids.contains(pid));
    }
}

impl Default for ResourceScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn self_ancestry(sys: &System, self_pid: u32) -> std::collections::HashSet<u32> {
    let mut ancestry = std::collections::HashSet::new();
    ancestry.insert(self_pid);
    let mut current = Pid::from_u32(self_pid);
    while let Some(proc_) = sys.process(current) {
        let Some(parent) = proc_.parent() else {
            break;
        };
        if !ancestry.insert(parent.as_u32()) {
            break;
        }
        current = parent;
    }
    ancestry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_threshold_matches_spec_table() {
        let record = ThreatRecord {
            pid: 1,
            name: "x".to_string(),
            score: 4,
            reasons: vec![],
            cpu_percent: 0.0,
            rss_bytes: 0,
            write_bytes_per_sec: 0.0,
        };
        assert!(record.is_threat());
        let mut below = record.clone();
        below.score = 3;
        assert!(!below.is_threat());
    }

    #[tokio::test]
    async fn sweep_does_not_panic_on_a_fresh_scanner() {
        let scanner = ResourceScanner::new();
        let signing = SigningCache::new();
        let records = scanner.sweep(&signing).await;
        // Nothing asserted about contents -- sandboxed CI hosts vary --
        // only that a full sweep over the live process table completes.
        let _ = records.len();
    }
}
