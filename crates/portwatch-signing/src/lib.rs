//! Process/Signing Cache
//!
//! Resolves a pid to process attributes (name, user, exe path, cpu%, rss)
//! and an executable path to a code-signing verdict. Verdicts are
//! TTL-cached per exe path; the external-tool invocations that produce
//! them (`codesign`, `spctl`, `xattr`) each carry their own timeout so a
//! hung subprocess never stalls a tick.

use portwatch_core::types::SigningVerdict;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, System};
use tokio::process::Command;
use tokio::time::timeout;

const VERDICT_TTL: Duration = Duration::from_secs(300);
const SIGNING_TIMEOUT: Duration = Duration::from_secs(2);
const XATTR_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub user: String,
    pub exe_path: Option<String>,
    pub parent: Option<String>,
    pub cpu_percent: f32,
    pub rss_bytes: u64,
}

impl ProcessInfo {
    fn unknown(pid: u32) -> Self {
        Self {
            pid,
            name: "?".to_string(),
            user: "?".to_string(),
            exe_path: None,
            parent: None,
            cpu_percent: 0.0,
            rss_bytes: 0,
        }
    }
}

/// Thin wrapper around `sysinfo::System`, refreshed once per caller-driven
/// sweep rather than continuously, to keep CPU% samples meaningful.
pub struct ProcessTable {
    system: Mutex<System>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    /// Refresh the process list. Call once per tick before looking up pids.
    pub fn refresh(&self) {
        let mut sys = self.system.lock().expect("process table lock poisoned");
        sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
    }

    pub fn lookup(&self, pid: u32) -> ProcessInfo {
        let sys = self.system.lock().expect("process table lock poisoned");
        let Some(proc_) = sys.process(Pid::from_u32(pid)) else {
            return ProcessInfo::unknown(pid);
        };

        let parent = proc_
            .parent()
            .and_then(|ppid| sys.process(ppid))
            .map(|p| p.name().to_string_lossy().to_string());

        ProcessInfo {
            pid,
            name: proc_.name().to_string_lossy().to_string(),
            user: proc_
                .user_id()
                .map(|u| format!("{:?}", u))
                .unwrap_or_else(|| "?".to_string()),
            exe_path: proc_.exe().map(|p| p.display().to_string()),
            parent,
            cpu_percent: proc_.cpu_usage(),
            rss_bytes: proc_.memory(),
        }
    }
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

struct CachedVerdict {
    captured_at: Instant,
    verdict: SigningVerdict,
}

/// TTL-cached code-signing verdicts per executable path.
pub struct SigningCache {
    cache: Mutex<HashMap<String, CachedVerdict>>,
}

impl SigningCache {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn verdict(&self, exe_path: &str) -> SigningVerdict {
        if let Some(cached) = self.cached(exe_path) {
            return cached;
        }

        if !std::path::Path::new(exe_path).exists() {
            return SigningVerdict::negative();
        }

        let verdict = compute_verdict(exe_path).await;
        self.cache.lock().expect("signing cache lock poisoned").insert(
            exe_path.to_string(),
            CachedVerdict {
                captured_at: Instant::now(),
                verdict: verdict.clone(),
            },
        );
        verdict
    }

    fn cached(&self, exe_path: &str) -> Option<SigningVerdict> {
        let cache = self.cache.lock().expect("signing cache lock poisoned");
        let entry = cache.get(exe_path)?;
        if entry.captured_at.elapsed() < VERDICT_TTL {
            Some(entry.verdict.clone())
        } else {
            None
        }
    }
}

impl Default for SigningCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "macos")]
async fn compute_verdict(exe_path: &str) -> SigningVerdict {
    let codesign = run_timeout(
        Command::new("codesign").args(["-dv", "--verbose=4", exe_path]),
        SIGNING_TIMEOUT,
    )
    .await;

    let (signed, apple, authorities) = match codesign {
        Some(output) => {
            let text = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
            let signed = !text.contains("Signature=adhoc")
                && (text.contains("Authority=") || text.contains("CodeDirectory v="));
            let authorities: Vec<String> = text
                .lines()
                .filter(|l| l.starts_with("Authority="))
                .map(|l| l.trim_start_matches("Authority=").to_string())
                .collect();
            let apple = authorities.iter().any(|a| a.contains("Apple"));
            (signed, apple, authorities)
        }
        None => (false, false, Vec::new()),
    };

    let notarized = match run_timeout(
        Command::new("spctl").args(["-a", "-vv", exe_path]),
        SIGNING_TIMEOUT,
    )
    .await
    {
        Some(output) => {
            let text = format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )
            .to_lowercase();
            text.contains("accepted")
                && (text.contains("notarized")
                    || text.contains("developer id")
                    || text.contains("source=apple"))
        }
        None => false,
    };

    let quarantine = match run_timeout(
        Command::new("xattr").args(["-p", "com.apple.quarantine", exe_path]),
        XATTR_TIMEOUT,
    )
    .await
    {
        Some(output) => output.status.success() && !output.stdout.is_empty(),
        None => false,
    };

    SigningVerdict {
        signed,
        apple,
        notarized,
        quarantine,
        authorities,
    }
}

#[cfg(not(target_os = "macos"))]
async fn compute_verdict(_exe_path: &str) -> SigningVerdict {
    SigningVerdict::unknown_platform()
}

#[cfg(target_os = "macos")]
async fn run_timeout(
    cmd: &mut Command,
    dur: Duration,
) -> Option<std::process::Output> {
    match timeout(dur, cmd.output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            tracing::warn!("external signing tool failed: {e}");
            None
        }
        Err(_) => {
            tracing::warn!("external signing tool timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_negative_and_uncached() {
        let cache = SigningCache::new();
        let v1 = cache.verdict("/nonexistent/path/to/binary").await;
        assert!(!v1.signed);
        assert!(cache.cached("/nonexistent/path/to/binary").is_none());
    }

    #[test]
    fn unknown_platform_verdict_is_not_unsigned_penalized() {
        let v = SigningVerdict::unknown_platform();
        assert!(v.signed);
        assert!(!v.apple);
    }

    #[test]
    fn process_table_returns_sentinel_for_unknown_pid() {
        let table = ProcessTable::new();
        table.refresh();
        let info = table.lookup(u32::MAX);
        assert_eq!(info.name, "?");
    }
}
