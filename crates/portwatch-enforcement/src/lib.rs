//! Enforcement
//!
//! Process termination primitives -- graceful stop, forced kill,
//! process-group kill, and recursive descendant-tree kill -- each guarded
//! by self-protection so the agent can never be made to terminate itself
//! or its own ancestry.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use sysinfo::{Pid, System};

/// Result of one enforcement operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementOutcome {
    Ok,
    PermissionDenied,
    NotFound,
    Protected,
    Error(String),
}

impl EnforcementOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, EnforcementOutcome::Ok)
    }
}

pub struct Enforcement {
    system: Mutex<System>,
    self_pid: u32,
    self_protection: bool,
}

impl Enforcement {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            self_pid: std::process::id(),
            self_protection: true,
        }
    }

    pub fn set_self_protection(&mut self, enabled: bool) {
        self.self_protection = enabled;
    }

    /// Send a graceful-terminate signal.
    pub fn stop(&self, pid: u32) -> EnforcementOutcome {
        if self.is_protected(pid) {
            return EnforcementOutcome::Protected;
        }
        platform::terminate(pid)
    }

    /// Send a forced-terminate signal.
    pub fn kill(&self, pid: u32) -> EnforcementOutcome {
        if self.is_protected(pid) {
            return EnforcementOutcome::Protected;
        }
        platform::kill(pid)
    }

    /// Resolve the process group of `pid` and force-terminate every
    /// member. Refuses if the group is the agent's own.
    pub fn kill_group(&self, pid: u32) -> EnforcementOutcome {
        if self.is_protected(pid) {
            return EnforcementOutcome::Protected;
        }

        let pgid = match platform::process_group(pid) {
            Ok(pgid) => pgid,
            Err(outcome) => return outcome,
        };

        if self.self_protection {
            if let Ok(own_pgid) = platform::process_group(self.self_pid) {
                if own_pgid == pgid {
                    return EnforcementOutcome::Protected;
                }
            }
        }

        platform::kill_group(pgid)
    }

    /// Recursively enumerate descendants of `pid`, force-terminate each
    /// leaf-first by parent-chain depth, then the root itself.
    pub fn kill_tree(&self, pid: u32) -> EnforcementOutcome {
        if self.is_protected(pid) {
            return EnforcementOutcome::Protected;
        }

        let order = {
            let mut sys = self.system.lock().expect("enforcement process table lock poisoned");
            sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);
            leaves_first_order(&sys, pid)
        };

        if order.is_empty() {
            return platform::kill(pid);
        }

        for descendant in &order {
            if *descendant == pid {
                continue;
            }
            let outcome = platform::kill(*descendant);
            if !outcome.is_ok() && outcome != EnforcementOutcome::NotFound {
                tracing::warn!("kill_tree: failed to kill descendant {descendant}: {outcome:?}");
            }
        }

        platform::kill(pid)
    }

    fn is_protected(&self, pid: u32) -> bool {
        if !self.self_protection {
            return false;
        }
        if pid == self.self_pid {
            return true;
        }
        let sys = self.system.lock().expect("enforcement process table lock poisoned");
        self_ancestry(&sys, self.self_pid).contains(&pid)
    }
}

impl Default for Enforcement {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first descendants of `pid`, ordered leaves-first so a parent is
/// only ever killed after all of its children.
fn leaves_first_order(sys: &System, pid: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (candidate_pid, proc_) in sys.processes() {
        if let Some(parent) = proc_.parent() {
            children.entry(parent.as_u32()).or_default().push(candidate_pid.as_u32());
        }
    }

    let mut order = Vec::new();
    let mut stack = vec![pid];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if !visited.insert(current) {
            continue;
        }
        if let Some(kids) = children.get(&current) {
            for &kid in kids {
                stack.push(kid);
            }
        }
        order.push(current);
    }
    // Reverse post-order-ish: deepest pushed last, so killing in reverse
    // insertion order kills leaves before their parents. Simpler: sort by
    // depth descending.
    let depth = |target: u32| -> u32 {
        let mut d = 0;
        let mut cur = target;
        while let Some(proc_) = sys.process(Pid::from_u32(cur)) {
            let Some(parent) = proc_.parent() else { break };
            if parent.as_u32() == cur {
                break;
            }
            cur = parent.as_u32();
            d += 1;
            if cur == pid {
                break;
            }
        }
        d
    };
    order.sort_by_key(|p| std::cmp::Reverse(depth(*p)));
    order
}

fn self_ancestry(sys: &System, self_pid: u32) -> HashSet<u32> {
    let mut ancestry = HashSet::new();
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

#[cfg(unix)]
mod platform {
    use super::EnforcementOutcome;
    use nix::errno::Errno;
    use nix::sys::signal::{kill as nix_kill, Signal};
    use nix::unistd::{getpgid, Pid as NixPid};

    pub fn terminate(pid: u32) -> EnforcementOutcome {
        signal(pid, Signal::SIGTERM)
    }

    pub fn kill(pid: u32) -> EnforcementOutcome {
        signal(pid, Signal::SIGKILL)
    }

    fn signal(pid: u32, sig: Signal) -> EnforcementOutcome {
        match nix_kill(NixPid::from_raw(pid as i32), sig) {
            Ok(()) => EnforcementOutcome::Ok,
            Err(Errno::ESRCH) => EnforcementOutcome::NotFound,
            Err(Errno::EPERM) => EnforcementOutcome::PermissionDenied,
            Err(e) => EnforcementOutcome::Error(e.to_string()),
        }
    }

    pub fn process_group(pid: u32) -> Result<i32, EnforcementOutcome> {
        match getpgid(Some(NixPid::from_raw(pid as i32))) {
            Ok(pgid) => Ok(pgid.as_raw()),
            Err(Errno::ESRCH) => Err(EnforcementOutcome::NotFound),
            Err(Errno::EPERM) => Err(EnforcementOutcome::PermissionDenied),
            Err(e) => Err(EnforcementOutcome::Error(e.to_string())),
        }
    }

    pub fn kill_group(pgid: i32) -> EnforcementOutcome {
        signal_raw(-pgid, Signal::SIGKILL)
    }

    fn signal_raw(raw_pid: i32, sig: Signal) -> EnforcementOutcome {
        match nix_kill(NixPid::from_raw(raw_pid), sig) {
            Ok(()) => EnforcementOutcome::Ok,
            Err(Errno::ESRCH) => EnforcementOutcome::NotFound,
            Err(Errno::EPERM) => EnforcementOutcome::PermissionDenied,
            Err(e) => EnforcementOutcome::Error(e.to_string()),
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use super::EnforcementOutcome;

    pub fn terminate(_pid: u32) -> EnforcementOutcome {
        EnforcementOutcome::Error("enforcement is unsupported on this platform".to_string())
    }

    pub fn kill(_pid: u32) -> EnforcementOutcome {
        EnforcementOutcome::Error("enforcement is unsupported on this platform".to_string())
    }

    pub fn process_group(_pid: u32) -> Result<i32, EnforcementOutcome> {
        Err(EnforcementOutcome::Error(
            "enforcement is unsupported on this platform".to_string(),
        ))
    }

    pub fn kill_group(_pgid: i32) -> EnforcementOutcome {
        EnforcementOutcome::Error("enforcement is unsupported on this platform".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_always_protected() {
        let enforcement = Enforcement::new();
        assert_eq!(enforcement.stop(std::process::id()), EnforcementOutcome::Protected);
        assert_eq!(enforcement.kill(std::process::id()), EnforcementOutcome::Protected);
        assert_eq!(
            enforcement.kill_group(std::process::id()),
            EnforcementOutcome::Protected
        );
        assert_eq!(
            enforcement.kill_tree(std::process::id()),
            EnforcementOutcome::Protected
        );
    }

    #[test]
    fn self_protection_can_be_disabled_for_testing() {
        let mut enforcement = Enforcement::new();
        enforcement.set_self_protection(false);
        // Disabling self-protection is a deliberate operator choice; we
        // don't actually invoke a real signal in this test, only assert
        // the guard no longer short-circuits to Protected for a bogus pid.
        let outcome = enforcement.kill(u32::MAX);
        assert_ne!(outcome, EnforcementOutcome::Protected);
    }

    #[test]
    fn nonexistent_pid_reports_not_found() {
        let mut enforcement = Enforcement::new();
        enforcement.set_self_protection(false);
        let outcome = enforcement.kill(u32::MAX - 1);
        assert!(matches!(
            outcome,
            EnforcementOutcome::NotFound | EnforcementOutcome::PermissionDenied
        ));
    }
}
