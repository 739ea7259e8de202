//! Orchestrator
//!
//! Drives the periodic tick: enumerate connections, score them, run the
//! Alert Engine, apply deny/paranoid kills, and broadcast a snapshot to
//! subscribers. A second, slower task runs the Resource Scanner while
//! paranoid mode is on.

use crate::net::NetSampler;
use chrono::Utc;
use portwatch_alerts::{AlertEngine, Decision};
use portwatch_connections::ConnectionEnumerator;
use portwatch_core::types::{KillKind, KillRecord, Level, RuleAction, Scope, Snapshot};
use portwatch_dns::DnsMap;
use portwatch_enforcement::{Enforcement, EnforcementOutcome};
use portwatch_reputation::ReputationCache;
use portwatch_resource::ResourceScanner;
use portwatch_rules::RuleStore;
use portwatch_signing::{ProcessTable, SigningCache};
use std::collections::VecDeque;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const KILL_HISTORY_CAPACITY: usize = 50;
const SNAPSHOT_KILL_WINDOW: usize = 20;
const RESOURCE_SCAN_INTERVAL: Duration = Duration::from_secs(3);

pub struct Orchestrator {
    enumerator: ConnectionEnumerator,
    reputation: Arc<ReputationCache>,
    resource_scanner: ResourceScanner,
    signing: Arc<SigningCache>,
    rules: Arc<RuleStore>,
    alerts: Arc<AlertEngine>,
    enforcement: Arc<Enforcement>,
    paranoid: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    kill_history: Mutex<VecDeque<KillRecord>>,
    net_sampler: Mutex<NetSampler>,
    broadcaster: tokio::sync::broadcast::Sender<Snapshot>,
}

impl Orchestrator {
    pub fn new(
        processes: Arc<ProcessTable>,
        signing: Arc<SigningCache>,
        dns_map: DnsMap,
        reputation: Arc<ReputationCache>,
        rules: Arc<RuleStore>,
        alerts: Arc<AlertEngine>,
        enforcement: Arc<Enforcement>,
    ) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(16);
        Self {
            enumerator: ConnectionEnumerator::new(processes, Arc::clone(&signing), dns_map),
            reputation,
            resource_scanner: ResourceScanner::new(),
            signing,
            rules,
            alerts,
            enforcement,
            paranoid: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
            kill_history: Mutex::new(VecDeque::with_capacity(KILL_HISTORY_CAPACITY)),
            net_sampler: Mutex::new(NetSampler::new()),
            broadcaster: tx,
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Snapshot> {
        self.broadcaster.subscribe()
    }

    pub fn set_paranoid(&self, enabled: bool) {
        self.paranoid.store(enabled, Ordering::SeqCst);
    }

    pub fn paranoid(&self) -> bool {
        self.paranoid.load(Ordering::SeqCst)
    }

    pub fn clear_killed_history(&self) {
        self.kill_history.lock().expect("kill history lock poisoned").clear();
    }

    pub fn rules(&self) -> &Arc<RuleStore> {
        &self.rules
    }

    pub fn alerts(&self) -> &Arc<AlertEngine> {
        &self.alerts
    }

    pub fn enforcement(&self) -> &Arc<Enforcement> {
        &self.enforcement
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Run the tick loop until [`Orchestrator::shutdown`] is called.
    pub async fn run(self: Arc<Self>, tick_interval: Duration) {
        while !self.shutdown.load(Ordering::SeqCst) {
            self.tick().await;
            tokio::time::sleep(tick_interval).await;
        }
    }

    /// Run the resource-scanner side task until shutdown. Only performs
    /// work while paranoid mode is enabled.
    pub async fn run_resource_scanner(self: Arc<Self>) {
        while !self.shutdown.load(Ordering::SeqCst) {
            tokio::time::sleep(RESOURCE_SCAN_INTERVAL).await;
            if !self.paranoid() {
                continue;
            }
            let threats = self.resource_scanner.sweep(&self.signing).await;
            for threat in threats {
                if !threat.is_threat() {
                    continue;
                }
                let outcome = self.enforcement.kill_group(threat.pid);
                if outcome.is_ok() {
                    self.record_kill(KillRecord {
                        timestamp: Utc::now(),
                        pid: threat.pid,
                        process_name: threat.name.clone(),
                        reason: threat.reasons.join(", "),
                        kind: KillKind::Resource,
                        level: None,
                        score: Some(threat.score as f64),
                        destination: None,
                        port: None,
                    });
                } else {
                    tracing::warn!(
                        "resource scanner: failed to kill threat pid {}: {outcome:?}",
                        threat.pid
                    );
                }
            }
        }
    }

    async fn tick(&self) {
        let mut rows = self.enumerator.collect(false).await;
        let net_speed = self.net_sampler.lock().expect("net sampler lock poisoned").sample();

        for row in rows.iter_mut() {
            if let Ok(addr) = IpAddr::from_str(&row.raddr) {
                if portwatch_core::ip::is_public_ip(&addr) {
                    self.reputation.clone().enrich_async(row.raddr.clone());
                    row.reputation_score = self.reputation.get(&row.raddr);
                    row.reputation_status = self.reputation.status();
                    row.country = self.reputation.country(&row.raddr);
                }
            }

            portwatch_scorer::score(row);
            portwatch_scorer::apply_reputation(row);

            match self.alerts.process(row).await {
                Ok(Decision::Deny) => {
                    let outcome = self.enforcement.kill_group(row.pid);
                    if outcome.is_ok() {
                        row.killed = true;
                        self.record_kill(KillRecord {
                            timestamp: Utc::now(),
                            pid: row.pid,
                            process_name: row.process.clone(),
                            reason: "deny rule matched".to_string(),
                            kind: KillKind::Block,
                            level: Some(row.level),
                            score: Some(row.score),
                            destination: Some(row.raddr.clone()),
                            port: Some(row.rport),
                        });
                    }
                }
                Ok(Decision::Allow) | Ok(Decision::Ask) => {}
                Err(e) => {
                    tracing::warn!("alert engine error for pid {}: {e}", row.pid);
                }
            }

            if !row.killed && self.paranoid() && row.level >= Level::Medium {
                let outcome = self.enforcement.kill_group(row.pid);
                if outcome.is_ok() {
                    row.killed = true;
                    row.status = "KILLED".to_string();
                    self.record_kill(KillRecord {
                        timestamp: Utc::now(),
                        pid: row.pid,
                        process_name: row.process.clone(),
                        reason: row.reasons.join(", "),
                        kind: KillKind::Network,
                        level: Some(row.level),
                        score: Some(row.score),
                        destination: Some(row.raddr.clone()),
                        port: Some(row.rport),
                    });
                } else {
                    tracing::warn!(
                        "paranoid mode: failed to kill pid {} ({}): {outcome:?}",
                        row.pid,
                        row.process
                    );
                }
            }
        }

        portwatch_scorer::sort_rows(&mut rows);
        self.alerts.reap_resolved();

        let snapshot = Snapshot {
            ts: now_seconds(),
            rows,
            net_speed,
            pending_alerts: self.alerts.pending_alerts(),
            killed_processes: self.recent_kills(),
        };

        // A send error just means no subscribers are attached right now.
        let _ = self.broadcaster.send(snapshot);
    }

    fn record_kill(&self, record: KillRecord) {
        let mut history = self.kill_history.lock().expect("kill history lock poisoned");
        history.push_front(record);
        while history.len() > KILL_HISTORY_CAPACITY {
            history.pop_back();
        }
    }

    fn recent_kills(&self) -> Vec<KillRecord> {
        self.kill_history
            .lock()
            .expect("kill history lock poisoned")
            .iter()
            .take(SNAPSHOT_KILL_WINDOW)
            .cloned()
            .collect()
    }

    /// Decide a pending alert, proxied from the web façade / CLI.
    pub async fn decide_alert(
        &self,
        alert_id: &str,
        action: RuleAction,
        scope: Scope,
    ) -> portwatch_core::Result<bool> {
        self.alerts.decide(alert_id, action, scope).await
    }

    /// Wipe all persistent rules/config and in-memory caches.
    pub async fn factory_reset(&self) -> portwatch_core::Result<()> {
        self.rules.wipe().await?;
        self.alerts.clear_cache();
        self.clear_killed_history();
        Ok(())
    }
}

fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_alerts::NoopNotifier;

    async fn build_orchestrator() -> Orchestrator {
        let rules = Arc::new(RuleStore::in_memory().await.unwrap());
        let alerts = Arc::new(AlertEngine::new(Arc::clone(&rules), Arc::new(NoopNotifier)));
        Orchestrator::new(
            Arc::new(ProcessTable::new()),
            Arc::new(SigningCache::new()),
            DnsMap::new(),
            Arc::new(ReputationCache::new(Arc::new(NoCredential))),
            rules,
            alerts,
            Arc::new(Enforcement::new()),
        )
    }

    struct NoCredential;

    #[async_trait::async_trait]
    impl portwatch_secrets::ReputationCredential for NoCredential {
        async fn api_key(&self) -> Option<portwatch_secrets::SecretString> {
            None
        }
    }

    #[tokio::test]
    async fn paranoid_mode_defaults_off() {
        let orchestrator = build_orchestrator().await;
        assert!(!orchestrator.paranoid());
        orchestrator.set_paranoid(true);
        assert!(orchestrator.paranoid());
    }

    #[tokio::test]
    async fn factory_reset_clears_state() {
        let orchestrator = build_orchestrator().await;
        orchestrator.set_paranoid(true);
        orchestrator.factory_reset().await.unwrap();
        assert!(orchestrator.alerts.pending_alerts().is_empty());
    }
}
