//! Alert Engine
//!
//! Per-connection policy decision: consult the Rule Store first, then
//! fall back to interactive prompting gated by the alert settings. At
//! most one pending prompt exists per connection fingerprint; a decision
//! either materializes a rule (scope `always`/`temporary`) or resolves
//! just the one pending row (scope `once`, never persisted -- see the
//! `scope=once` resolution in SPEC_FULL.md's design notes).

use crate::notifier::Notifier;
use chrono::Utc;
use portwatch_core::fingerprint::connection_fingerprint;
use portwatch_core::types::{
    AlertSettings, AlertStatus, ConnectionRow, Level, PendingAlert, Rule, RuleAction, Scope,
};
use portwatch_core::Result;
use portwatch_rules::{NewRule, RuleStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

const RESOLVED_RETENTION: chrono::Duration = chrono::Duration::hours(24);

/// Outcome of processing one connection row through the Alert Engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Ask,
}

pub struct AlertEngine {
    rules: Arc<RuleStore>,
    settings: RwLock<AlertSettings>,
    pending: Mutex<HashMap<String, PendingAlert>>,
    last_notified: Mutex<HashMap<String, Instant>>,
    notifier: Arc<dyn Notifier>,
}

impl AlertEngine {
    pub fn new(rules: Arc<RuleStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            rules,
            settings: RwLock::new(AlertSettings::default()),
            pending: Mutex::new(HashMap::new()),
            last_notified: Mutex::new(HashMap::new()),
            notifier,
        }
    }

    pub fn settings(&self) -> AlertSettings {
        self.settings.read().expect("settings lock poisoned").clone()
    }

    pub fn set_settings(&self, new_settings: AlertSettings) {
        *self.settings.write().expect("settings lock poisoned") = new_settings;
    }

    /// Process one row: rule match first, then interactive escalation.
    pub async fn process(&self, row: &ConnectionRow) -> Result<Decision> {
        if let Some(rule) = self.matching_rule(row).await? {
            return Ok(match rule.action {
                RuleAction::Allow => Decision::Allow,
                RuleAction::Deny => Decision::Deny,
            });
        }

        let settings = self.settings();
        if !settings.enabled {
            return Ok(Decision::Allow);
        }
        if !settings.alert_level.admits(row.level) {
            return Ok(Decision::Allow);
        }
        if settings
            .ignored_apps
            .iter()
            .any(|app| app.eq_ignore_ascii_case(&row.process))
        {
            return Ok(Decision::Allow);
        }
        if settings.auto_allow_signed_apple && row.signing.apple {
            return Ok(Decision::Allow);
        }

        let fingerprint = connection_fingerprint(&row.process, &row.raddr, row.rport);
        let should_notify = self.record_pending(&fingerprint, row);

        if should_notify {
            self.dispatch(row, settings.intrusive_medium_notifications)
                .await;
            self.last_notified
                .lock()
                .expect("cooldown lock poisoned")
                .insert(fingerprint, Instant::now());
        }

        Ok(Decision::Ask)
    }

    async fn matching_rule(&self, row: &ConnectionRow) -> Result<Option<Rule>> {
        self.rules
            .find(
                &row.process,
                &row.raddr,
                Some(row.rport),
                row.exe_path.as_deref(),
                None,
            )
            .await
    }

    /// Insert or bump the pending alert for `fingerprint`, returning
    /// whether the cooldown window has elapsed and a notification should
    /// fire.
    fn record_pending(&self, fingerprint: &str, row: &ConnectionRow) -> bool {
        let mut pending = self.pending.lock().expect("pending alerts lock poisoned");
        match pending.get_mut(fingerprint) {
            Some(existing) => {
                existing.count += 1;
            }
            None => {
                pending.insert(
                    fingerprint.to_string(),
                    PendingAlert {
                        id: fingerprint.to_string(),
                        connection: row.clone(),
                        created_at: Utc::now(),
                        status: AlertStatus::Pending,
                        count: 1,
                        decision: None,
                        resolved_at: None,
                    },
                );
            }
        }
        drop(pending);
        self.cooldown_elapsed(fingerprint)
    }

    fn cooldown_elapsed(&self, fingerprint: &str) -> bool {
        let cooldown = Duration::from_secs(self.settings().notification_cooldown_seconds.max(0) as u64);
        let last_notified = self.last_notified.lock().expect("cooldown lock poisoned");
        match last_notified.get(fingerprint) {
            Some(last) => last.elapsed() >= cooldown,
            None => true,
        }
    }

    async fn dispatch(&self, row: &ConnectionRow, intrusive_medium: bool) {
        let urgent = row.level != Level::Low && intrusive_medium;
        let title = format!("PortWatch: {} risk connection", row.level);
        let message = format!(
            "{} ({}) -> {}:{}",
            row.process, row.pid, row.raddr, row.rport
        );
        self.notifier.notify(&title, &message, urgent).await;
    }

    pub fn pending_alerts(&self) -> Vec<PendingAlert> {
        self.pending
            .lock()
            .expect("pending alerts lock poisoned")
            .values()
            .filter(|a| a.status == AlertStatus::Pending)
            .cloned()
            .collect()
    }

    /// Resolve a pending alert. `scope=once` resolves only this alert;
    /// `always`/`temporary` also materialize a rule.
    pub async fn decide(&self, alert_id: &str, action: RuleAction, scope: Scope) -> Result<bool> {
        let connection = {
            let pending = self.pending.lock().expect("pending alerts lock poisoned");
            match pending.get(alert_id) {
                Some(alert) if alert.status == AlertStatus::Pending => alert.connection.clone(),
                _ => return Ok(false),
            }
        };

        if scope != Scope::Once {
            let ttl_hours = if scope == Scope::Temporary { Some(24) } else { None };
            let context = serde_json::to_value(&connection).ok();
            let new_rule = NewRule {
                process: connection.process.clone(),
                destination: connection.raddr.clone(),
                action,
                scope,
                port: Some(connection.rport),
                protocol: Some(connection.protocol.clone()),
                exe_path: connection.exe_path.clone(),
                exe_hash: None,
                ttl_hours,
                user_comment: None,
                context,
            };
            self.rules.create(new_rule).await?;
            self.notify_rule_created(&connection, action).await;
        }

        let mut pending = self.pending.lock().expect("pending alerts lock poisoned");
        let Some(alert) = pending.get_mut(alert_id) else {
            return Ok(false);
        };
        alert.status = AlertStatus::Resolved;
        alert.decision = Some(action);
        alert.resolved_at = Some(Utc::now());
        Ok(true)
    }

    async fn notify_rule_created(&self, row: &ConnectionRow, action: RuleAction) {
        let title = "PortWatch: rule created".to_string();
        let message = format!("{action} {} -> {}:{}", row.process, row.raddr, row.rport);
        self.notifier.notify(&title, &message, false).await;
    }

    /// Drop resolved alerts older than 24 h. Call periodically.
    pub fn reap_resolved(&self) {
        let cutoff = Utc::now() - RESOLVED_RETENTION;
        self.pending
            .lock()
            .expect("pending alerts lock poisoned")
            .retain(|_, alert| match alert.resolved_at {
                Some(resolved_at) => resolved_at > cutoff,
                None => true,
            });
    }

    /// Discard all pending/resolved state and cooldown timers.
    pub fn clear_cache(&self) {
        self.pending.lock().expect("pending alerts lock poisoned").clear();
        self.last_notified
            .lock()
            .expect("cooldown lock poisoned")
            .clear();
    }

    pub async fn test_notification(&self) {
        self.notifier
            .notify("PortWatch", "This is a test notification.", false)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::NoopNotifier;
    use portwatch_core::types::{AlertThreshold, DnsRiskLevel, ReputationStatus, SigningVerdict};

    fn sample_row(process: &str, level: Level) -> ConnectionRow {
        ConnectionRow {
            pid: 100,
            process: process.to_string(),
            user: "root".to_string(),
            exe_path: Some("/usr/bin/curl".to_string()),
            laddr: "10.0.0.1".to_string(),
            lport: 5555,
            raddr: "1.2.3.4".to_string(),
            rport: 443,
            protocol: "tcp".to_string(),
            status: "ESTABLISHED".to_string(),
            signing: SigningVerdict::negative(),
            exe_recent: false,
            parent: None,
            suspicious_parent: false,
            domain: None,
            dns_risk: None,
            beacon: false,
            unique_dsts: 1,
            reputation_score: None,
            reputation_status: ReputationStatus::Disabled,
            country: None,
            cpu_percent: 0.0,
            rss_bytes: 0,
            score: match level {
                Level::Low => 1.0,
                Level::Medium => 5.0,
                Level::High => 8.0,
            },
            level,
            reasons: vec![],
            killed: false,
        }
    }

    async fn engine() -> AlertEngine {
        let rules = Arc::new(RuleStore::in_memory().await.unwrap());
        AlertEngine::new(rules, Arc::new(NoopNotifier))
    }

    #[tokio::test]
    async fn disabled_settings_always_allow() {
        let engine = engine().await;
        let row = sample_row("curl", Level::High);
        let decision = engine.process(&row).await.unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn enabled_high_threshold_asks_on_high_row() {
        let engine = engine().await;
        let mut settings = AlertSettings::default();
        settings.enabled = true;
        settings.alert_level = AlertThreshold::High;
        engine.set_settings(settings);

        let row = sample_row("curl", Level::High);
        let decision = engine.process(&row).await.unwrap();
        assert_eq!(decision, Decision::Ask);
        assert_eq!(engine.pending_alerts().len(), 1);
    }

    #[tokio::test]
    async fn decide_once_does_not_persist_a_rule_and_reasks_next_time() {
        let engine = engine().await;
        let mut settings = AlertSettings::default();
        settings.enabled = true;
        settings.alert_level = AlertThreshold::All;
        engine.set_settings(settings);

        let row = sample_row("curl", Level::High);
        engine.process(&row).await.unwrap();
        let fingerprint = connection_fingerprint(&row.process, &row.raddr, row.rport);

        let ok = engine
            .decide(&fingerprint, RuleAction::Allow, Scope::Once)
            .await
            .unwrap();
        assert!(ok);
        assert!(engine.pending_alerts().is_empty());

        // no rule was created, so the next observation asks again
        let decision = engine.process(&row).await.unwrap();
        assert_eq!(decision, Decision::Ask);
    }

    #[tokio::test]
    async fn decide_always_materializes_a_rule_that_short_circuits_future_rows() {
        let engine = engine().await;
        let mut settings = AlertSettings::default();
        settings.enabled = true;
        settings.alert_level = AlertThreshold::All;
        engine.set_settings(settings);

        let row = sample_row("curl", Level::High);
        engine.process(&row).await.unwrap();
        let fingerprint = connection_fingerprint(&row.process, &row.raddr, row.rport);
        engine
            .decide(&fingerprint, RuleAction::Allow, Scope::Always)
            .await
            .unwrap();

        let decision = engine.process(&row).await.unwrap();
        assert_eq!(decision, Decision::Allow);
        // no new pending alert should appear for the now-ruled connection
        assert!(engine.pending_alerts().is_empty());
    }

    #[tokio::test]
    async fn ignored_apps_are_allowed_without_asking() {
        let engine = engine().await;
        let mut settings = AlertSettings::default();
        settings.enabled = true;
        settings.alert_level = AlertThreshold::All;
        settings.ignored_apps = vec!["curl".to_string()];
        engine.set_settings(settings);

        let row = sample_row("curl", Level::High);
        let decision = engine.process(&row).await.unwrap();
        assert_eq!(decision, Decision::Allow);
    }

    #[tokio::test]
    async fn clear_cache_drops_pending_alerts() {
        let engine = engine().await;
        let mut settings = AlertSettings::default();
        settings.enabled = true;
        settings.alert_level = AlertThreshold::All;
        engine.set_settings(settings);

        let row = sample_row("curl", Level::High);
        engine.process(&row).await.unwrap();
        assert_eq!(engine.pending_alerts().len(), 1);

        engine.clear_cache();
        assert!(engine.pending_alerts().is_empty());
    }
}
