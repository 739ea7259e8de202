//! Command handlers for the PortWatch CLI

pub mod alerts;
pub mod daemon;
pub mod rules;
pub mod tail;

use portwatch_alerts::AlertEngine;
use portwatch_alerts::Notifier;
use portwatch_core::types::AlertSettings;
use portwatch_dns::{ConfigHandle, DnsMap, DnsSniffer};
use portwatch_enforcement::Enforcement;
use portwatch_orchestrator::Orchestrator;
use portwatch_reputation::ReputationCache;
use portwatch_rules::RuleStore;
use portwatch_secrets::{DefaultReputationCredential, MemoryStore, SecretManager};
use portwatch_signing::{ProcessTable, SigningCache};
use std::path::PathBuf;
use std::sync::Arc;

const ALERT_SETTINGS_KEY: &str = "alert_settings";
const PARANOID_KEY: &str = "paranoid_mode";

/// Resolve (and create) the directory PortWatch keeps its persistent
/// state under.
pub fn state_dir() -> PathBuf {
    let base = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
    let dir = base.join("portwatch");
    let _ = std::fs::create_dir_all(&dir);
    dir
}

pub fn rules_db_path() -> PathBuf {
    state_dir().join("rules.db")
}

pub async fn open_rule_store() -> anyhow::Result<RuleStore> {
    let path = rules_db_path();
    Ok(RuleStore::init(path.to_string_lossy().as_ref()).await?)
}

/// Build a fully wired orchestrator against the persistent rule store,
/// restoring any previously saved paranoid/alert settings.
pub async fn build_orchestrator() -> anyhow::Result<Arc<Orchestrator>> {
    let rules = Arc::new(open_rule_store().await?);

    let notifier: Arc<dyn Notifier> = Arc::from(portwatch_alerts::platform_notifier());
    let alerts = Arc::new(AlertEngine::new(Arc::clone(&rules), notifier));
    if let Some(raw) = rules.load_system_config(ALERT_SETTINGS_KEY).await? {
        if let Ok(settings) = serde_json::from_str::<AlertSettings>(&raw) {
            alerts.set_settings(settings);
        }
    }

    let secret_manager = Arc::new(SecretManager::new(Arc::new(MemoryStore::new())));
    let credential = Arc::new(DefaultReputationCredential::new(secret_manager));
    let reputation = Arc::new(ReputationCache::new(credential));

    let processes = Arc::new(ProcessTable::new());
    let signing = Arc::new(SigningCache::new());
    let dns_map = DnsMap::new();
    start_dns_sniffer(dns_map.clone());

    let enforcement = Arc::new(Enforcement::new());

    let orchestrator = Arc::new(Orchestrator::new(
        processes,
        signing,
        dns_map,
        reputation,
        rules,
        alerts,
        enforcement,
    ));

    if let Some(raw) = orchestrator.rules().load_system_config(PARANOID_KEY).await? {
        orchestrator.set_paranoid(raw == "true");
    }

    Ok(orchestrator)
}

pub async fn persist_paranoid(orchestrator: &Orchestrator, enabled: bool) -> anyhow::Result<()> {
    orchestrator
        .rules()
        .save_system_config(PARANOID_KEY, if enabled { "true" } else { "false" })
        .await?;
    Ok(())
}

pub async fn persist_alert_settings(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let settings = orchestrator.alerts().settings();
    let raw = serde_json::to_string(&settings)?;
    orchestrator.rules().save_system_config(ALERT_SETTINGS_KEY, &raw).await?;
    Ok(())
}

/// Load (or create with defaults) the DNS analyzer config and start the
/// passive sniffer against `map`. Failures are logged and swallowed --
/// the rest of the pipeline runs fine with an empty DNS map.
fn start_dns_sniffer(map: DnsMap) {
    match ConfigHandle::load_default() {
        Ok(config) => {
            let sniffer = DnsSniffer::new(map);
            sniffer.start(Arc::new(config));
        }
        Err(e) => {
            tracing::warn!("DNS analyzer config unavailable, sniffer disabled: {e}");
        }
    }
}
