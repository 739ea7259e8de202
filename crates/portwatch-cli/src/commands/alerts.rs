//! Alerts command handlers
//!
//! Operates against a freshly built orchestrator/alert engine: pending
//! alerts live in-memory, so these commands only see state accumulated by
//! an already-running daemon if invoked against the same process, and
//! otherwise act on settings persisted in the rule store.

use super::{build_orchestrator, persist_alert_settings};
use colored::Colorize;
use portwatch_core::types::{AlertThreshold, RuleAction, Scope};

pub async fn pending() -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let alerts = orchestrator.alerts().pending_alerts();
    if alerts.is_empty() {
        println!("{}", "no pending alerts".bright_black());
        return Ok(());
    }
    for alert in alerts {
        println!(
            "{} {} {} -> {}:{} (seen {}x)",
            alert.id.bright_black(),
            alert.connection.level,
            alert.connection.process,
            alert.connection.raddr,
            alert.connection.rport,
            alert.count,
        );
    }
    Ok(())
}

pub async fn decide(id: &str, action: RuleAction, scope: Scope) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let found = orchestrator.decide_alert(id, action, scope).await?;
    if found {
        println!("{} {action} ({scope})", "resolved".green().bold());
    } else {
        println!("{}", "no such pending alert".red());
    }
    Ok(())
}

pub async fn show_settings() -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let settings = orchestrator.alerts().settings();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

pub async fn set_enabled(enabled: bool) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let mut settings = orchestrator.alerts().settings();
    settings.enabled = enabled;
    orchestrator.alerts().set_settings(settings);
    persist_alert_settings(&orchestrator).await?;
    println!("alert engine {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

pub async fn set_level(level: AlertThreshold) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let mut settings = orchestrator.alerts().settings();
    settings.alert_level = level;
    orchestrator.alerts().set_settings(settings);
    persist_alert_settings(&orchestrator).await?;
    println!("alert level set");
    Ok(())
}

pub async fn test() -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    orchestrator.alerts().test_notification().await;
    println!("{}", "test notification dispatched".green());
    Ok(())
}
