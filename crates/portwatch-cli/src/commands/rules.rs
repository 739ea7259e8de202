//! Rules command handlers
//!
//! Thin CLI surface over the [`portwatch_rules::RuleStore`], operating on
//! the same persistent database the daemon uses.

use super::open_rule_store;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use portwatch_core::types::{RuleAction, Scope};
use portwatch_rules::NewRule;
use std::path::Path;

pub async fn list(enabled_only: bool) -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    let rules = store.list(enabled_only).await?;

    if rules.is_empty() {
        println!("{}", "no rules".bright_black());
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "ID", "Process", "Destination", "Port", "Action", "Scope", "Enabled", "Expires",
        ]);

    for rule in rules {
        let action_cell = match rule.action {
            RuleAction::Allow => Cell::new("allow").fg(Color::Green),
            RuleAction::Deny => Cell::new("deny").fg(Color::Red),
        };
        table.add_row(vec![
            Cell::new(&rule.id[..8.min(rule.id.len())]),
            Cell::new(&rule.process),
            Cell::new(&rule.destination),
            Cell::new(rule.port.map(|p| p.to_string()).unwrap_or_else(|| "any".to_string())),
            action_cell,
            Cell::new(rule.scope.to_string()),
            Cell::new(if rule.enabled { "yes" } else { "no" }),
            Cell::new(
                rule.expires_at
                    .map(|e| e.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }

    println!("{table}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    process: String,
    destination: String,
    action: RuleAction,
    scope: Scope,
    port: Option<u16>,
    ttl_hours: Option<i64>,
    user_comment: Option<String>,
) -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    let id = store
        .create(NewRule {
            process,
            destination,
            action,
            scope,
            port,
            protocol: Some("tcp".to_string()),
            exe_path: None,
            exe_hash: None,
            ttl_hours,
            user_comment,
            context: None,
        })
        .await?;
    println!("{} {id}", "created rule".green().bold());
    Ok(())
}

pub async fn delete(id: &str) -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    store.delete(id).await?;
    println!("{} {id}", "deleted rule".green().bold());
    Ok(())
}

pub async fn set_enabled(id: &str, enabled: bool) -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    store.set_enabled(id, enabled).await?;
    println!(
        "{} {id}",
        if enabled {
            "enabled rule".green().bold()
        } else {
            "disabled rule".yellow().bold()
        }
    );
    Ok(())
}

pub async fn export() -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    let rules = store.export().await?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

pub async fn import(path: &Path, overwrite: bool) -> anyhow::Result<()> {
    let store = open_rule_store().await?;
    let raw = std::fs::read_to_string(path)?;
    let rules = serde_json::from_str(&raw)?;
    let count = store.import(rules, overwrite).await?;
    println!("{} {count} rules", "imported".green().bold());
    Ok(())
}
