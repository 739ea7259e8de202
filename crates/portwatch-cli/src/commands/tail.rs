//! Tail command handler
//!
//! Runs the orchestrator standalone (no web facade) and prints enriched
//! connection snapshots to the terminal as they're produced.

use super::build_orchestrator;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use portwatch_core::types::{Level, Snapshot};
use std::time::Duration;

pub async fn run(watch: bool, tick_ms: u64) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    let mut snapshots = orchestrator.subscribe();

    let orchestrator_for_tick = std::sync::Arc::clone(&orchestrator);
    let tick_task = tokio::spawn(async move {
        orchestrator_for_tick.run(Duration::from_millis(tick_ms)).await;
    });

    loop {
        match snapshots.recv().await {
            Ok(snapshot) => {
                print_snapshot(&snapshot);
                if !watch {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }

    orchestrator.shutdown();
    tick_task.abort();
    Ok(())
}

fn print_snapshot(snapshot: &Snapshot) {
    println!(
        "{} {} rows  up {}B/s  down {}B/s  {} pending alerts",
        "snapshot".bright_blue().bold(),
        snapshot.rows.len(),
        snapshot.net_speed.up_bytes_per_sec,
        snapshot.net_speed.down_bytes_per_sec,
        snapshot.pending_alerts.len(),
    );

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "PID", "Process", "Remote", "Level", "Score", "Reasons",
        ]);

    for row in &snapshot.rows {
        let level_cell = match row.level {
            Level::Low => Cell::new("low").fg(Color::Green),
            Level::Medium => Cell::new("medium").fg(Color::Yellow),
            Level::High => Cell::new("high").fg(Color::Red),
        };
        let marker = if row.killed { " [KILLED]" } else { "" };
        table.add_row(vec![
            Cell::new(row.pid.to_string()),
            Cell::new(format!("{}{marker}", row.process)),
            Cell::new(format!("{}:{}", row.raddr, row.rport)),
            level_cell,
            Cell::new(format!("{:.1}", row.score)),
            Cell::new(row.reasons.join(", ")),
        ]);
    }

    println!("{table}");
    println!();
}
