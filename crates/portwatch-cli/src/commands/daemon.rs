//! Daemon command handler
//!
//! Wires the full pipeline -- connection enumerator, DNS sniffer,
//! resource scanner, alert engine, enforcement -- into the orchestrator's
//! tick loop, then serves the web facade alongside it.

use super::{build_orchestrator, persist_paranoid};
use colored::Colorize;
use portwatch_web::{serve, AppState};
use std::net::SocketAddr;
use std::time::Duration;

pub async fn run(addr: SocketAddr, paranoid: bool, tick_ms: u64) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator().await?;
    if paranoid {
        orchestrator.set_paranoid(true);
        persist_paranoid(&orchestrator, true).await?;
    }

    let state = AppState::new(std::sync::Arc::clone(&orchestrator));
    let token = state.token.clone();

    println!("{}", "PortWatch daemon starting".bright_blue().bold());
    println!("  web facade: http://{addr}");
    println!("  auth token: {}", token.bright_black());
    println!(
        "  paranoid mode: {}",
        if orchestrator.paranoid() {
            "enabled".red().bold()
        } else {
            "disabled".green()
        }
    );
    println!();

    let tick_task = {
        let orchestrator = std::sync::Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator.run(Duration::from_millis(tick_ms)).await;
        })
    };
    let resource_task = {
        let orchestrator = std::sync::Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator.run_resource_scanner().await;
        })
    };

    let serve_result = tokio::select! {
        result = serve(addr, state) => result,
        _ = tokio::signal::ctrl_c() => {
            println!("\n{}", "shutting down".yellow());
            Ok(())
        }
    };

    orchestrator.shutdown();
    tick_task.abort();
    resource_task.abort();

    serve_result
}
