//! PortWatch CLI - main entry point

mod commands;

use clap::{Parser, Subcommand};
use portwatch_core::types::{AlertThreshold, RuleAction, Scope};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "portwatch")]
#[command(about = "Host-resident network security agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the orchestrator tick loop and serve the web facade
    Daemon {
        /// Address the web facade binds to
        #[arg(short, long, default_value = "127.0.0.1:7780")]
        addr: String,
        /// Start with paranoid (autonomous-kill) mode enabled
        #[arg(long)]
        paranoid: bool,
        /// Tick interval in milliseconds
        #[arg(long, default_value_t = 2000)]
        tick_ms: u64,
    },
    /// Print one enriched connection snapshot and exit, or follow with --watch
    Tail {
        /// Keep printing snapshots as they arrive
        #[arg(short, long)]
        watch: bool,
        /// Tick interval in milliseconds (only used when running standalone)
        #[arg(long, default_value_t = 2000)]
        tick_ms: u64,
    },
    /// Manage persisted allow/deny rules
    Rules {
        #[command(subcommand)]
        action: RuleCommands,
    },
    /// Manage pending alerts and alert-engine settings
    Alerts {
        #[command(subcommand)]
        action: AlertCommands,
    },
}

#[derive(Subcommand)]
enum RuleCommands {
    /// List rules
    List {
        #[arg(long)]
        enabled_only: bool,
    },
    /// Create a rule
    Create {
        process: String,
        destination: String,
        #[arg(value_parser = ["allow", "deny"])]
        action: String,
        #[arg(value_parser = ["once", "always", "temporary"], default_value = "always")]
        scope: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        ttl_hours: Option<i64>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Delete a rule by id
    Delete { id: String },
    /// Enable a disabled rule
    Enable { id: String },
    /// Disable a rule without deleting it
    Disable { id: String },
    /// Export all rules as JSON to stdout
    Export,
    /// Import rules from a JSON file
    Import {
        path: std::path::PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
}

#[derive(Subcommand)]
enum AlertCommands {
    /// List currently pending alerts
    Pending,
    /// Resolve a pending alert
    Decide {
        id: String,
        #[arg(value_parser = ["allow", "deny"])]
        action: String,
        #[arg(value_parser = ["once", "always", "temporary"], default_value = "once")]
        scope: String,
    },
    /// Show current alert-engine settings
    ShowSettings,
    /// Toggle whether the alert engine is enabled
    SetEnabled { enabled: bool },
    /// Set the alert level threshold
    SetLevel {
        #[arg(value_parser = ["all", "medium", "high"])]
        level: String,
    },
    /// Fire a test notification through the configured notifier
    Test,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portwatch=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon {
            addr,
            paranoid,
            tick_ms,
        } => {
            let addr: SocketAddr = addr.parse()?;
            commands::daemon::run(addr, paranoid, tick_ms).await?;
        }
        Commands::Tail { watch, tick_ms } => {
            commands::tail::run(watch, tick_ms).await?;
        }
        Commands::Rules { action } => match action {
            RuleCommands::List { enabled_only } => commands::rules::list(enabled_only).await?,
            RuleCommands::Create {
                process,
                destination,
                action,
                scope,
                port,
                ttl_hours,
                comment,
            } => {
                let action = RuleAction::from_str(&action).map_err(anyhow::Error::msg)?;
                let scope = Scope::from_str(&scope).map_err(anyhow::Error::msg)?;
                commands::rules::create(process, destination, action, scope, port, ttl_hours, comment)
                    .await?
            }
            RuleCommands::Delete { id } => commands::rules::delete(&id).await?,
            RuleCommands::Enable { id } => commands::rules::set_enabled(&id, true).await?,
            RuleCommands::Disable { id } => commands::rules::set_enabled(&id, false).await?,
            RuleCommands::Export => commands::rules::export().await?,
            RuleCommands::Import { path, overwrite } => commands::rules::import(&path, overwrite).await?,
        },
        Commands::Alerts { action } => match action {
            AlertCommands::Pending => commands::alerts::pending().await?,
            AlertCommands::Decide { id, action, scope } => {
                let action = RuleAction::from_str(&action).map_err(anyhow::Error::msg)?;
                let scope = Scope::from_str(&scope).map_err(anyhow::Error::msg)?;
                commands::alerts::decide(&id, action, scope).await?
            }
            AlertCommands::ShowSettings => commands::alerts::show_settings().await?,
            AlertCommands::SetEnabled { enabled } => commands::alerts::set_enabled(enabled).await?,
            AlertCommands::SetLevel { level } => {
                let level = AlertThreshold::from_str(&level).map_err(anyhow::Error::msg)?;
                commands::alerts::set_level(level).await?
            }
            AlertCommands::Test => commands::alerts::test().await?,
        },
    }

    Ok(())
}
