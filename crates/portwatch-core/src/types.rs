//! Core domain types shared across PortWatch components

use serde::{Deserialize, Serialize};

/// Risk band a [`ConnectionRow`] or pending alert is placed into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl Level {
    /// Bands: `>= 7.0` high, `>= 4.0` medium, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 7.0 {
            Level::High
        } else if score >= 4.0 {
            Level::Medium
        } else {
            Level::Low
        }
    }

    pub fn at_least(self, threshold: Level) -> bool {
        self >= threshold
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::Medium => write!(f, "medium"),
            Level::High => write!(f, "high"),
        }
    }
}

/// Whether IP-reputation enrichment is presently usable for a row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReputationStatus {
    Ok,
    Pending,
    Disabled,
    Failed,
}

/// Code-signing verdict for one executable path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SigningVerdict {
    pub signed: bool,
    pub apple: bool,
    pub notarized: bool,
    pub quarantine: bool,
    pub authorities: Vec<String>,
}

impl SigningVerdict {
    /// Verdict used when the platform cannot attest signing at all (non-macOS):
    /// treated as signed-but-not-apple so the scorer does not penalize it as
    /// an unsigned binary.
    pub fn unknown_platform() -> Self {
        Self {
            signed: true,
            apple: false,
            notarized: false,
            quarantine: false,
            authorities: Vec::new(),
        }
    }

    pub fn negative() -> Self {
        Self {
            signed: false,
            apple: false,
            notarized: false,
            quarantine: false,
            authorities: Vec::new(),
        }
    }
}

/// Result of classifying a DNS name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DnsRiskLevel {
    Safe,
    Low,
    Suspicious,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsAnalysis {
    pub domain: String,
    pub score: i32,
    pub risk: DnsRiskLevel,
    pub reasons: Vec<String>,
    pub entropy: f64,
}

/// One enriched connection observation, emitted once per tick per live
/// remote-ended socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRow {
    pub pid: u32,
    pub process: String,
    pub user: String,
    pub exe_path: Option<String>,
    pub laddr: String,
    pub lport: u16,
    pub raddr: String,
    pub rport: u16,
    pub protocol: String,
    pub status: String,

    pub signing: SigningVerdict,
    pub exe_recent: bool,
    pub parent: Option<String>,
    pub suspicious_parent: bool,

    pub domain: Option<String>,
    pub dns_risk: Option<DnsAnalysis>,

    pub beacon: bool,
    pub unique_dsts: u32,

    pub reputation_score: Option<i32>,
    pub reputation_status: ReputationStatus,
    pub country: Option<String>,

    pub cpu_percent: f32,
    pub rss_bytes: u64,

    pub score: f64,
    pub level: Level,
    pub reasons: Vec<String>,

    /// Set by the orchestrator when a row was killed this tick (paranoid
    /// mode or a deny rule match), surfaced to subscribers.
    pub killed: bool,
}

/// Network throughput sample attached to each broadcast snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct NetSpeed {
    pub up_bytes_per_sec: u64,
    pub down_bytes_per_sec: u64,
}

/// `scope` of a persisted [`Rule`] or a user decision on a pending alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Once,
    Always,
    Temporary,
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Once => write!(f, "once"),
            Scope::Always => write!(f, "always"),
            Scope::Temporary => write!(f, "temporary"),
        }
    }
}

impl std::str::FromStr for Scope {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Scope::Once),
            "always" => Ok(Scope::Always),
            "temporary" => Ok(Scope::Temporary),
            other => Err(format!("invalid scope '{other}'")),
        }
    }
}

/// Action a [`Rule`] or an alert decision applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Deny,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Allow => write!(f, "allow"),
            RuleAction::Deny => write!(f, "deny"),
        }
    }
}

impl std::str::FromStr for RuleAction {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(RuleAction::Allow),
            "deny" => Ok(RuleAction::Deny),
            other => Err(format!("invalid action '{other}'")),
        }
    }
}

/// A persisted rule in the Rule Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub process: String,
    pub exe_path: Option<String>,
    pub exe_hash: Option<String>,
    pub destination: String,
    pub port: Option<u16>,
    pub protocol: Option<String>,
    pub action: RuleAction,
    pub scope: Scope,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub user_comment: Option<String>,
    pub enabled: bool,
    pub context: Option<serde_json::Value>,
}

/// Alert engine settings. Persisted via the rule store's `system_config`
/// table, not plaintext JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertSettings {
    pub enabled: bool,
    pub alert_level: AlertThreshold,
    pub ignored_apps: Vec<String>,
    pub auto_allow_signed_apple: bool,
    pub notification_cooldown_seconds: i64,
    pub intrusive_medium_notifications: bool,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            alert_level: AlertThreshold::High,
            ignored_apps: Vec::new(),
            auto_allow_signed_apple: false,
            notification_cooldown_seconds: 60,
            intrusive_medium_notifications: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertThreshold {
    All,
    Medium,
    High,
}

impl AlertThreshold {
    pub fn admits(self, level: Level) -> bool {
        match self {
            AlertThreshold::All => true,
            AlertThreshold::Medium => level >= Level::Medium,
            AlertThreshold::High => level >= Level::High,
        }
    }
}

impl std::str::FromStr for AlertThreshold {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(AlertThreshold::All),
            "medium" => Ok(AlertThreshold::Medium),
            "high" => Ok(AlertThreshold::High),
            other => Err(format!("invalid alert level '{other}'")),
        }
    }
}

/// Status of a pending-or-resolved alert.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Pending,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAlert {
    pub id: String,
    pub connection: ConnectionRow,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub status: AlertStatus,
    pub count: u32,
    pub decision: Option<RuleAction>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// What kind of policy decision produced a kill.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KillKind {
    Network,
    Resource,
    Block,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillRecord {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub pid: u32,
    pub process_name: String,
    pub reason: String,
    pub kind: KillKind,
    pub level: Option<Level>,
    pub score: Option<f64>,
    pub destination: Option<String>,
    pub port: Option<u16>,
}

/// Full snapshot broadcast to subscribers once per tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub ts: f64,
    pub rows: Vec<ConnectionRow>,
    pub net_speed: NetSpeed,
    pub pending_alerts: Vec<PendingAlert>,
    pub killed_processes: Vec<KillRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bands_match_thresholds() {
        assert_eq!(Level::from_score(7.0), Level::High);
        assert_eq!(Level::from_score(4.0), Level::Medium);
        assert_eq!(Level::from_score(3.999), Level::Low);
    }

    #[test]
    fn alert_threshold_admits_correctly() {
        assert!(AlertThreshold::All.admits(Level::Low));
        assert!(!AlertThreshold::Medium.admits(Level::Low));
        assert!(AlertThreshold::Medium.admits(Level::Medium));
        assert!(!AlertThreshold::High.admits(Level::Medium));
        assert!(AlertThreshold::High.admits(Level::High));
    }

    #[test]
    fn scope_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(Scope::from_str("once").unwrap(), Scope::Once);
        assert!(Scope::from_str("bogus").is_err());
    }
}
