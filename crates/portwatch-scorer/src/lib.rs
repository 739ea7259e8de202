//! Risk Scorer
//!
//! Pure, deterministic composition of a dozen orthogonal signals into a
//! bounded score and a three-level band. Point values are reproduced
//! exactly as specified; this module makes no attempt to "improve" on
//! them.

use portwatch_core::ip::is_public_ip;
use portwatch_core::types::{ConnectionRow, Level};

const SENSITIVE_PORTS: &[u16] = &[22, 23, 25, 445, 3389, 5900];
const MINING_PORTS: &[u16] = &[3333, 4444];
const TOR_PORT_RANGE: std::ops::RangeInclusive<u16> = 9001..=9030;
const TEMP_DIRS: &[&str] = &["/tmp", "/private/tmp", "/var/tmp", "/dev/shm"];
const SUSPICIOUS_PARENTS: &[&str] = &[
    "bash", "sh", "zsh", "curl", "wget", "python", "python3", "perl", "ruby", "node",
];
const USER_WRITABLE_SUBPATHS: &[&str] = &["/downloads", "/library/", "/desktop"];

/// Compute the base score (clamped to `[0, 10]`) and populate `reasons`,
/// `score`, and `level` on `row`. Call [`apply_reputation`] afterward once
/// an IP-reputation score becomes available.
pub fn score(row: &mut ConnectionRow) {
    let mut total = 0.0;
    let mut reasons = Vec::new();

    if SENSITIVE_PORTS.contains(&row.rport) {
        total += 3.0;
        reasons.push("sensitive port".to_string());
    }
    if MINING_PORTS.contains(&row.rport) {
        total += 2.0;
        reasons.push("mining-stratum".to_string());
    }
    if TOR_PORT_RANGE.contains(&row.rport) {
        total += 1.5;
        reasons.push("tor".to_string());
    }

    let exe_in_temp = row
        .exe_path
        .as_deref()
        .map(|p| TEMP_DIRS.iter().any(|dir| p.starts_with(dir)))
        .unwrap_or(false);
    if exe_in_temp {
        total += 3.0;
        reasons.push("temp dir".to_string());
    }

    let remote_is_public = row
        .raddr
        .parse::<std::net::IpAddr>()
        .map(|ip| is_public_ip(&ip))
        .unwrap_or(false);
    if remote_is_public {
        total += 1.0;
        reasons.push("egress to internet".to_string());
    }

    if row.exe_recent && remote_is_public {
        total += 1.0;
        reasons.push("fresh binary with egress".to_string());
    }

    if row.beacon {
        total += 2.5;
        reasons.push("repetitive cadence".to_string());
    }

    if row.unique_dsts >= 10 {
        total += 1.5;
        reasons.push("fanout".to_string());
    } else if row.unique_dsts >= 5 {
        total += 0.8;
        reasons.push("elevated fanout".to_string());
    }

    if !row.signing.signed {
        total += 2.0;
        reasons.push("unsigned".to_string());
    } else if row.signing.apple {
        total -= 1.5;
        reasons.push("first-party".to_string());
    }

    if row.signing.quarantine {
        total += 1.0;
        reasons.push("recently downloaded".to_string());
    }

    let exe_user_writable = row
        .exe_path
        .as_deref()
        .map(|p| {
            let lower = p.to_lowercase();
            USER_WRITABLE_SUBPATHS.iter().any(|s| lower.contains(s))
        })
        .unwrap_or(false);
    if exe_user_writable {
        total += 0.5;
        reasons.push("user-writable location".to_string());
    }

    if row.cpu_percent > 50.0 {
        total += 2.0;
        reasons.push("high cpu".to_string());
    }

    const RSS_500_MIB: u64 = 500 * 1024 * 1024;
    if row.rss_bytes > RSS_500_MIB {
        total += 1.0;
        reasons.push("high memory".to_string());
    }

    if row.suspicious_parent && remote_is_public {
        total += 2.5;
        reasons.push("suspicious spawn".to_string());
    }

    if let Some(dns) = &row.dns_risk {
        if dns.score > 0 {
            total += dns.score as f64;
            for reason in &dns.reasons {
                reasons.push(format!("DNS:{reason}"));
            }
        }
    }

    let clamped = total.clamp(0.0, 10.0);
    row.score = clamped;
    row.level = Level::from_score(clamped);
    row.reasons = reasons;
}

/// Layer a cached IP-reputation score onto an already-scored row. Adds
/// `reputation_score / 20.0` to the clamped base score and recomputes only
/// the level band -- the score itself is not re-clamped.
pub fn apply_reputation(row: &mut ConnectionRow) {
    if let Some(reputation_score) = row.reputation_score {
        if reputation_score > 0 {
            row.score += reputation_score as f64 / 20.0;
            row.level = Level::from_score(row.score);
        }
    }
}

/// Stable ordering for a scored snapshot: highest score first, beaconing
/// rows before non-beaconing rows at the same score.
pub fn sort_rows(rows: &mut [ConnectionRow]) {
    rows.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.beacon.cmp(&a.beacon))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use portwatch_core::types::{ReputationStatus, SigningVerdict};

    fn base_row() -> ConnectionRow {
        ConnectionRow {
            pid: 1,
            process: "test".to_string(),
            user: "nobody".to_string(),
            exe_path: Some("/usr/bin/test".to_string()),
            laddr: "127.0.0.1".to_string(),
            lport: 1234,
            raddr: "8.8.8.8".to_string(),
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
            score: 0.0,
            level: Level::Low,
            reasons: Vec::new(),
            killed: false,
        }
    }

    #[test]
    fn unsigned_temp_mining_port_scores_high() {
        let mut row = base_row();
        row.exe_path = Some("/tmp/x".to_string());
        row.rport = 4444;
        score(&mut row);
        assert!(row.score >= 8.0, "score was {}", row.score);
        assert_eq!(row.level, Level::High);
        assert!(row.reasons.contains(&"temp dir".to_string()));
        assert!(row.reasons.contains(&"mining-stratum".to_string()));
        assert!(row.reasons.contains(&"unsigned".to_string()));
    }

    #[test]
    fn apple_signed_whitelisted_traffic_scores_low() {
        let mut row = base_row();
        row.signing = SigningVerdict {
            signed: true,
            apple: true,
            notarized: true,
            quarantine: false,
            authorities: vec!["Apple Root CA".to_string()],
        };
        score(&mut row);
        assert!(row.score <= 1.0, "score was {}", row.score);
        assert_eq!(row.level, Level::Low);
    }

    #[test]
    fn score_is_clamped_to_ten() {
        let mut row = base_row();
        row.exe_path = Some("/tmp/x".to_string());
        row.rport = 4444;
        row.exe_recent = true;
        row.beacon = true;
        row.unique_dsts = 20;
        row.suspicious_parent = true;
        row.cpu_percent = 90.0;
        row.rss_bytes = 2 * 1024 * 1024 * 1024;
        score(&mut row);
        assert_eq!(row.score, 10.0);
    }

    #[test]
    fn reputation_bonus_applies_after_clamp_without_reclamping() {
        let mut row = base_row();
        row.exe_path = Some("/tmp/x".to_string());
        row.rport = 4444;
        row.exe_recent = true;
        row.beacon = true;
        row.unique_dsts = 20;
        score(&mut row);
        assert_eq!(row.score, 10.0);
        row.reputation_score = Some(100);
        apply_reputation(&mut row);
        assert_eq!(row.score, 10.0 + 5.0);
        assert_eq!(row.level, Level::High);
    }

    #[test]
    fn negative_reputation_sentinel_is_not_applied() {
        let mut row = base_row();
        score(&mut row);
        let before = row.score;
        row.reputation_score = Some(-2);
        apply_reputation(&mut row);
        assert_eq!(row.score, before);
    }

    #[test]
    fn elevated_fanout_is_exclusive_of_fanout() {
        let mut row = base_row();
        row.unique_dsts = 7;
        score(&mut row);
        assert!(row.reasons.contains(&"elevated fanout".to_string()));
        assert!(!row.reasons.contains(&"fanout".to_string()));
    }

    #[test]
    fn sort_orders_by_score_desc_then_beacon_desc() {
        let mut a = base_row();
        a.score = 5.0;
        a.beacon = false;
        let mut b = base_row();
        b.score = 5.0;
        b.beacon = true;
        let mut rows = vec![a, b];
        sort_rows(&mut rows);
        assert!(rows[0].beacon);
    }
}
