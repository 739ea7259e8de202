//! DNS name heuristic classifier: Shannon entropy, length, TLD and
//! keyword blacklists, and IP-in-name detection.

use crate::config::DnsAnalyzerConfig;
use once_cell::sync::Lazy;
use portwatch_core::types::{DnsAnalysis, DnsRiskLevel};
use regex::Regex;

static IP_IN_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}[-.]\d{1,3}[-.]\d{1,3}[-.]\d{1,3}").unwrap());

/// Shannon entropy (base 2) over the bytes of `s`.
pub fn calculate_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut counts = [0u32; 256];
    for b in s.bytes() {
        counts[b as usize] += 1;
    }
    let len = s.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

pub fn analyze(name: &str, config: &DnsAnalyzerConfig) -> DnsAnalysis {
    let name = name.trim_end_matches('.').to_lowercase();

    if config.whitelist_domains.iter().any(|d| d == &name)
        || config
            .whitelist_suffixes
            .iter()
            .any(|suf| name.ends_with(suf.as_str()))
    {
        return DnsAnalysis {
            domain: name,
            score: 0,
            risk: DnsRiskLevel::Safe,
            reasons: vec!["Whitelisted".to_string()],
            entropy: 0.0,
        };
    }

    let mut score = 0i32;
    let mut reasons = Vec::new();

    let first_label = name.split('.').next().unwrap_or(&name);
    let entropy = calculate_entropy(first_label);
    if entropy > 4.5 {
        score += 50;
        reasons.push("High Entropy".to_string());
    } else if entropy > 4.0 {
        score += 20;
        reasons.push("Elevated Entropy".to_string());
    }

    if name.len() > 60 {
        score += 40;
        reasons.push("Excessive Length".to_string());
    } else if name.len() > 40 {
        score += 15;
        reasons.push("Long Domain Name".to_string());
    }

    for tld in &config.blacklist_tlds {
        if name.ends_with(tld.as_str()) {
            score += 20;
            reasons.push(format!("Blacklisted TLD {tld}"));
            break;
        }
    }

    for keyword in &config.blacklist_keywords {
        if name.contains(keyword.as_str()) {
            score += 40;
            reasons.push(format!("Blacklisted keyword '{keyword}'"));
            break;
        }
    }

    if IP_IN_NAME.is_match(&name) {
        score += 10;
        reasons.push("IP Address In Name".to_string());
    }

    let score = score.min(100);
    let risk = if score >= 60 {
        DnsRiskLevel::Critical
    } else if score >= 30 {
        DnsRiskLevel::Suspicious
    } else if score > 0 {
        DnsRiskLevel::Low
    } else {
        DnsRiskLevel::Safe
    };

    DnsAnalysis {
        domain: name,
        score,
        risk,
        reasons,
        entropy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_domain_is_safe() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("apple.com", &config);
        assert_eq!(result.score, 0);
        assert_eq!(result.risk, DnsRiskLevel::Safe);
        assert_eq!(result.reasons, vec!["Whitelisted".to_string()]);
    }

    #[test]
    fn whitelisted_suffix_is_safe() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("gateway.icloud.com", &config);
        assert_eq!(result.risk, DnsRiskLevel::Safe);
    }

    #[test]
    fn high_entropy_subdomain_is_flagged() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("xk92jf0qpz8h1m.example-not-whitelisted.net", &config);
        assert!(result.entropy > 4.0);
        assert!(result.score > 0);
    }

    #[test]
    fn blacklisted_tld_adds_twenty_once() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("plain.tk", &config);
        assert!(result
            .reasons
            .iter()
            .any(|r| r.contains("Blacklisted TLD")));
    }

    #[test]
    fn blacklisted_keyword_adds_forty_once() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("totally-malware-site.net", &config);
        assert!(result.score >= 40);
    }

    #[test]
    fn ip_in_name_adds_ten() {
        let config = DnsAnalyzerConfig::default();
        let result = analyze("192-168-1-1.dynamic-dns.net", &config);
        assert!(result.reasons.contains(&"IP Address In Name".to_string()));
    }

    #[test]
    fn score_is_capped_at_hundred() {
        let mut config = DnsAnalyzerConfig::default();
        config.blacklist_keywords.push("malware".to_string());
        let name = "xk9z7qw2p0f8m1-malware-phishing-c2-192-168-1-1.tk";
        let result = analyze(name, &config);
        assert!(result.score <= 100);
    }

    #[test]
    fn length_bands_are_mutually_exclusive() {
        let config = DnsAnalyzerConfig::default();
        let sixty_one = format!("{}.example.org", "a".repeat(50));
        let result = analyze(&sixty_one, &config);
        assert!(result.reasons.contains(&"Excessive Length".to_string()));
        assert!(!result.reasons.contains(&"Long Domain Name".to_string()));
    }

    #[test]
    fn analysis_is_deterministic() {
        let config = DnsAnalyzerConfig::default();
        let a = analyze("random-looking-9f8e7d6c.example.net", &config);
        let b = analyze("random-looking-9f8e7d6c.example.net", &config);
        assert_eq!(a.score, b.score);
        assert_eq!(a.risk, b.risk);
    }
}
