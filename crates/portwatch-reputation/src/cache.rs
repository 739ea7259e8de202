//! IP Reputation Cache
//!
//! TTL-cached reputation scores for public IPs, backed by an external
//! abuse-reporting provider (AbuseIPDB's confidence-score API). Every
//! lookup carries its own timeout and never blocks a tick: the caller gets
//! a cached value (possibly a sentinel) immediately, and a background task
//! fills in the real answer for next time.

use crate::country::{CountryLookup, NoopCountryLookup};
use portwatch_core::ip::is_public_ip;
use portwatch_core::types::ReputationStatus;
use portwatch_secrets::ReputationCredential;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const ENTRY_TTL: Duration = Duration::from_secs(3600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const PENDING: i32 = -1;
const FAILED: i32 = -2;

const ABUSEIPDB_ENDPOINT: &str = "https://api.abuseipdb.com/api/v2/check";

struct CacheEntry {
    captured_at: Instant,
    score: i32,
}

#[derive(Deserialize)]
struct AbuseIpDbResponse {
    data: AbuseIpDbData,
}

#[derive(Deserialize)]
struct AbuseIpDbData {
    #[serde(rename = "abuseConfidenceScore")]
    abuse_confidence_score: i32,
}

/// Process-wide cache of IP reputation scores, keyed by ip string.
pub struct ReputationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    status: Mutex<ReputationStatus>,
    credential: Arc<dyn ReputationCredential>,
    country: Arc<dyn CountryLookup>,
    client: reqwest::Client,
}

impl ReputationCache {
    pub fn new(credential: Arc<dyn ReputationCredential>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            status: Mutex::new(ReputationStatus::Pending),
            credential,
            country: Arc::new(NoopCountryLookup),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_country_lookup(mut self, country: Arc<dyn CountryLookup>) -> Self {
        self.country = country;
        self
    }

    pub fn status(&self) -> ReputationStatus {
        *self.status.lock().expect("reputation status lock poisoned")
    }

    /// Non-stale cached score for `ip`, if any. Sentinel values `-1`
    /// (pending) and `-2` (failed) are returned like any other score; it
    /// is the caller's job (the scorer) to treat them as "no bonus."
    pub fn get(&self, ip: &str) -> Option<i32> {
        let entries = self.entries.lock().expect("reputation cache lock poisoned");
        let entry = entries.get(ip)?;
        if entry.captured_at.elapsed() < ENTRY_TTL {
            Some(entry.score)
        } else {
            None
        }
    }

    pub fn country(&self, ip: &str) -> Option<String> {
        self.country.lookup(ip)
    }

    /// Kick off enrichment for `ip` if it is public and not already cached
    /// or in flight. The sentinel write under the entries lock is the
    /// claim that prevents duplicate concurrent lookups for the same ip.
    pub fn enrich_async(self: &Arc<Self>, ip: String) {
        let Ok(addr) = IpAddr::from_str(&ip) else {
            return;
        };
        if !is_public_ip(&addr) {
            return;
        }

        {
            let mut entries = self.entries.lock().expect("reputation cache lock poisoned");
            if let Some(entry) = entries.get(&ip) {
                if entry.captured_at.elapsed() < ENTRY_TTL {
                    return;
                }
            }
            // Claim this ip synchronously, under the same lock acquisition
            // as the stale-check above, so a second concurrent caller sees
            // the pending sentinel and returns instead of also spawning.
            entries.insert(
                ip.clone(),
                CacheEntry {
                    captured_at: Instant::now(),
                    score: PENDING,
                },
            );
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let Some(key) = this.credential.api_key().await else {
                this.entries
                    .lock()
                    .expect("reputation cache lock poisoned")
                    .remove(&ip);
                *this.status.lock().expect("reputation status lock poisoned") =
                    ReputationStatus::Disabled;
                return;
            };

            let lookup = tokio::time::timeout(
                REQUEST_TIMEOUT,
                this.client
                    .get(ABUSEIPDB_ENDPOINT)
                    .header("Key", key.expose_secret())
                    .header("Accept", "application/json")
                    .query(&[("ipAddress", ip.as_str())])
                    .send(),
            )
            .await;

            let (score, status) = match lookup {
                Ok(Ok(resp)) if resp.status().is_success() => {
                    match resp.json::<AbuseIpDbResponse>().await {
                        Ok(parsed) => (
                            parsed.data.abuse_confidence_score.clamp(0, 100),
                            ReputationStatus::Ok,
                        ),
                        Err(e) => {
                            tracing::warn!("reputation lookup for {ip}: bad response body: {e}");
                            (FAILED, ReputationStatus::Failed)
                        }
                    }
                }
                Ok(Ok(resp)) => {
                    tracing::warn!(
                        "reputation lookup for {ip}: non-200 status {}",
                        resp.status()
                    );
                    (FAILED, ReputationStatus::Failed)
                }
                Ok(Err(e)) => {
                    tracing::warn!("reputation lookup for {ip}: connection error: {e}");
                    (PENDING, ReputationStatus::Failed)
                }
                Err(_) => {
                    tracing::warn!("reputation lookup for {ip}: timed out");
                    (PENDING, ReputationStatus::Failed)
                }
            };

            let mut entries = this.entries.lock().expect("reputation cache lock poisoned");
            entries.insert(
                ip.clone(),
                CacheEntry {
                    captured_at: Instant::now(),
                    score,
                },
            );
            drop(entries);
            *this.status.lock().expect("reputation status lock poisoned") = status;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use portwatch_secrets::SecretString;

    struct NoCredential;

    #[async_trait]
    impl ReputationCredential for NoCredential {
        async fn api_key(&self) -> Option<SecretString> {
            None
        }
    }

    struct StubCredential;

    #[async_trait]
    impl ReputationCredential for StubCredential {
        async fn api_key(&self) -> Option<SecretString> {
            Some(SecretString::from("stub-key"))
        }
    }

    #[tokio::test]
    async fn private_ip_is_never_enriched() {
        let cache = Arc::new(ReputationCache::new(Arc::new(NoCredential)));
        cache.clone().enrich_async("192.168.1.1".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("192.168.1.1").is_none());
        assert_eq!(cache.status(), ReputationStatus::Pending);
    }

    #[tokio::test]
    async fn missing_credential_marks_status_disabled() {
        let cache = Arc::new(ReputationCache::new(Arc::new(NoCredential)));
        cache.clone().enrich_async("93.184.216.34".to_string());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.status(), ReputationStatus::Disabled);
        assert!(cache.get("93.184.216.34").is_none());
    }

    #[tokio::test]
    async fn duplicate_enrich_calls_reuse_the_pending_claim() {
        let cache = Arc::new(ReputationCache::new(Arc::new(StubCredential)));
        cache.clone().enrich_async("93.184.216.34".to_string());
        // The claim is written synchronously inside `enrich_async`, before
        // any task is spawned, so it is visible immediately -- a second
        // concurrent caller sees it and does not spawn its own lookup task.
        assert_eq!(cache.get("93.184.216.34"), Some(PENDING));
        cache.clone().enrich_async("93.184.216.34".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.get("93.184.216.34").is_some());
    }

    #[test]
    fn country_lookup_defaults_to_noop() {
        let cache = ReputationCache::new(Arc::new(NoCredential));
        assert_eq!(cache.country("8.8.8.8"), None);
    }
}
