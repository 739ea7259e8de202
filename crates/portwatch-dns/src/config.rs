//! DNS analyzer configuration: whitelist/blacklist lists editable at
//! runtime and persisted to a JSON file under a platform support
//! directory, created with defaults on first run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsAnalyzerConfig {
    pub whitelist_domains: Vec<String>,
    pub whitelist_suffixes: Vec<String>,
    pub blacklist_keywords: Vec<String>,
    pub blacklist_tlds: Vec<String>,
}

impl Default for DnsAnalyzerConfig {
    fn default() -> Self {
        Self {
            whitelist_domains: vec![
                "apple.com".to_string(),
                "icloud.com".to_string(),
                "microsoft.com".to_string(),
                "google.com".to_string(),
                "github.com".to_string(),
                "cloudflare.com".to_string(),
            ],
            whitelist_suffixes: vec![
                ".apple.com".to_string(),
                ".icloud.com".to_string(),
                ".googleapis.com".to_string(),
                ".microsoft.com".to_string(),
            ],
            blacklist_keywords: vec![
                "malware".to_string(),
                "phishing".to_string(),
                "c2".to_string(),
                "exploit".to_string(),
                "trojan".to_string(),
                "botnet".to_string(),
            ],
            blacklist_tlds: vec![
                ".tk".to_string(),
                ".ml".to_string(),
                ".ga".to_string(),
                ".cf".to_string(),
                ".gq".to_string(),
                ".xyz".to_string(),
            ],
        }
    }
}

/// Platform-appropriate config directory: macOS uses Application Support,
/// everything else falls back to a dotfile directory in the home dir.
pub fn config_path() -> PathBuf {
    if cfg!(target_os = "macos") {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Library/Application Support/PortWatch/dns_config.json")
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".portwatch/dns_config.json")
    }
}

impl DnsAnalyzerConfig {
    pub fn load_or_create(path: &std::path::Path) -> std::io::Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            match serde_json::from_str(&text) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("DNS analyzer config corrupt ({e}), restoring defaults");
                }
            }
        }

        let defaults = Self::default();
        defaults.save(path)?;
        Ok(defaults)
    }

    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
    }
}

/// Atomically swappable holder for the active config, so a reload never
/// races a concurrent `analyze` call against half-written state.
pub struct ConfigHandle {
    path: PathBuf,
    inner: RwLock<DnsAnalyzerConfig>,
}

impl ConfigHandle {
    pub fn load_default() -> std::io::Result<Self> {
        let path = config_path();
        let config = DnsAnalyzerConfig::load_or_create(&path)?;
        Ok(Self {
            path,
            inner: RwLock::new(config),
        })
    }

    pub fn at_path(path: PathBuf) -> std::io::Result<Self> {
        let config = DnsAnalyzerConfig::load_or_create(&path)?;
        Ok(Self {
            path,
            inner: RwLock::new(config),
        })
    }

    pub fn get(&self) -> DnsAnalyzerConfig {
        self.inner.read().expect("dns config lock poisoned").clone()
    }

    /// Reload from disk, swapping the in-memory config atomically.
    pub fn reload(&self) -> std::io::Result<()> {
        let fresh = DnsAnalyzerConfig::load_or_create(&self.path)?;
        *self.inner.write().expect("dns config lock poisoned") = fresh;
        Ok(())
    }

    pub fn replace(&self, config: DnsAnalyzerConfig) -> std::io::Result<()> {
        config.save(&self.path)?;
        *self.inner.write().expect("dns config lock poisoned") = config;
        Ok(())
    }
}
