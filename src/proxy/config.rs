use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::auth::config::{DEFAULT_KIRO_VERSION, DEFAULT_REGION};
use crate::proxy::pool::SelectionStrategy;

/// Normalize a proxy URL, defaulting the scheme to http:// when missing.
pub fn normalize_proxy_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }
    if !url.contains("://") {
        format!("http://{}", url)
    } else {
        url.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    pub region: String,
    pub kiro_version: String,
    /// Optional proxy for all upstream traffic (http://, https://, socks5://).
    pub proxy_url: Option<String>,
    pub selection_strategy: SelectionStrategy,
    /// Overrides the default `~/.kiro-gateway` data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8045,
            region: DEFAULT_REGION.to_string(),
            kiro_version: DEFAULT_KIRO_VERSION.to_string(),
            proxy_url: None,
            selection_strategy: SelectionStrategy::default(),
            data_dir: None,
        }
    }
}

impl GatewayConfig {
    /// Load `kiro-gateway.json` from the data directory; missing or broken
    /// files fall back to defaults.
    pub fn load() -> Self {
        let path = Self::default().data_dir().join("kiro-gateway.json");
        let mut config = if path.exists() {
            match std::fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|c| serde_json::from_str(&c).map_err(|e| e.to_string()))
            {
                Ok(config) => config,
                Err(e) => {
                    warn!("Failed to load {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            }
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("KIRO_GATEWAY_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
        {
            info!("Using port from environment variable: {}", port);
            self.port = port;
        }
        if let Ok(region) = std::env::var("KIRO_GATEWAY_REGION") {
            if !region.trim().is_empty() {
                info!("Using region from environment variable: {}", region);
                self.region = region;
            }
        }
        if let Ok(proxy) = std::env::var("KIRO_GATEWAY_PROXY") {
            if !proxy.trim().is_empty() {
                info!("Using upstream proxy from environment variable");
                self.proxy_url = Some(normalize_proxy_url(&proxy));
            }
        }
        if let Ok(strategy) = std::env::var("KIRO_GATEWAY_STRATEGY") {
            match strategy.to_lowercase().as_str() {
                "round_robin" => self.selection_strategy = SelectionStrategy::RoundRobin,
                "random" => self.selection_strategy = SelectionStrategy::Random,
                "least_used" => self.selection_strategy = SelectionStrategy::LeastUsed,
                other => warn!("Invalid KIRO_GATEWAY_STRATEGY: {}, ignoring", other),
            }
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        if let Ok(dir) = std::env::var("KIRO_GATEWAY_DATA_DIR") {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".kiro-gateway")
    }

    pub fn roster_path(&self) -> PathBuf {
        self.data_dir().join("accounts.json")
    }

    pub fn mapping_rules_path(&self) -> PathBuf {
        self.data_dir().join("model-mappings.json")
    }

    pub fn request_log_path(&self) -> PathBuf {
        self.data_dir().join("request_logs.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 8045);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.kiro_version, "0.8.0");
        assert_eq!(config.selection_strategy, SelectionStrategy::RoundRobin);
    }

    #[test]
    fn proxy_url_normalization() {
        assert_eq!(normalize_proxy_url(""), "");
        assert_eq!(normalize_proxy_url("127.0.0.1:7890"), "http://127.0.0.1:7890");
        assert_eq!(
            normalize_proxy_url("socks5://127.0.0.1:1080"),
            "socks5://127.0.0.1:1080"
        );
    }

    #[test]
    fn paths_hang_off_the_data_dir() {
        let config = GatewayConfig {
            data_dir: Some(PathBuf::from("/tmp/kgw")),
            ..Default::default()
        };
        assert_eq!(config.roster_path(), PathBuf::from("/tmp/kgw/accounts.json"));
        assert_eq!(
            config.request_log_path(),
            PathBuf::from("/tmp/kgw/request_logs.db")
        );
    }
}
