use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::AppCore;

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:4000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub disable_network: Option<bool>,
    /// Failed sends before an outbox entry stops being retried automatically.
    /// Unset means retry on every drain trigger.
    pub max_send_attempts: Option<u32>,
}

pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join("tern_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return AppConfig::default();
    };
    match serde_json::from_slice::<AppConfig>(&bytes) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::warn!(%e, path = %path.display(), "ignoring unreadable config");
            AppConfig::default()
        }
    }
}

impl AppConfig {
    pub fn api_base_url(&self) -> String {
        if let Ok(url) = std::env::var("TERN_API_URL") {
            if !url.trim().is_empty() {
                return url.trim().trim_end_matches('/').to_string();
            }
        }
        self.api_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

impl AppCore {
    pub(super) fn network_enabled(&self) -> bool {
        // Used to keep Rust tests deterministic and offline.
        if let Some(disable) = self.config.disable_network {
            return !disable;
        }
        std::env::var("TERN_DISABLE_NETWORK").ok().as_deref() != Some("1")
    }

    /// Connectivity as the sync coordinator sees it.
    pub(super) fn is_online(&self) -> bool {
        self.network_enabled() && self.monitor.current_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert!(cfg.disable_network.is_none());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn reads_partial_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("tern_config.json"),
            r#"{"api_base_url":"http://example.test/api/","max_send_attempts":3}"#,
        )
        .unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert_eq!(cfg.api_base_url.as_deref(), Some("http://example.test/api/"));
        assert_eq!(cfg.max_send_attempts, Some(3));
        assert_eq!(cfg.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn garbage_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tern_config.json"), b"{not json").unwrap();
        let cfg = load_app_config(dir.path().to_str().unwrap());
        assert!(cfg.api_base_url.is_none());
    }
}
