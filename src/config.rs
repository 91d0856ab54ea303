use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{Result, TargetError};

/// How an order treats line items whose product cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum LineItemPolicy {
    /// Drop unresolved lines; skip the order when fewer than `min_resolved` lines remain.
    DropUnresolved {
        #[serde(default = "default_min_resolved")]
        min_resolved: usize,
    },
    /// Skip the whole order as soon as one line cannot be resolved.
    RequireAll,
}

impl Default for LineItemPolicy {
    fn default() -> Self {
        LineItemPolicy::DropUnresolved { min_resolved: default_min_resolved() }
    }
}

fn default_min_resolved() -> usize {
    1
}

fn default_http_timeout_ms() -> u64 {
    60_000
}

fn default_http_max_retries() -> u32 {
    4
}

fn default_http_retry_backoff_ms() -> u64 {
    500
}

fn default_page_size() -> u32 {
    100
}

fn default_max_sampled_errors() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub site_url: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,
    #[serde(default = "default_http_max_retries")]
    pub http_max_retries: u32,
    #[serde(default = "default_http_retry_backoff_ms")]
    pub http_retry_backoff_ms: u64,
    // WooCommerce caps per_page at 100
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_sampled_errors")]
    pub max_sampled_errors: usize,
    #[serde(default)]
    pub line_item_policy: LineItemPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            consumer_key: String::new(),
            consumer_secret: String::new(),
            site_url: String::new(),
            user_agent: None,
            http_timeout_ms: default_http_timeout_ms(),
            http_max_retries: default_http_max_retries(),
            http_retry_backoff_ms: default_http_retry_backoff_ms(),
            page_size: default_page_size(),
            max_sampled_errors: default_max_sampled_errors(),
            line_item_policy: LineItemPolicy::default(),
        }
    }
}

impl Config {
    /// Read the Singer config file, apply env overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TargetError::Configuration(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let mut cfg: Config = serde_json::from_str(&raw)
            .map_err(|e| TargetError::Configuration(format!("invalid config file {}: {}", path.display(), e)))?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        let get = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());

        if let Some(v) = get("WOOCOMMERCE_SITE_URL") {
            self.site_url = v;
        }
        if let Some(v) = get("WOOCOMMERCE_CONSUMER_KEY") {
            self.consumer_key = v;
        }
        if let Some(v) = get("WOOCOMMERCE_CONSUMER_SECRET") {
            self.consumer_secret = v;
        }
        if let Some(v) = get("WOOCOMMERCE_USER_AGENT") {
            self.user_agent = Some(v);
        }
        if let Some(v) = get("HTTP_TIMEOUT_MS").and_then(|s| s.parse().ok()) {
            self.http_timeout_ms = v;
        }
        if let Some(v) = get("HTTP_MAX_RETRIES").and_then(|s| s.parse().ok()) {
            self.http_max_retries = v;
        }
        if let Some(v) = get("HTTP_RETRY_BACKOFF_MS").and_then(|s| s.parse().ok()) {
            self.http_retry_backoff_ms = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("consumer_key", &self.consumer_key),
            ("consumer_secret", &self.consumer_secret),
            ("site_url", &self.site_url),
        ] {
            if value.trim().is_empty() {
                return Err(TargetError::Configuration(format!("missing required config key '{}'", key)));
            }
        }
        let parsed = url::Url::parse(self.site_url.trim())
            .map_err(|e| TargetError::Configuration(format!("site_url '{}' is not a valid URL: {}", self.site_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TargetError::Configuration(format!("site_url '{}' must use http or https", self.site_url)));
        }
        if self.page_size == 0 || self.page_size > 100 {
            return Err(TargetError::Configuration(format!("page_size must be between 1 and 100, got {}", self.page_size)));
        }
        Ok(())
    }

    /// REST root, always ending in a slash so relative endpoints can be appended.
    pub fn api_base_url(&self) -> String {
        format!("{}/wp-json/wc/v3/", self.site_url.trim().trim_end_matches('/'))
    }
}
