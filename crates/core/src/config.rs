use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `CRM__` (e.g. `CRM__API__HTTP_PORT=8080`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Comma-separated list of allowed CORS origins.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

impl ApiConfig {
    pub fn cors_origins_list(&self) -> Vec<String> {
        self.cors_origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default functions
fn default_instance_name() -> String {
    "crm-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_cors_origins() -> String {
    "http://localhost:5173".to_string()
}
fn default_metrics_port() -> u16 {
    9091
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            segmentation: SegmentationConfig::default(),
            webhooks: WebhookConfig::default(),
            pagination: PaginationConfig::default(),
        }
    }
}

// ─── Segmentation Config ────────────────────────────────────────────────────

/// Fallbacks for the segment thresholds. The live values are stored settings;
/// these are only used when a stored value is missing or unparsable.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    #[serde(default = "default_regular_threshold")]
    pub default_regular_threshold: u32,
    #[serde(default = "default_vip_threshold")]
    pub default_vip_threshold: u32,
    #[serde(default = "default_reconcile_on_threshold_change")]
    pub reconcile_on_threshold_change: bool,
    /// 0 disables the periodic reconciliation task.
    #[serde(default)]
    pub reconcile_interval_secs: u64,
}

fn default_regular_threshold() -> u32 {
    5
}
fn default_vip_threshold() -> u32 {
    10
}
fn default_reconcile_on_threshold_change() -> bool {
    true
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            default_regular_threshold: default_regular_threshold(),
            default_vip_threshold: default_vip_threshold(),
            reconcile_on_threshold_change: default_reconcile_on_threshold_change(),
            reconcile_interval_secs: 0,
        }
    }
}

// ─── Webhook Config ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_webhook_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}
fn default_webhook_queue_capacity() -> usize {
    1024
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
            queue_capacity: default_webhook_queue_capacity(),
        }
    }
}

// ─── Pagination Config ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_page_limit")]
    pub default_limit: u32,
    #[serde(default = "default_max_page_limit")]
    pub max_limit: u32,
}

fn default_page_limit() -> u32 {
    10
}
fn default_max_page_limit() -> u32 {
    100
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            default_limit: default_page_limit(),
            max_limit: default_max_page_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("CRM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8000);
        assert_eq!(config.segmentation.default_regular_threshold, 5);
        assert_eq!(config.segmentation.default_vip_threshold, 10);
        assert!(config.segmentation.reconcile_on_threshold_change);
        assert_eq!(config.webhooks.timeout_secs, 10);
        assert_eq!(config.pagination.max_limit, 100);
    }

    #[test]
    fn test_cors_origins_list() {
        let api = ApiConfig {
            cors_origins: " http://a.test , ,http://b.test".to_string(),
            ..ApiConfig::default()
        };
        assert_eq!(api.cors_origins_list(), vec!["http://a.test", "http://b.test"]);
    }
}
