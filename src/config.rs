use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::extraction::ProviderId;

/// Application-level constants
pub const APP_NAME: &str = "Registra";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default safety timeout for a single recognition call.
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Get the application data directory.
/// Falls back to the working directory when no home directory is known
/// (headless service accounts).
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Path of the reference SQLite store.
pub fn database_path() -> PathBuf {
    app_data_dir().join("registra.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "registra=debug"
    } else {
        "registra=info"
    }
}

/// Provider identifiers for each cost/accuracy tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTiers {
    /// Most accurate, most expensive. Used for poor captures.
    pub accurate: ProviderId,
    /// Mid-tier provider for acceptable captures.
    pub balanced: ProviderId,
    /// Cheapest provider for good captures.
    pub economy: ProviderId,
    /// Local OCR, no network. Also the fallback path.
    pub offline: ProviderId,
}

impl Default for ProviderTiers {
    fn default() -> Self {
        Self {
            accurate: ProviderId::new("premium"),
            balanced: ProviderId::new("standard"),
            economy: ProviderId::new("economy"),
            offline: ProviderId::new("offline"),
        }
    }
}

/// Runtime configuration for the intake pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    pub providers: ProviderTiers,
    pub provider_timeout_secs: u64,
    /// Base URL of the remote recognition service, if one is deployed.
    pub recognition_url: Option<String>,
    /// Device identifier stamped on offline queue entries.
    pub device_id: String,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            providers: ProviderTiers::default(),
            provider_timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
            recognition_url: None,
            device_id: "local".into(),
        }
    }
}

impl IntakeConfig {
    /// Build a config from `REGISTRA_*` environment variables over the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(id) = non_empty("REGISTRA_PROVIDER_ACCURATE") {
            config.providers.accurate = ProviderId::new(id.trim());
        }
        if let Some(id) = non_empty("REGISTRA_PROVIDER_BALANCED") {
            config.providers.balanced = ProviderId::new(id.trim());
        }
        if let Some(id) = non_empty("REGISTRA_PROVIDER_ECONOMY") {
            config.providers.economy = ProviderId::new(id.trim());
        }
        if let Some(id) = non_empty("REGISTRA_PROVIDER_OFFLINE") {
            config.providers.offline = ProviderId::new(id.trim());
        }
        if let Some(raw) = non_empty("REGISTRA_PROVIDER_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.provider_timeout_secs = secs,
                _ => tracing::warn!(
                    value = %raw,
                    default = DEFAULT_PROVIDER_TIMEOUT_SECS,
                    "Invalid REGISTRA_PROVIDER_TIMEOUT_SECS, using default"
                ),
            }
        }
        if let Some(url) = non_empty("REGISTRA_RECOGNITION_URL") {
            config.recognition_url = Some(url.trim().trim_end_matches('/').to_string());
        }
        if let Some(device) = non_empty("REGISTRA_DEVICE_ID") {
            config.device_id = device.trim().to_string();
        }

        config
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}
