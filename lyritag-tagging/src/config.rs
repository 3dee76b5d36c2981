//! ACRCloud provider configuration.

use const_format::concatcp;
use lyritag_core::{CoreError, ProvidersConfig};
use serde::{Deserialize, Serialize};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "acrcloud";

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// ACRCloud-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcrCloudConfig {
    /// Project host, e.g. `identify-eu-west-1.acrcloud.com`
    pub host: String,
    pub access_key: String,
    pub access_secret: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl AcrCloudConfig {
    /// Extract ACRCloud config from the dynamic providers config.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed.
    pub fn from_providers(providers: &ProvidersConfig) -> Result<Option<Self>, CoreError> {
        providers.get(PROVIDER_NAME)
    }

    /// Validate that required fields are present.
    ///
    /// # Errors
    ///
    /// Returns an error if required fields are missing or empty.
    pub fn validate(&self) -> Result<(), CoreError> {
        for (field, value) in [
            ("host", &self.host),
            ("access_key", &self.access_key),
            ("access_secret", &self.access_secret),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::ConfigMissingField {
                    field: format!("providers.{PROVIDER_NAME}.{field}"),
                });
            }
        }
        if self.timeout_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: format!("providers.{PROVIDER_NAME}.timeout_secs must be at least 1"),
            });
        }
        Ok(())
    }
}

/// Config template for the ACRCloud provider.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.acrcloud]
# Required for fetch_audio_tag
# Get these from https://console.acrcloud.com (Audio & Video Recognition project)
host = ""
access_key = ""
access_secret = ""
timeout_secs = "#,
    DEFAULT_TIMEOUT_SECS,
    "\n\n"
);
