//! Spotify playlist linker configuration.

use const_format::concatcp;
use lyritag_core::{CoreError, ProvidersConfig};
use serde::{Deserialize, Serialize};

/// Provider name used in config file
pub const PROVIDER_NAME: &str = "spotify";

/// Callback route served by the app
pub const CALLBACK_PATH: &str = "/api/spotify/callback";

/// Default playlist created for tagged tracks
pub const DEFAULT_PLAYLIST_NAME: &str = "Home Assistant ACR Discoveries";

const DEFAULT_REDIRECT_URI: &str = concatcp!("http://127.0.0.1:8099", CALLBACK_PATH);

/// Spotify-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyLinkerConfig {
    /// Spotify OAuth client ID
    pub client_id: String,
    /// Spotify OAuth client secret
    pub client_secret: String,
    /// OAuth redirect URI, must point at the callback route
    #[serde(default = "default_redirect_uri")]
    pub oauth_redirect_uri: String,
    /// Existing playlist to add tracks to
    #[serde(default)]
    pub playlist_id: Option<String>,
    /// Create a playlist when none is configured
    #[serde(default = "default_true")]
    pub create_playlist: bool,
    #[serde(default = "default_playlist_name")]
    pub playlist_name: String,
    /// Add every tagged track automatically
    #[serde(default)]
    pub auto_add_tagged: bool,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.into()
}

const fn default_true() -> bool {
    true
}

fn default_playlist_name() -> String {
    DEFAULT_PLAYLIST_NAME.into()
}

impl SpotifyLinkerConfig {
    /// Extract Spotify config from the dynamic providers config.
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
        if self.client_id.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_id".into(),
            });
        }
        if self.client_secret.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "providers.spotify.client_secret".into(),
            });
        }
        Ok(())
    }

    /// Configured playlist id, treating an empty string as unset
    #[must_use]
    pub fn playlist_id(&self) -> Option<&str> {
        self.playlist_id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

/// Config template for the Spotify linker.
/// This is appended to the base config template when creating a new config file.
pub const CONFIG_TEMPLATE: &str = concatcp!(
    r#"[providers.spotify]
# Optional: enables add_to_spotify
# Get these from https://developer.spotify.com/dashboard
client_id = ""
client_secret = ""
oauth_redirect_uri = ""#,
    DEFAULT_REDIRECT_URI,
    r#""
# Leave empty to create a playlist on first authorization
playlist_id = ""
create_playlist = true
playlist_name = ""#,
    DEFAULT_PLAYLIST_NAME,
    r#""
auto_add_tagged = false

"#
);
