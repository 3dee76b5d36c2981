use crate::error::{CoreError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LyritagConfig {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub lyrics: LyricsConfig,
    #[serde(default)]
    pub tagging: TaggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Provider-owned tables (`[providers.<name>]`), parsed by the provider crates
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Entity ids of the host collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Media player watched at startup and used for autostart
    #[serde(default)]
    pub media_player: String,
    #[serde(default = "default_lyrics_enable")]
    pub lyrics_enable: String,
    /// Previous, current and next line slots
    #[serde(default = "default_display_lines")]
    pub display_lines: [String; 3],
    #[serde(default = "default_capture_switch")]
    pub capture_switch: String,
    #[serde(default = "default_tagging_result")]
    pub tagging_result: String,
}

fn default_lyrics_enable() -> String {
    "input_boolean.lyrics_enable".into()
}

fn default_display_lines() -> [String; 3] {
    [
        "input_text.line1".into(),
        "input_text.line2".into(),
        "input_text.line3".into(),
    ]
}

fn default_capture_switch() -> String {
    "switch.tagging_enable".into()
}

fn default_tagging_result() -> String {
    "sensor.tagging_result".into()
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            media_player: String::new(),
            lyrics_enable: default_lyrics_enable(),
            display_lines: default_display_lines(),
            capture_switch: default_capture_switch(),
            tagging_result: default_tagging_result(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsConfig {
    /// Provider priority: providers are tried in order
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,
    /// Seconds subtracted from a recognized play offset
    #[serde(default = "default_finetune_sync")]
    pub finetune_sync_secs: f64,
    /// Content-id prefixes treated as radio streams
    #[serde(default = "default_radio_prefixes")]
    pub radio_prefixes: Vec<String>,
    /// Whether a paused player interrupts the running session
    #[serde(default = "default_true")]
    pub interrupt_on_pause: bool,
}

fn default_providers() -> Vec<String> {
    vec!["lrclib".into()]
}

const fn default_finetune_sync() -> f64 {
    2.0
}

fn default_radio_prefixes() -> Vec<String> {
    vec!["library://radio".into()]
}

const fn default_true() -> bool {
    true
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            finetune_sync_secs: default_finetune_sync(),
            radio_prefixes: default_radio_prefixes(),
            interrupt_on_pause: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggingConfig {
    #[serde(default = "default_listen_host")]
    pub listen_host: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_chunk_secs")]
    pub chunk_secs: u64,
    #[serde(default = "default_duration_secs")]
    pub default_duration_secs: u64,
    #[serde(default = "default_true")]
    pub include_lyrics: bool,
}

fn default_listen_host() -> String {
    "0.0.0.0".into()
}

const fn default_listen_port() -> u16 {
    6056
}

const fn default_chunk_secs() -> u64 {
    3
}

const fn default_duration_secs() -> u64 {
    10
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            listen_host: default_listen_host(),
            listen_port: default_listen_port(),
            chunk_secs: default_chunk_secs(),
            default_duration_secs: default_duration_secs(),
            include_lyrics: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Issue `fetch_lyrics` for `host.media_player` at startup
    #[serde(default = "default_true")]
    pub autostart: bool,
}

fn default_listen() -> String {
    "127.0.0.1:8099".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            autostart: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Also write logs to ~/.config/lyritag/lyritag.log
    #[serde(default)]
    pub enabled: bool,
}

/// Free-form `[providers.*]` tables.
///
/// Provider crates own their config structs and pull them out by name, so the
/// core crate never has to know every provider up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvidersConfig(toml::Table);

impl ProvidersConfig {
    /// Deserialize the table for `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the table exists but does not match `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.0.get(name) {
            Some(value) => {
                let parsed = value.clone().try_into().map_err(|e: toml::de::Error| {
                    CoreError::ConfigInvalid {
                        message: format!("providers.{name}: {e}"),
                    }
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }
}

impl LyritagConfig {
    /// Get the config file path (~/.config/lyritag/config.toml)
    #[must_use]
    pub fn config_path() -> PathBuf {
        crate::paths::config_path()
    }

    /// Load config from the default path, or write a template on first run.
    ///
    /// `provider_templates` are appended to the generated file so provider
    /// crates can document their own sections.
    ///
    /// # Errors
    ///
    /// Returns `ConfigNotFound` after writing the template, or an error if the
    /// file cannot be read or parsed.
    pub fn load_or_create(provider_templates: &[&str]) -> Result<Self> {
        Self::load_or_create_at(&Self::config_path(), provider_templates)
    }

    /// Same as [`Self::load_or_create`] against an explicit path.
    ///
    /// # Errors
    ///
    /// See [`Self::load_or_create`].
    pub fn load_or_create_at(path: &Path, provider_templates: &[&str]) -> Result<Self> {
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, build_config_template(provider_templates))?;
            return Err(CoreError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or required fields are missing.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.host.media_player.is_empty() {
            return Err(CoreError::ConfigMissingField {
                field: "host.media_player".into(),
            });
        }
        if self.tagging.chunk_secs == 0 {
            return Err(CoreError::ConfigInvalid {
                message: "tagging.chunk_secs must be at least 1".into(),
            });
        }
        if !(1..=60).contains(&self.tagging.default_duration_secs) {
            return Err(CoreError::ConfigInvalid {
                message: "tagging.default_duration_secs must be between 1 and 60".into(),
            });
        }
        if !self.lyrics.finetune_sync_secs.is_finite() || self.lyrics.finetune_sync_secs < 0.0 {
            return Err(CoreError::ConfigInvalid {
                message: "lyrics.finetune_sync_secs must be a non-negative number".into(),
            });
        }
        Ok(())
    }
}

/// Read only `[logging] enabled` from the config file.
///
/// Used before tracing is initialised, so any failure just means "disabled".
#[must_use]
pub fn file_logging_enabled(path: &Path) -> bool {
    #[derive(Deserialize)]
    struct Partial {
        #[serde(default)]
        logging: LoggingConfig,
    }

    fs::read_to_string(path)
        .ok()
        .and_then(|content| toml::from_str::<Partial>(&content).ok())
        .is_some_and(|partial| partial.logging.enabled)
}

/// Build the full config template from the base template plus provider snippets
#[must_use]
pub fn build_config_template(provider_templates: &[&str]) -> String {
    let mut template = String::from(BASE_CONFIG_TEMPLATE);
    for snippet in provider_templates {
        template.push_str(snippet);
    }
    template
}

const BASE_CONFIG_TEMPLATE: &str = r#"# Lyritag Configuration
# ~/.config/lyritag/config.toml

[host]
# Required: media player entity to follow at startup
media_player = ""
lyrics_enable = "input_boolean.lyrics_enable"
display_lines = ["input_text.line1", "input_text.line2", "input_text.line3"]
capture_switch = "switch.tagging_enable"
tagging_result = "sensor.tagging_result"

[lyrics]
# Providers are tried in order; first non-empty document wins
providers = ["lrclib"]
# Seconds subtracted from a recognized offset to cover recognition latency
finetune_sync_secs = 2.0
radio_prefixes = ["library://radio"]
interrupt_on_pause = true

[tagging]
# UDP endpoint receiving raw 16 kHz mono 16-bit PCM
listen_host = "0.0.0.0"
listen_port = 6056
chunk_secs = 3
default_duration_secs = 10
include_lyrics = true

[server]
listen = "127.0.0.1:8099"
autostart = true

[logging]
enabled = false

"#;
