pub mod clock;
pub mod command;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod host;
pub mod lrc;
pub mod normalize;
pub mod paths;
pub mod playback;
pub mod provider;
pub mod session;
pub mod store;
pub mod time;
pub mod watcher;

pub use clock::{MonotonicClock, SyncAnchor, SystemClock, WallClock};
pub use command::{
    validate_entity_id, AddToPlaylistCommand, AudioTagRequest, FetchAudioTagCommand,
    FetchLyricsCommand,
};
pub use config::{
    build_config_template, file_logging_enabled, HostConfig, LoggingConfig, LyricsConfig,
    LyritagConfig, ProvidersConfig, ServerConfig, TaggingConfig,
};

/// Re-export toml error type for config parsing error handling
pub use toml::de::Error as TomlParseError;
pub use error::CoreError;
pub use fetcher::LyricsFetcher;
pub use host::{
    CaptureSwitch, DisplaySink, FeatureToggle, Host, Notification, Notifier, NowPlayingSource,
    StatusDisplay, TaggingResultSink,
};
pub use lrc::{Cue, DisplayLines, LyricsTimeline, TimelineEntry};
pub use normalize::{normalize_track_name, strip_cjk};
pub use paths::{config_dir, config_path, log_file_path, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
pub use playback::{ContentClass, NowPlaying, PlayerState, RecognizedTrack, TrackIdentity};
pub use provider::{FetchedLyrics, LyricsProvider, LyricsQuery, LyricsResult};
pub use session::{
    SessionCoordinator, SessionHandle, SessionRequest, SessionState, SessionTrigger,
    PLACEHOLDER_NOT_SYNCED,
};
pub use store::{EntityState, EntityStore, HostEntities, StateChange, StoreHost};
pub use time::DurationExt;
pub use watcher::{
    FetchOutcome, PlaybackWatcher, RecognitionHandoff, WatchDecision, WatcherSettings,
};
