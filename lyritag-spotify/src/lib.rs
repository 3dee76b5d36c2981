pub mod callback;
pub mod config;
pub mod error;
pub mod linker;
pub mod oauth;
pub mod paths;
pub mod store;

pub use config::{SpotifyLinkerConfig, CONFIG_TEMPLATE as SPOTIFY_CONFIG_TEMPLATE};
pub use error::SpotifyError;
pub use linker::{AddOutcome, PlaylistLinker};
pub use oauth::SpotifyOAuth;
pub use paths::SPOTIFY_TOKEN_CACHE_FILE_NAME;
pub use store::{FileTokenStore, StoredToken, TokenStore};
