use thiserror::Error;

/// Unified error type for all Spotify-related operations.
///
/// Covers the OAuth token lifecycle, catalog API calls and token storage.
#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Authentication failed during OAuth flow or token exchange.
    #[error("Spotify authentication failed: {reason}")]
    AuthFailed { reason: String },

    /// No token has been obtained yet.
    #[error("Spotify is not authorized")]
    NotAuthorized,

    /// Token has expired and could not be refreshed.
    #[error("Spotify token expired and refresh failed")]
    TokenExpired,

    /// No playlist is configured and creating one is disabled.
    #[error("No Spotify playlist configured")]
    NoPlaylist,

    /// Error from the Spotify API client.
    #[error("Spotify API error: {0}")]
    Api(#[from] rspotify::ClientError),

    /// A playlist, track or user id could not be parsed.
    #[error("Invalid Spotify id: {0}")]
    InvalidId(#[from] rspotify::model::IdError),

    /// Failed to read or write the token store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse or serialize JSON data.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with `SpotifyError`.
pub type Result<T> = std::result::Result<T, SpotifyError>;
