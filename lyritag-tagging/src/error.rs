use thiserror::Error;

/// Errors raised while capturing audio or talking to the recognition service.
///
/// The tagger catches all of these at the run boundary; they only surface
/// through constructors and the lower-level building blocks.
#[derive(Debug, Error)]
pub enum TaggingError {
    /// The UDP capture socket could not be bound.
    #[error("Failed to bind audio capture socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Receiving from the capture socket failed.
    #[error("Audio capture failed: {0}")]
    Capture(#[from] std::io::Error),

    /// The WAV container could not be written.
    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    /// The access secret cannot be used as an HMAC key.
    #[error("Invalid ACRCloud access secret")]
    InvalidSecret,

    /// The HTTP request to the recognition service failed.
    #[error("Recognition request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The recognition service answered with a non-success HTTP status.
    #[error("Recognition service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The recognition response was not the expected JSON.
    #[error("Malformed recognition response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for Results with `TaggingError`.
pub type Result<T> = std::result::Result<T, TaggingError>;
