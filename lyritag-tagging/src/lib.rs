pub mod acrcloud;
pub mod config;
pub mod error;
pub mod recorder;
pub mod response;
pub mod tagger;

pub use acrcloud::{AcrCloudClient, RecognitionProvider};
pub use config::{AcrCloudConfig, CONFIG_TEMPLATE as ACRCLOUD_CONFIG_TEMPLATE};
pub use error::TaggingError;
pub use recorder::{encode_wav, AudioChunkRecorder, ChunkSource};
pub use response::RecognitionResponse;
pub use tagger::{AttemptResult, FingerprintTagger, RecognitionAttempt, TaggingRun};
