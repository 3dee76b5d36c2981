//! ACRCloud identification client.
//!
//! Implements the v1 `identify` call: a signed multipart upload of a WAV
//! sample.

use crate::config::AcrCloudConfig;
use crate::error::{Result, TaggingError};
use crate::response::RecognitionResponse;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::multipart::{Form, Part};
use sha1::Sha1;
use std::time::Duration;
use tracing::{debug, info};

type HmacSha1 = Hmac<Sha1>;

const IDENTIFY_PATH: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

/// A remote audio fingerprinting service
#[async_trait]
pub trait RecognitionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Submit one WAV sample
    async fn identify(&self, wav: Vec<u8>) -> Result<RecognitionResponse>;
}

/// Text that gets signed for an identify request
#[must_use]
pub fn string_to_sign(access_key: &str, timestamp: i64) -> String {
    format!("POST\n{IDENTIFY_PATH}\n{access_key}\n{DATA_TYPE}\n{SIGNATURE_VERSION}\n{timestamp}")
}

/// base64(HMAC-SHA1(secret, string-to-sign))
///
/// # Errors
///
/// Returns [`TaggingError::InvalidSecret`] if the secret is rejected as a key.
pub fn sign(access_secret: &str, access_key: &str, timestamp: i64) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(access_secret.as_bytes())
        .map_err(|_| TaggingError::InvalidSecret)?;
    mac.update(string_to_sign(access_key, timestamp).as_bytes());
    Ok(BASE64_STANDARD.encode(mac.finalize().into_bytes()))
}

/// ACRCloud client
///
/// Uses a plain `reqwest` client: multipart bodies are streamed once and
/// cannot be replayed by a retry middleware.
pub struct AcrCloudClient {
    client: reqwest::Client,
    config: AcrCloudConfig,
    endpoint: String,
}

impl AcrCloudClient {
    /// Create a client for the configured project host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: AcrCloudConfig) -> Result<Self> {
        let endpoint = format!("https://{}{IDENTIFY_PATH}", config.host.trim_end_matches('/'));
        Self::with_endpoint(config, endpoint)
    }

    /// Same as [`Self::new`] against an explicit identify URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_endpoint(config: AcrCloudConfig, endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("Lyritag/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    fn form(&self, wav: Vec<u8>, timestamp: i64) -> Result<Form> {
        let signature = sign(&self.config.access_secret, &self.config.access_key, timestamp)?;
        let sample_bytes = wav.len().to_string();
        let sample = Part::bytes(wav)
            .file_name("sample.wav")
            .mime_str("audio/wav")?;

        Ok(Form::new()
            .part("sample", sample)
            .text("sample_bytes", sample_bytes)
            .text("access_key", self.config.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("timestamp", timestamp.to_string())
            .text("signature", signature))
    }
}

#[async_trait]
impl RecognitionProvider for AcrCloudClient {
    fn name(&self) -> &'static str {
        "acrcloud"
    }

    async fn identify(&self, wav: Vec<u8>) -> Result<RecognitionResponse> {
        let timestamp = chrono::Utc::now().timestamp();
        debug!("ACRCloud POST {} ({} bytes)", self.endpoint, wav.len());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(self.form(wav, timestamp)?)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TaggingError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed = RecognitionResponse::parse(&body)?;
        info!(
            "ACRCloud response: {} (code {})",
            parsed.status.msg, parsed.status.code
        );
        Ok(parsed)
    }
}
