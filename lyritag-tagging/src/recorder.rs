//! UDP audio capture.
//!
//! The microphone satellite streams raw 16 kHz mono 16-bit little-endian PCM
//! as UDP datagrams. Packets are taken in arrival order; nothing is reordered
//! or retransmitted. Anything queued between recordings is dropped.

use crate::error::{Result, TaggingError};
use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use std::io::Cursor;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info};

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Largest datagram read in one call
pub const MAX_DATAGRAM: usize = 4096;

/// Something that can record a chunk of audio as a WAV file
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Record for `duration` and return the encoded WAV bytes
    async fn record(&self, duration: Duration) -> Result<Vec<u8>>;
}

/// Collects PCM datagrams from a bound UDP socket
pub struct AudioChunkRecorder {
    socket: UdpSocket,
}

impl AudioChunkRecorder {
    /// Bind the capture socket.
    ///
    /// # Errors
    ///
    /// Returns `TaggingError::Bind` if the address is invalid or taken.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let socket = UdpSocket::bind(&addr)
            .await
            .map_err(|source| TaggingError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("Listening for audio datagrams on {}", addr);
        Ok(Self { socket })
    }

    /// Address the socket is bound to
    ///
    /// # Errors
    ///
    /// Returns an error if the socket has no local address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Discard datagrams that queued up while nobody was recording
    fn drain_stale(&self, buf: &mut [u8]) -> Result<usize> {
        let mut discarded = 0;
        loop {
            match self.socket.try_recv_from(buf) {
                Ok((len, _from)) => discarded += len,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Accumulate raw PCM until `duration` has elapsed
    async fn receive_for(&self, duration: Duration) -> Result<Vec<u8>> {
        let mut buf = [0u8; MAX_DATAGRAM];
        let stale = self.drain_stale(&mut buf)?;
        if stale > 0 {
            debug!("Dropped {} stale bytes queued before recording", stale);
        }

        let deadline = Instant::now() + duration;
        let mut pcm = Vec::new();
        let mut packets = 0usize;

        loop {
            match tokio::time::timeout_at(deadline, self.socket.recv_from(&mut buf)).await {
                Ok(Ok((len, _from))) => {
                    pcm.extend_from_slice(&buf[..len]);
                    packets += 1;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_elapsed) => break,
            }
        }

        debug!("Captured {} bytes in {} datagrams", pcm.len(), packets);
        Ok(pcm)
    }
}

#[async_trait]
impl ChunkSource for AudioChunkRecorder {
    async fn record(&self, duration: Duration) -> Result<Vec<u8>> {
        let pcm = self.receive_for(duration).await?;
        // Encoding is CPU-bound, keep it off the scheduler
        tokio::task::spawn_blocking(move || encode_wav(&pcm))
            .await
            .map_err(|e| TaggingError::Capture(std::io::Error::other(e)))?
    }
}

/// Wrap raw little-endian PCM in a mono 16-bit WAV container.
///
/// A trailing odd byte is dropped.
///
/// # Errors
///
/// Returns an error if the WAV writer fails.
pub fn encode_wav(pcm: &[u8]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for frame in pcm.chunks_exact(2) {
            writer.write_sample(i16::from_le_bytes([frame[0], frame[1]]))?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    fn samples(wav: &[u8]) -> (WavSpec, Vec<i16>) {
        let reader = WavReader::new(Cursor::new(wav)).unwrap();
        let spec = reader.spec();
        let samples = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        (spec, samples)
    }

    #[test]
    fn test_encode_wav_format() {
        let pcm: Vec<u8> = [1i16, -2, 300, i16::MIN]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let (spec, decoded) = samples(&encode_wav(&pcm).unwrap());
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(decoded, vec![1, -2, 300, i16::MIN]);
    }

    #[test]
    fn test_encode_wav_drops_odd_byte() {
        let (_, decoded) = samples(&encode_wav(&[0x10, 0x00, 0x7f]).unwrap());
        assert_eq!(decoded, vec![16]);
    }

    #[test]
    fn test_encode_empty() {
        let (_, decoded) = samples(&encode_wav(&[]).unwrap());
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn test_loopback_capture() {
        let recorder = AudioChunkRecorder::bind("127.0.0.1", 0).await.unwrap();
        let target = recorder.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let send = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            for chunk in [[1i16, 2], [3, 4], [5, 6]] {
                let bytes: Vec<u8> = chunk.iter().flat_map(|s| s.to_le_bytes()).collect();
                sender.send_to(&bytes, target).await.unwrap();
            }
        };

        let (wav, ()) = tokio::join!(recorder.record(Duration::from_millis(200)), send);
        let (_, decoded) = samples(&wav.unwrap());
        assert_eq!(decoded, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_audio_from_before_recording_is_dropped() {
        let recorder = AudioChunkRecorder::bind("127.0.0.1", 0).await.unwrap();
        let target = recorder.local_addr().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(&[7, 0, 7, 0], target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let wav = recorder.record(Duration::from_millis(50)).await.unwrap();
        assert!(samples(&wav).1.is_empty());
    }

    #[tokio::test]
    async fn test_silence_yields_empty_chunk() {
        let recorder = AudioChunkRecorder::bind("127.0.0.1", 0).await.unwrap();
        let wav = recorder.record(Duration::from_millis(50)).await.unwrap();
        assert!(samples(&wav).1.is_empty());
    }

    #[tokio::test]
    async fn test_bind_conflict() {
        let first = AudioChunkRecorder::bind("127.0.0.1", 0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = AudioChunkRecorder::bind("127.0.0.1", port).await;
        assert!(matches!(err, Err(TaggingError::Bind { .. })));
    }
}
