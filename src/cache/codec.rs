//! Payload Codec
//!
//! Encodes audio clips into the lossless container stored on disk.

use std::io::Cursor;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Result, VoiceCacheError};

/// File extension of a stored payload.
pub const PAYLOAD_EXTENSION: &str = "wav";

/// MIME type used when payload bytes are served back.
pub const PAYLOAD_MIME: &str = "audio/wav";

// == Audio Clip ==
/// Decoded payload: interleaved samples plus sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioClip {
    /// Single-channel clip.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Little-endian bytes of the samples, the input of the RAW content hash.
    pub fn sample_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Encodes a clip as 32-bit float WAV.
pub fn encode(clip: &AudioClip) -> Result<Vec<u8>> {
    if clip.channels == 0 || clip.sample_rate == 0 {
        return Err(VoiceCacheError::InvalidRequest(
            "audio needs at least one channel and a non-zero sample rate".to_string(),
        ));
    }
    let spec = WavSpec {
        channels: clip.channels,
        sample_rate: clip.sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for sample in &clip.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decodes WAV bytes of any sample format into float samples.
pub fn decode(bytes: &[u8]) -> Result<AudioClip> {
    let mut reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<Vec<_>, _>>()?,
        SampleFormat::Int => {
            let scale = (1_i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    Ok(AudioClip {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_clip_survives_encoding() {
        let clip = AudioClip::mono(vec![0.0, 0.25, -0.5, 1.0], 22050);
        let decoded = decode(&encode(&clip).unwrap()).unwrap();
        assert_eq!(decoded, clip);
    }

    #[test]
    fn test_decode_integer_wav() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            writer.write_sample(16384_i16).unwrap();
            writer.write_sample(-32768_i16).unwrap();
            writer.finalize().unwrap();
        }

        let clip = decode(&cursor.into_inner()).unwrap();
        assert_eq!(clip.channels, 2);
        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode(b"not audio"), Err(VoiceCacheError::Codec(_))));
    }

    #[test]
    fn test_encode_rejects_zero_rate() {
        let clip = AudioClip::mono(vec![0.0], 0);
        assert!(matches!(encode(&clip), Err(VoiceCacheError::InvalidRequest(_))));
    }
}
