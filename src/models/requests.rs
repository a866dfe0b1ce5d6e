//! Request DTOs for the voice cache API
//!
//! Defines the structure of incoming HTTP request bodies.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::cache::{codec, AudioClip};
use crate::error::{Result, VoiceCacheError};
use crate::pipeline::GenerationJob;

/// Longest accepted upload file name.
pub const MAX_FILE_NAME_LENGTH: usize = 255;

/// Request body for an upload (POST /sessions/:session/uploads)
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// Name the upload is listed under
    pub file_name: String,
    /// Base64-encoded WAV file
    pub audio: String,
}

impl UploadRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        let name = self.file_name.trim();
        if name.is_empty() {
            return Some("File name cannot be empty".to_string());
        }
        if name.len() > MAX_FILE_NAME_LENGTH {
            return Some(format!(
                "File name exceeds maximum length of {} characters",
                MAX_FILE_NAME_LENGTH
            ));
        }
        if name.contains(['/', '\\']) {
            return Some("File name cannot contain path separators".to_string());
        }
        if self.audio.is_empty() {
            return Some("Audio cannot be empty".to_string());
        }
        None
    }

    /// Decodes the base64 WAV into samples. Anything unreadable is the
    /// caller's fault.
    pub fn decode_clip(&self) -> Result<AudioClip> {
        let bytes = STANDARD
            .decode(self.audio.trim())
            .map_err(|e| VoiceCacheError::InvalidRequest(format!("audio is not base64: {}", e)))?;
        codec::decode(&bytes).map_err(|e| {
            VoiceCacheError::InvalidRequest(format!("audio is not a readable WAV file: {}", e))
        })
    }
}

/// Request body for a generation (POST /sessions/:session/generate)
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(flatten)]
    pub job: GenerationJob,
    /// Run on an accelerator-pinned worker
    #[serde(default)]
    pub use_gpu: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wav_base64() -> String {
        let bytes = codec::encode(&AudioClip::mono(vec![0.25, -0.25], 8000)).unwrap();
        STANDARD.encode(bytes)
    }

    #[test]
    fn test_upload_request_decodes_clip() {
        let req = UploadRequest {
            file_name: "take.wav".to_string(),
            audio: wav_base64(),
        };
        assert!(req.validate().is_none());
        let clip = req.decode_clip().unwrap();
        assert_eq!(clip.samples, vec![0.25, -0.25]);
        assert_eq!(clip.sample_rate, 8000);
    }

    #[test]
    fn test_upload_request_rejects_bad_audio() {
        let req = UploadRequest {
            file_name: "take.wav".to_string(),
            audio: "not base64!".to_string(),
        };
        assert!(matches!(req.decode_clip(), Err(VoiceCacheError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_file_name() {
        let mut req = UploadRequest {
            file_name: " ".to_string(),
            audio: wav_base64(),
        };
        assert!(req.validate().is_some());
        req.file_name = "../x.wav".to_string();
        assert!(req.validate().is_some());
        req.file_name = "a".repeat(MAX_FILE_NAME_LENGTH + 1);
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_generate_request_flattens_job() {
        let req: GenerateRequest = serde_json::from_value(json!({
            "user_text": "Hello",
            "model": {"architecture": "so_vits_svc_4", "character": "X"},
            "use_gpu": true
        }))
        .unwrap();
        assert!(req.use_gpu);
        assert_eq!(req.job.user_text.as_deref(), Some("Hello"));
        assert_eq!(req.job.model.descriptor().id, "so_vits_svc_4");
    }
}
