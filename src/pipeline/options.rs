//! Stage Options
//!
//! Typed option tuples for the deterministic stages and the job that ties a
//! whole generation request together.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::boundary::ModelOptions;
use crate::error::{Result, VoiceCacheError};

/// Ordered option values of one stage.
pub trait OptionSet {
    /// Values folded into the stage hash, in a fixed order.
    fn hash_args(&self) -> Vec<Value>;

    /// Named values recorded in the entry's metadata.
    fn to_metadata(&self) -> Map<String, Value>;
}

// == Preprocessing ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessOptions {
    /// Pitch shift applied to the user audio, in semitones
    #[serde(default)]
    pub semitone_pitch: i32,
    #[serde(default)]
    pub debug_pitch: bool,
    #[serde(default)]
    pub reduce_noise: bool,
    #[serde(default)]
    pub crop_silence: bool,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            semitone_pitch: 0,
            debug_pitch: false,
            reduce_noise: false,
            crop_silence: false,
        }
    }
}

impl OptionSet for PreprocessOptions {
    fn hash_args(&self) -> Vec<Value> {
        vec![
            json!(self.semitone_pitch),
            json!(self.debug_pitch),
            json!(self.reduce_noise),
            json!(self.crop_silence),
        ]
    }

    fn to_metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Semitone Pitch".into(), json!(self.semitone_pitch));
        map.insert("Debug Pitch".into(), json!(self.debug_pitch));
        map.insert("Reduce Noise".into(), json!(self.reduce_noise));
        map.insert("Crop Silence".into(), json!(self.crop_silence));
        map
    }
}

// == Postprocessing ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostprocessOptions {
    #[serde(default)]
    pub reduce_metallic_noise: bool,
    #[serde(default)]
    pub auto_tune_output: bool,
    /// Playback speed factor, 1.0 leaves the output unchanged
    #[serde(default = "default_speed")]
    pub output_speed: f64,
}

fn default_speed() -> f64 {
    1.0
}

impl Default for PostprocessOptions {
    fn default() -> Self {
        Self {
            reduce_metallic_noise: false,
            auto_tune_output: false,
            output_speed: default_speed(),
        }
    }
}

impl PostprocessOptions {
    pub fn validate(&self) -> Result<()> {
        if !self.output_speed.is_finite() || self.output_speed <= 0.0 {
            return Err(VoiceCacheError::InvalidRequest(
                "output speed must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

impl OptionSet for PostprocessOptions {
    fn hash_args(&self) -> Vec<Value> {
        vec![
            json!(self.reduce_metallic_noise),
            json!(self.auto_tune_output),
            json!(self.output_speed),
        ]
    }

    fn to_metadata(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Reduce Metallic Noise".into(), json!(self.reduce_metallic_noise));
        map.insert("Auto Tune Output".into(), json!(self.auto_tune_output));
        map.insert("Adjust Output Speed".into(), json!(self.output_speed));
        map
    }
}

// == Generation Job ==
/// Everything one generation request supplies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationJob {
    /// Text for text-to-speech models
    #[serde(default)]
    pub user_text: Option<String>,
    /// User-facing name of a previously uploaded file
    #[serde(default)]
    pub user_file: Option<String>,
    #[serde(default)]
    pub preprocess: PreprocessOptions,
    /// Selected model family and its options
    pub model: ModelOptions,
    #[serde(default)]
    pub postprocess: PostprocessOptions,
}

impl GenerationJob {
    /// Validates every option set before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.user_text.as_deref().map_or(true, str::is_empty) && self.user_file.is_none() {
            return Err(VoiceCacheError::InvalidRequest(
                "either text or an input file is required".to_string(),
            ));
        }
        self.model.validate()?;
        self.postprocess.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_hash_args_order() {
        let options = PreprocessOptions {
            semitone_pitch: -2,
            debug_pitch: false,
            reduce_noise: true,
            crop_silence: false,
        };
        assert_eq!(
            options.hash_args(),
            vec![json!(-2), json!(false), json!(true), json!(false)]
        );
        assert_eq!(options.to_metadata()["Reduce Noise"], json!(true));
    }

    #[test]
    fn test_postprocess_defaults_from_empty_json() {
        let options: PostprocessOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PostprocessOptions::default());
        assert_eq!(options.hash_args()[2], json!(1.0));
    }

    #[test]
    fn test_postprocess_validate_speed() {
        let mut options = PostprocessOptions::default();
        assert!(options.validate().is_ok());
        options.output_speed = 0.0;
        assert!(options.validate().is_err());
        options.output_speed = f64::NAN;
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_job_requires_text_or_file() {
        let job: GenerationJob = serde_json::from_value(json!({
            "model": {"architecture": "so_vits_svc_3", "character": "X", "pitch_shift": 0}
        }))
        .unwrap();
        assert!(matches!(job.validate(), Err(VoiceCacheError::InvalidRequest(_))));

        let with_text = GenerationJob {
            user_text: Some("Hello".into()),
            ..job
        };
        assert!(with_text.validate().is_ok());
    }
}
