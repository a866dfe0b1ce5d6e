//! Audio Transforms
//!
//! The pre- and postprocessing steps are pure functions of a clip and an
//! option set. The pipeline only depends on this trait.

use crate::cache::AudioClip;
use crate::error::Result;
use crate::pipeline::{PostprocessOptions, PreprocessOptions};

pub trait AudioTransforms: Send + Sync {
    fn preprocess(&self, clip: AudioClip, options: &PreprocessOptions) -> Result<AudioClip>;

    fn postprocess(&self, clip: AudioClip, options: &PostprocessOptions) -> Result<AudioClip>;
}

/// Returns every clip unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughTransforms;

impl AudioTransforms for PassthroughTransforms {
    fn preprocess(&self, clip: AudioClip, _options: &PreprocessOptions) -> Result<AudioClip> {
        Ok(clip)
    }

    fn postprocess(&self, clip: AudioClip, _options: &PostprocessOptions) -> Result<AudioClip> {
        Ok(clip)
    }
}
