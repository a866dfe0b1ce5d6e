//! Model Families
//!
//! One validated option structure per supported model family. Each family
//! carries a static descriptor (id and port of its server) and knows how to
//! turn its options into the "Options" object of a generate request.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{Result, VoiceCacheError};
use crate::pipeline::OptionSet;

// == Descriptors ==
/// Static description of one model server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model family id; also the prefix of its server's host name
    pub id: &'static str,
    pub port: u16,
}

pub const CONTROLLABLE_TALKNET: ModelDescriptor = ModelDescriptor {
    id: "controllable_talknet",
    port: 6574,
};
pub const SO_VITS_SVC_3: ModelDescriptor = ModelDescriptor {
    id: "so_vits_svc_3",
    port: 6575,
};
pub const SO_VITS_SVC_4: ModelDescriptor = ModelDescriptor {
    id: "so_vits_svc_4",
    port: 6576,
};
pub const SO_VITS_SVC_5: ModelDescriptor = ModelDescriptor {
    id: "so_vits_svc_5",
    port: 6577,
};
pub const RVC: ModelDescriptor = ModelDescriptor {
    id: "rvc",
    port: 6578,
};
pub const STYLETTS_2: ModelDescriptor = ModelDescriptor {
    id: "styletts_2",
    port: 6579,
};

/// Builds request options from a validated option set.
pub trait ModelFamily {
    fn descriptor(&self) -> &'static ModelDescriptor;

    fn validate(&self) -> Result<()>;

    /// Family-specific entries of the "Options" object.
    fn wire_options(&self) -> Map<String, Value>;
}

fn invalid(message: impl Into<String>) -> VoiceCacheError {
    VoiceCacheError::InvalidRequest(message.into())
}

fn require_character(character: &str) -> Result<()> {
    if character.trim().is_empty() {
        return Err(invalid("a character must be selected"));
    }
    Ok(())
}

fn require_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{} must be between 0 and 1", name)));
    }
    Ok(())
}

// == ControllableTalkNet ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TalknetOptions {
    pub character: String,
    #[serde(default)]
    pub disable_text: bool,
}

impl ModelFamily for TalknetOptions {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &CONTROLLABLE_TALKNET
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.character)
    }

    fn wire_options(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Character".into(), json!(self.character));
        map.insert("Disable Text".into(), json!(self.disable_text));
        map
    }
}

// == so-vits-svc 3 and 5 ==
/// Options shared by the so-vits-svc 3 and 5 servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SvcOptions {
    pub character: String,
    #[serde(default)]
    pub pitch_shift: i32,
}

impl SvcOptions {
    fn options(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Character".into(), json!(self.character));
        map.insert("Pitch Shift".into(), json!(self.pitch_shift));
        map
    }
}

/// so-vits-svc 3 server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoVitsSvc3Options(pub SvcOptions);

/// so-vits-svc 5 server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SoVitsSvc5Options(pub SvcOptions);

impl ModelFamily for SoVitsSvc3Options {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &SO_VITS_SVC_3
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.0.character)
    }

    fn wire_options(&self) -> Map<String, Value> {
        self.0.options()
    }
}

impl ModelFamily for SoVitsSvc5Options {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &SO_VITS_SVC_5
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.0.character)
    }

    fn wire_options(&self) -> Map<String, Value> {
        self.0.options()
    }
}

// == so-vits-svc 4 ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoVitsSvc4Options {
    pub character: String,
    #[serde(default)]
    pub pitch_shift: i32,
    #[serde(default)]
    pub predict_pitch: bool,
    /// Seconds per slice; 0 disables slicing
    #[serde(default)]
    pub slice_length: f64,
    #[serde(default)]
    pub cross_fade_length: f64,
    #[serde(default)]
    pub character_likeness: f64,
    #[serde(default)]
    pub reduce_hoarseness: bool,
    #[serde(default)]
    pub apply_nsf_hifigan: bool,
}

impl ModelFamily for SoVitsSvc4Options {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &SO_VITS_SVC_4
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.character)?;
        if self.slice_length < 0.0 || self.cross_fade_length < 0.0 {
            return Err(invalid("slice and cross-fade lengths cannot be negative"));
        }
        require_ratio("character likeness", self.character_likeness)
    }

    fn wire_options(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Character".into(), json!(self.character));
        map.insert("Pitch Shift".into(), json!(self.pitch_shift));
        map.insert("Predict Pitch".into(), json!(self.predict_pitch));
        map.insert("Slice Length".into(), json!(self.slice_length));
        map.insert("Cross-Fade Length".into(), json!(self.cross_fade_length));
        map.insert("Character Likeness".into(), json!(self.character_likeness));
        map.insert("Reduce Hoarseness".into(), json!(self.reduce_hoarseness));
        map.insert("Apply nsf_hifigan".into(), json!(self.apply_nsf_hifigan));
        map
    }
}

// == RVC ==
const F0_METHODS: [&str; 5] = ["pm", "harvest", "crepe", "mangio-crepe", "rmvpe"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RvcOptions {
    pub character: String,
    #[serde(default)]
    pub pitch_shift: i32,
    pub f0_extraction_method: String,
    /// Median filter radius, only used by `harvest`
    #[serde(default)]
    pub filter_radius: Option<u32>,
    pub index_ratio: f64,
    pub voice_envelope_mix_ratio: f64,
    pub voiceless_consonants_protection_ratio: f64,
}

impl ModelFamily for RvcOptions {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &RVC
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.character)?;
        if !F0_METHODS.contains(&self.f0_extraction_method.as_str()) {
            return Err(invalid(format!(
                "unknown f0 extraction method '{}'",
                self.f0_extraction_method
            )));
        }
        if self.f0_extraction_method == "harvest" && self.filter_radius.map_or(true, |r| r > 7) {
            return Err(invalid("harvest needs a filter radius between 0 and 7"));
        }
        require_ratio("index ratio", self.index_ratio)?;
        require_ratio("voice envelope mix ratio", self.voice_envelope_mix_ratio)?;
        // the server accepts at most half protection
        if !(0.0..=0.5).contains(&self.voiceless_consonants_protection_ratio) {
            return Err(invalid(
                "voiceless consonants protection ratio must be between 0 and 0.5",
            ));
        }
        Ok(())
    }

    fn wire_options(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Character".into(), json!(self.character));
        map.insert("Pitch Shift".into(), json!(self.pitch_shift));
        map.insert("f0 Extraction Method".into(), json!(self.f0_extraction_method));
        map.insert("Index Ratio".into(), json!(self.index_ratio));
        map.insert("Voice Envelope Mix Ratio".into(), json!(self.voice_envelope_mix_ratio));
        map.insert(
            "Voiceless Consonants Protection Ratio".into(),
            json!(self.voiceless_consonants_protection_ratio),
        );
        if self.f0_extraction_method == "harvest" {
            if let Some(radius) = self.filter_radius {
                map.insert("Filter Radius".into(), json!(radius));
            }
        }
        map
    }
}

// == StyleTTS 2 ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleTts2Options {
    pub character: String,
    pub noise: f64,
    pub diffusion_steps: u32,
    pub embedding_scale: f64,
    #[serde(default)]
    pub use_long_form: bool,
    pub style_blend: f64,
}

impl ModelFamily for StyleTts2Options {
    fn descriptor(&self) -> &'static ModelDescriptor {
        &STYLETTS_2
    }

    fn validate(&self) -> Result<()> {
        require_character(&self.character)?;
        if !(1..=100).contains(&self.diffusion_steps) {
            return Err(invalid("diffusion steps must be between 1 and 100"));
        }
        if self.noise < 0.0 || self.embedding_scale < 0.0 {
            return Err(invalid("noise and embedding scale cannot be negative"));
        }
        require_ratio("style blend", self.style_blend)
    }

    fn wire_options(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("Character".into(), json!(self.character));
        map.insert("Noise".into(), json!(self.noise));
        map.insert("Diffusion Steps".into(), json!(self.diffusion_steps));
        map.insert("Embedding Scale".into(), json!(self.embedding_scale));
        map.insert("Use Long Form".into(), json!(self.use_long_form));
        map.insert("Style Blend".into(), json!(self.style_blend));
        map
    }
}

// == Selection ==
/// The selected model family together with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "architecture")]
pub enum ModelOptions {
    #[serde(rename = "controllable_talknet")]
    ControllableTalknet(TalknetOptions),
    #[serde(rename = "so_vits_svc_3")]
    SoVitsSvc3(SoVitsSvc3Options),
    #[serde(rename = "so_vits_svc_4")]
    SoVitsSvc4(SoVitsSvc4Options),
    #[serde(rename = "so_vits_svc_5")]
    SoVitsSvc5(SoVitsSvc5Options),
    #[serde(rename = "rvc")]
    Rvc(RvcOptions),
    #[serde(rename = "styletts_2")]
    StyleTts2(StyleTts2Options),
}

impl ModelOptions {
    fn family(&self) -> &dyn ModelFamily {
        match self {
            ModelOptions::ControllableTalknet(o) => o,
            ModelOptions::SoVitsSvc3(o) => o,
            ModelOptions::SoVitsSvc4(o) => o,
            ModelOptions::SoVitsSvc5(o) => o,
            ModelOptions::Rvc(o) => o,
            ModelOptions::StyleTts2(o) => o,
        }
    }

    pub fn descriptor(&self) -> &'static ModelDescriptor {
        self.family().descriptor()
    }

    pub fn validate(&self) -> Result<()> {
        self.family().validate()
    }

    /// The "Options" object sent to the model server and recorded in metadata.
    pub fn wire_options(&self) -> Map<String, Value> {
        let mut map = self.family().wire_options();
        map.insert("Architecture".into(), json!(self.descriptor().id));
        map
    }
}

impl OptionSet for ModelOptions {
    fn hash_args(&self) -> Vec<Value> {
        // Map keys are sorted, so the order is stable
        self.wire_options().into_iter().map(|(_, v)| v).collect()
    }

    fn to_metadata(&self) -> Map<String, Value> {
        self.wire_options()
    }
}
