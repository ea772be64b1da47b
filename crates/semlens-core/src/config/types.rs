//! Sub-configuration structs with defaults matching the base checkpoints.

use crate::caption::Decoding;
use crate::scoring::{Policy, Thresholds};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.semlens/models"),
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
        }
    }
}

/// Named caption decoding presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPreset {
    /// Beam search (width 5, 40 new tokens) conditioned on "a photo of"
    #[default]
    Interactive,
    /// Greedy decoding (30 new tokens), unconditional
    Script,
}

/// Captioner (BLIP) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Square input size of the vision encoder
    pub image_size: u32,

    /// Conditional prompt prepended to the caption and stripped from the output
    pub prompt: Option<String>,

    /// Beam width; 1 means greedy decoding
    pub num_beams: usize,

    /// Maximum number of generated tokens (prompt excluded)
    pub max_new_tokens: usize,

    /// Exponent applied to sequence length when ranking finished beams
    pub length_penalty: f32,
}

impl Default for CaptionConfig {
    fn default() -> Self {
        Self::for_preset(CaptionPreset::Interactive)
    }
}

impl CaptionConfig {
    /// Settings for a named preset.
    pub fn for_preset(preset: CaptionPreset) -> Self {
        let base = Self {
            model: "blip-image-captioning-base".to_string(),
            image_size: 384,
            prompt: None,
            num_beams: 1,
            max_new_tokens: 30,
            length_penalty: 1.0,
        };
        match preset {
            CaptionPreset::Interactive => Self {
                prompt: Some("a photo of".to_string()),
                num_beams: 5,
                max_new_tokens: 40,
                ..base
            },
            CaptionPreset::Script => base,
        }
    }

    /// Overwrite the decoding fields with a preset, keeping model settings.
    pub fn apply_preset(&mut self, preset: CaptionPreset) {
        let p = Self::for_preset(preset);
        self.prompt = p.prompt;
        self.num_beams = p.num_beams;
        self.max_new_tokens = p.max_new_tokens;
        self.length_penalty = p.length_penalty;
    }

    /// Whether the decoding fields are exactly those of `preset`.
    pub fn matches_preset(&self, preset: CaptionPreset) -> bool {
        let p = Self::for_preset(preset);
        self.prompt == p.prompt
            && self.num_beams == p.num_beams
            && self.max_new_tokens == p.max_new_tokens
            && self.length_penalty == p.length_penalty
    }

    /// The deterministic decoding strategy these settings describe.
    pub fn decoding(&self) -> Decoding {
        if self.num_beams <= 1 {
            Decoding::Greedy {
                max_new_tokens: self.max_new_tokens,
            }
        } else {
            Decoding::Beam {
                width: self.num_beams,
                max_new_tokens: self.max_new_tokens,
                length_penalty: self.length_penalty,
            }
        }
    }
}

/// Aligner (CLIP) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Model directory name under `general.model_dir`
    pub model: String,

    /// Square crop size of the vision encoder
    pub image_size: u32,

    /// Maximum tokens per text, special tokens included
    pub max_text_tokens: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            model: "clip-vit-base-patch32".to_string(),
            image_size: 224,
            max_text_tokens: 77,
        }
    }
}

/// Verdict policy and optional threshold recalibration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Which score feeds the verdict
    pub policy: Policy,

    /// Lower bound of the top verdict (defaults per policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper: Option<f32>,

    /// Lower bound of the middle verdict (defaults per policy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower: Option<f32>,
}

impl ScoringConfig {
    /// Thresholds for the configured policy, with overrides applied.
    pub fn thresholds(&self) -> Thresholds {
        let defaults = self.policy.default_thresholds();
        Thresholds {
            upper: self.upper.unwrap_or(defaults.upper),
            lower: self.lower.unwrap_or(defaults.lower),
        }
    }
}

/// Consensus-caption settings.
///
/// When enabled, `samples` captions are drawn with seeded top-k sampling and
/// only words present in at least `min_votes` of them survive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub enabled: bool,
    pub samples: usize,
    pub min_votes: usize,
    pub temperature: f32,
    pub top_k: usize,
    pub seed: u64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            samples: 3,
            min_votes: 2,
            temperature: 1.0,
            top_k: 50,
            seed: 42,
        }
    }
}

impl ConsensusConfig {
    /// One sampling strategy per caption; seeds are `seed, seed + 1, ...`.
    pub fn decodings(&self, max_new_tokens: usize) -> Vec<Decoding> {
        (0..self.samples as u64)
            .map(|i| Decoding::Sample {
                max_new_tokens,
                temperature: self.temperature,
                top_k: self.top_k,
                seed: self.seed.wrapping_add(i),
            })
            .collect()
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default report format ("pretty", "json" or "jsonl")
    pub format: String,

    /// Pretty-print JSON output
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: "pretty".to_string(),
            pretty: true,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
