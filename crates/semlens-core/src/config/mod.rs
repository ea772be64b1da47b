//! Configuration management for Semantic Lens.
//!
//! Configuration is loaded from the platform config directory
//! (`~/.config/semlens/config.toml` on Linux) with defaults tuned for the
//! base BLIP and CLIP checkpoints.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Semantic Lens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Input limits
    pub limits: LimitsConfig,

    /// Captioner settings
    pub caption: CaptionConfig,

    /// Aligner settings
    pub alignment: AlignmentConfig,

    /// Verdict policy and thresholds
    pub scoring: ScoringConfig,

    /// Consensus-caption extension
    pub consensus: ConsensusConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.semlens.semlens/config.toml
    /// - Linux: ~/.config/semlens/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\semlens\config\config.toml
    ///
    /// Falls back to ~/.semlens/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "semlens", "semlens")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".semlens").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Directory holding the captioner's ONNX files and tokenizer.
    pub fn caption_model_dir(&self) -> PathBuf {
        self.model_dir().join(&self.caption.model)
    }

    /// Directory holding the aligner's ONNX files and tokenizer.
    pub fn alignment_model_dir(&self) -> PathBuf {
        self.model_dir().join(&self.alignment.model)
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::Decoding;
    use crate::scoring::Policy;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.caption.num_beams, 5);
        assert_eq!(config.caption.max_new_tokens, 40);
        assert_eq!(config.caption.prompt.as_deref(), Some("a photo of"));
        assert_eq!(config.alignment.max_text_tokens, 77);
        assert_eq!(config.scoring.policy, Policy::Single);
        assert!(!config.consensus.enabled);
    }

    #[test]
    fn test_config_to_toml() {
        let config = Config::default();
        let toml = config.to_toml().unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[caption]"));
        assert!(toml.contains("[scoring]"));
        assert!(toml.contains("policy = \"single\""));
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let mut config = Config::default();
        config.scoring.policy = Policy::Dual;
        config.scoring.upper = Some(0.4);
        let toml = config.to_toml().unwrap();
        let parsed = Config::from_toml(&toml).unwrap();
        assert_eq!(parsed.scoring.policy, Policy::Dual);
        assert_eq!(parsed.scoring.upper, Some(0.4));
        assert_eq!(parsed.caption.num_beams, 5);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config = Config::from_toml("[scoring]\npolicy = \"dual\"\n").unwrap();
        assert_eq!(config.scoring.policy, Policy::Dual);
        assert_eq!(config.limits.max_file_size_mb, 100);
        assert_eq!(config.alignment.model, "clip-vit-base-patch32");
    }

    #[test]
    fn test_script_preset() {
        let caption = CaptionConfig::for_preset(CaptionPreset::Script);
        assert_eq!(caption.num_beams, 1);
        assert_eq!(caption.max_new_tokens, 30);
        assert!(caption.prompt.is_none());
        assert_eq!(caption.decoding(), Decoding::Greedy { max_new_tokens: 30 });
    }

    #[test]
    fn test_interactive_preset_decoding_is_beam() {
        let caption = CaptionConfig::default();
        assert_eq!(
            caption.decoding(),
            Decoding::Beam {
                width: 5,
                max_new_tokens: 40,
                length_penalty: 1.0
            }
        );
    }

    #[test]
    fn test_apply_preset_keeps_model() {
        let mut caption = CaptionConfig {
            model: "custom-blip".to_string(),
            ..CaptionConfig::default()
        };
        caption.apply_preset(CaptionPreset::Script);
        assert_eq!(caption.model, "custom-blip");
        assert_eq!(caption.num_beams, 1);
    }

    #[test]
    fn test_scoring_thresholds_follow_policy() {
        let mut scoring = ScoringConfig::default();
        assert_eq!(scoring.thresholds().upper, 0.28);
        scoring.policy = Policy::Dual;
        assert_eq!(scoring.thresholds().upper, 0.35);
        scoring.lower = Some(0.1);
        assert_eq!(scoring.thresholds().lower, 0.1);
    }

    #[test]
    fn test_model_dirs_join_model_names() {
        let mut config = Config::default();
        config.general.model_dir = PathBuf::from("/models");
        assert_eq!(
            config.caption_model_dir(),
            PathBuf::from("/models/blip-image-captioning-base")
        );
        assert_eq!(
            config.alignment_model_dir(),
            PathBuf::from("/models/clip-vit-base-patch32")
        );
    }
}
