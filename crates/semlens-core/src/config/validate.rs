//! Configuration validation with range checks.

use crate::error::ConfigError;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_file_size_mb == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_file_size_mb must be > 0".into(),
            ));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "limits.max_image_dimension must be > 0".into(),
            ));
        }
        if self.caption.num_beams == 0 {
            return Err(ConfigError::ValidationError(
                "caption.num_beams must be > 0".into(),
            ));
        }
        if self.caption.max_new_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "caption.max_new_tokens must be > 0".into(),
            ));
        }
        if self.caption.image_size == 0 || self.alignment.image_size == 0 {
            return Err(ConfigError::ValidationError(
                "caption.image_size and alignment.image_size must be > 0".into(),
            ));
        }
        if self.alignment.max_text_tokens < 2 {
            return Err(ConfigError::ValidationError(
                "alignment.max_text_tokens must be >= 2".into(),
            ));
        }

        let thresholds = self.scoring.thresholds();
        for (name, value) in [("upper", thresholds.upper), ("lower", thresholds.lower)] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "scoring.{name} must be between -1.0 and 1.0"
                )));
            }
        }
        if thresholds.lower > thresholds.upper {
            return Err(ConfigError::ValidationError(
                "scoring.lower must not exceed scoring.upper".into(),
            ));
        }

        if self.consensus.enabled {
            if self.consensus.samples < 2 {
                return Err(ConfigError::ValidationError(
                    "consensus.samples must be >= 2".into(),
                ));
            }
            if self.consensus.min_votes == 0 || self.consensus.min_votes > self.consensus.samples
            {
                return Err(ConfigError::ValidationError(
                    "consensus.min_votes must be between 1 and consensus.samples".into(),
                ));
            }
        }
        if self.consensus.temperature <= 0.0 {
            return Err(ConfigError::ValidationError(
                "consensus.temperature must be > 0".into(),
            ));
        }
        if self.consensus.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "consensus.top_k must be > 0".into(),
            ));
        }
        Ok(())
    }
}
