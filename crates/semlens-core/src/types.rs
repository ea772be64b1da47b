//! Request and report types for consistency checks.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::scoring::{Assessment, Policy, Similarities};

/// One image-text pair to check.
///
/// Also the line format of a batch manifest:
/// `{"image": "photos/cat.jpg", "text": "a cat on a sofa"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    /// Path to the image file
    pub image: PathBuf,

    /// The description to verify against the image
    pub text: String,
}

impl CheckRequest {
    pub fn new(image: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            text: text.into(),
        }
    }

    /// Reject requests with no image or a blank description.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.image.as_os_str().is_empty() {
            return Err(PipelineError::MissingInput { field: "image" });
        }
        if self.text.trim().is_empty() {
            return Err(PipelineError::MissingInput { field: "text" });
        }
        Ok(())
    }

    /// Resolve a relative image path against `base` (the manifest directory).
    pub fn resolve_against(mut self, base: &Path) -> Self {
        if self.image.is_relative() {
            self.image = base.join(&self.image);
        }
        self
    }
}

/// The result of one consistency check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    // === Image Identification ===
    /// Path to the source file, as given
    pub file_path: PathBuf,

    /// Just the filename portion
    pub file_name: String,

    /// BLAKE3 hash of the file bytes
    pub content_hash: String,

    /// Detected format ("jpeg", "png", ...)
    pub format: String,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    // === Check ===
    /// The user's description
    pub text: String,

    /// Caption the model produced independently
    pub caption: String,

    /// Words most sampled captions agree on (consensus extension)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus_caption: Option<String>,

    /// Policy that produced the verdict
    pub policy: Policy,

    /// Raw similarities from the aligner
    pub similarities: Similarities,

    /// Score, verdict and display values
    #[serde(flatten)]
    pub assessment: Assessment,

    /// Wall-clock time for the whole check
    pub elapsed_ms: u64,
}

/// Counters for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BatchStats {
    /// Checks that produced a report
    pub succeeded: usize,

    /// Checks that failed (bad input, decode or model errors)
    pub failed: usize,

    /// Reports per verdict tier: [low, mid, high]
    pub tiers: [usize; 3],

    /// Total run time in seconds
    pub total_seconds: f64,
}

impl BatchStats {
    pub fn record(&mut self, report: &ConsistencyReport) {
        self.succeeded += 1;
        self.tiers[report.assessment.verdict.tier() as usize] += 1;
    }

    pub fn checks_per_second(&self) -> f64 {
        if self.total_seconds > 0.0 {
            (self.succeeded + self.failed) as f64 / self.total_seconds
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ConsistencyScorer, Verdict};

    fn sample_report(user_text: f32) -> ConsistencyReport {
        let similarities = Similarities {
            user_text,
            caption: 0.3,
        };
        ConsistencyReport {
            file_path: PathBuf::from("/photos/square.png"),
            file_name: "square.png".to_string(),
            content_hash: "abc123".to_string(),
            format: "png".to_string(),
            width: 64,
            height: 64,
            text: "a red square".to_string(),
            caption: "a red square on a white background".to_string(),
            consensus_caption: None,
            policy: Policy::Single,
            similarities,
            assessment: ConsistencyScorer::with_defaults(Policy::Single).assess(&similarities),
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(CheckRequest::new("a.png", "a cat").validate().is_ok());
        assert!(matches!(
            CheckRequest::new("a.png", "   ").validate(),
            Err(PipelineError::MissingInput { field: "text" })
        ));
        assert!(matches!(
            CheckRequest::new("", "a cat").validate(),
            Err(PipelineError::MissingInput { field: "image" })
        ));
    }

    #[test]
    fn test_manifest_line_parses() {
        let line = r#"{"image": "photos/cat.jpg", "text": "a cat on a sofa"}"#;
        let request: CheckRequest = serde_json::from_str(line).unwrap();
        assert_eq!(request.image, PathBuf::from("photos/cat.jpg"));

        let resolved = request.resolve_against(Path::new("/data"));
        assert_eq!(resolved.image, PathBuf::from("/data/photos/cat.jpg"));
    }

    #[test]
    fn test_absolute_path_not_resolved() {
        let request = CheckRequest::new("/abs/cat.jpg", "a cat").resolve_against(Path::new("/data"));
        assert_eq!(request.image, PathBuf::from("/abs/cat.jpg"));
    }

    #[test]
    fn test_report_serialization_flattens_assessment() {
        let report = sample_report(0.31);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["verdict"], "MATCH");
        assert!(json.get("assessment").is_none());
        assert!(json.get("consensus_caption").is_none());
        assert_eq!(json["policy"], "single");

        let back: ConsistencyReport = serde_json::from_value(json).unwrap();
        assert_eq!(back.assessment.verdict, Verdict::Match);
    }

    #[test]
    fn test_batch_stats_tiers() {
        let mut stats = BatchStats::default();
        stats.record(&sample_report(0.31));
        stats.record(&sample_report(0.10));
        stats.failed += 1;
        stats.total_seconds = 2.0;
        assert_eq!(stats.succeeded, 2);
        assert_eq!(stats.tiers, [1, 0, 1]);
        assert!((stats.checks_per_second() - 1.5).abs() < 1e-9);
    }
}
