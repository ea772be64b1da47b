//! Consistency scoring: similarity scores to verdicts.
//!
//! Two policies exist and they are not interchangeable:
//!
//! - [`Policy::Single`] scores the user text alone. The caption is only shown
//!   as corroboration.
//! - [`Policy::Dual`] averages the user-text similarity with the similarity of
//!   the model's own caption.
//!
//! Thresholds are empirical for the base CLIP checkpoint; other checkpoints
//! need recalibration through `[scoring]` in the config file.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which similarity signal drives the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Score = similarity(image, user text)
    #[default]
    Single,
    /// Score = mean(similarity(image, user text), similarity(image, caption))
    Dual,
}

impl Policy {
    /// Thresholds tuned for clip-vit-base-patch32.
    pub fn default_thresholds(self) -> Thresholds {
        match self {
            Policy::Single => Thresholds {
                upper: 0.28,
                lower: 0.20,
            },
            Policy::Dual => Thresholds {
                upper: 0.35,
                lower: 0.20,
            },
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Single => write!(f, "single"),
            Policy::Dual => write!(f, "dual"),
        }
    }
}

/// Verdict bucket boundaries. `score >= upper` is the top bucket,
/// `lower <= score < upper` the middle one, anything else the bottom one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub upper: f32,
    pub lower: f32,
}

/// Ordered verdict bucket, shared by both policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Low,
    Mid,
    High,
}

/// Classification of a score under one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Match,
    Uncertain,
    Mismatch,
    Consistent,
    PartiallyConsistent,
    Inconsistent,
}

impl Verdict {
    /// The verdict `policy` assigns to a tier.
    pub fn from_tier(policy: Policy, tier: Tier) -> Self {
        match (policy, tier) {
            (Policy::Single, Tier::High) => Verdict::Match,
            (Policy::Single, Tier::Mid) => Verdict::Uncertain,
            (Policy::Single, Tier::Low) => Verdict::Mismatch,
            (Policy::Dual, Tier::High) => Verdict::Consistent,
            (Policy::Dual, Tier::Mid) => Verdict::PartiallyConsistent,
            (Policy::Dual, Tier::Low) => Verdict::Inconsistent,
        }
    }

    /// The bucket this verdict occupies.
    pub fn tier(self) -> Tier {
        match self {
            Verdict::Match | Verdict::Consistent => Tier::High,
            Verdict::Uncertain | Verdict::PartiallyConsistent => Tier::Mid,
            Verdict::Mismatch | Verdict::Inconsistent => Tier::Low,
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Verdict::Match => "MATCH",
            Verdict::Uncertain => "UNCERTAIN",
            Verdict::Mismatch => "MISMATCH",
            Verdict::Consistent => "CONSISTENT",
            Verdict::PartiallyConsistent => "PARTIALLY CONSISTENT",
            Verdict::Inconsistent => "INCONSISTENT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Similarities from one batched aligner call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Similarities {
    /// similarity(image, user text)
    pub user_text: f32,
    /// similarity(image, generated caption)
    pub caption: f32,
}

/// Score, verdict and display values for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: f32,
    /// `score * 100`, rounded to one decimal
    pub percentage: f32,
    pub verdict: Verdict,
    /// `score` clamped to [0, 1], for gauges
    pub progress: f32,
}

/// Pure, stateless mapping from similarities to an [`Assessment`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsistencyScorer {
    policy: Policy,
    thresholds: Thresholds,
}

impl ConsistencyScorer {
    pub fn new(policy: Policy, thresholds: Thresholds) -> Self {
        Self { policy, thresholds }
    }

    /// Scorer with the policy's default thresholds.
    pub fn with_defaults(policy: Policy) -> Self {
        Self::new(policy, policy.default_thresholds())
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Collapse the similarity pair into the policy's single score.
    pub fn combine(&self, similarities: &Similarities) -> f32 {
        match self.policy {
            Policy::Single => similarities.user_text,
            Policy::Dual => (similarities.user_text + similarities.caption) / 2.0,
        }
    }

    /// Classify a score. NaN lands in the bottom bucket.
    pub fn classify(&self, score: f32) -> Verdict {
        let tier = if score >= self.thresholds.upper {
            Tier::High
        } else if score >= self.thresholds.lower {
            Tier::Mid
        } else {
            Tier::Low
        };
        Verdict::from_tier(self.policy, tier)
    }

    pub fn assess(&self, similarities: &Similarities) -> Assessment {
        let score = self.combine(similarities);
        Assessment {
            score,
            percentage: percentage(score),
            verdict: self.classify(score),
            progress: progress(score),
        }
    }
}

/// `score * 100` rounded to one decimal place.
pub fn percentage(score: f32) -> f32 {
    (score * 1000.0).round() / 10.0
}

/// Gauge fill for a score: clamped to [0, 1], NaN as 0.
pub fn progress(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sims(user_text: f32, caption: f32) -> Similarities {
        Similarities { user_text, caption }
    }

    #[test]
    fn test_single_policy_boundaries() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Single);
        assert_eq!(scorer.classify(0.28), Verdict::Match);
        assert_eq!(scorer.classify(0.2799), Verdict::Uncertain);
        assert_eq!(scorer.classify(0.20), Verdict::Uncertain);
        assert_eq!(scorer.classify(0.1999), Verdict::Mismatch);
        assert_eq!(scorer.classify(-0.5), Verdict::Mismatch);
    }

    #[test]
    fn test_dual_policy_boundaries() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Dual);
        assert_eq!(scorer.classify(0.35), Verdict::Consistent);
        assert_eq!(scorer.classify(0.3499), Verdict::PartiallyConsistent);
        assert_eq!(scorer.classify(0.20), Verdict::PartiallyConsistent);
        assert_eq!(scorer.classify(0.19), Verdict::Inconsistent);
    }

    #[test]
    fn test_verdict_is_monotonic_in_score() {
        for policy in [Policy::Single, Policy::Dual] {
            let scorer = ConsistencyScorer::with_defaults(policy);
            let mut previous = Tier::Low;
            for step in -100..=100 {
                let score = step as f32 / 100.0;
                let tier = scorer.classify(score).tier();
                assert!(tier >= previous, "{policy}: tier dropped at {score}");
                previous = tier;
            }
            assert_eq!(previous, Tier::High);
        }
    }

    #[test]
    fn test_nan_is_lowest_tier() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Single);
        assert_eq!(scorer.classify(f32::NAN), Verdict::Mismatch);
        assert_eq!(progress(f32::NAN), 0.0);
    }

    #[test]
    fn test_single_policy_ignores_caption() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Single);
        let a = scorer.assess(&sims(0.30, -0.9));
        let b = scorer.assess(&sims(0.30, 0.9));
        assert_eq!(a, b);
        assert_eq!(a.verdict, Verdict::Match);
    }

    #[test]
    fn test_dual_policy_averages() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Dual);
        let assessment = scorer.assess(&sims(0.30, 0.40));
        assert!((assessment.score - 0.35).abs() < 1e-6);
        assert_eq!(assessment.verdict, Verdict::Consistent);
    }

    #[test]
    fn test_assessment_display_values() {
        let scorer = ConsistencyScorer::with_defaults(Policy::Single);
        let assessment = scorer.assess(&sims(0.31234, 0.0));
        assert!((assessment.percentage - 31.2).abs() < 1e-4);
        assert!((assessment.progress - 0.31234).abs() < 1e-6);

        let negative = scorer.assess(&sims(-0.1, 0.0));
        assert_eq!(negative.progress, 0.0);
        assert!((negative.percentage + 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_custom_thresholds() {
        let scorer = ConsistencyScorer::new(
            Policy::Single,
            Thresholds {
                upper: 0.5,
                lower: 0.4,
            },
        );
        assert_eq!(scorer.classify(0.45), Verdict::Uncertain);
        assert_eq!(scorer.classify(0.30), Verdict::Mismatch);
    }

    #[test]
    fn test_verdict_labels_and_serde() {
        assert_eq!(
            Verdict::PartiallyConsistent.to_string(),
            "PARTIALLY CONSISTENT"
        );
        let json = serde_json::to_string(&Verdict::PartiallyConsistent).unwrap();
        assert_eq!(json, "\"PARTIALLY_CONSISTENT\"");
        let json = serde_json::to_string(&Policy::Dual).unwrap();
        assert_eq!(json, "\"dual\"");
    }
}
