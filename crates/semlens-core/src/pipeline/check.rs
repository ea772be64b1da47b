//! The two-step consistency pipeline: caption, then align and score.

use image::RgbImage;

use crate::align::Aligner;
use crate::caption::{consensus_caption, Captioner, Decoding};
use crate::error::{PipelineError, PipelineResult};
use crate::scoring::{Assessment, ConsistencyScorer, Similarities};

/// Consensus-caption parameters resolved for one run.
#[derive(Debug, Clone)]
pub struct ConsensusPlan {
    pub decodings: Vec<Decoding>,
    pub min_votes: usize,
}

/// Everything the pipeline derives from one image-text pair.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub caption: String,
    pub consensus_caption: Option<String>,
    pub similarities: Similarities,
    pub assessment: Assessment,
}

/// Runs caption generation, batched alignment and scoring over borrowed models.
///
/// Synchronous; callers run it on the blocking pool.
pub struct ConsistencyChecker<'a> {
    captioner: &'a dyn Captioner,
    aligner: &'a dyn Aligner,
    scorer: ConsistencyScorer,
    decoding: Decoding,
    consensus: Option<ConsensusPlan>,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(
        captioner: &'a dyn Captioner,
        aligner: &'a dyn Aligner,
        scorer: ConsistencyScorer,
        decoding: Decoding,
    ) -> Self {
        Self {
            captioner,
            aligner,
            scorer,
            decoding,
            consensus: None,
        }
    }

    pub fn with_consensus(mut self, plan: Option<ConsensusPlan>) -> Self {
        self.consensus = plan;
        self
    }

    pub fn check(&self, image: &RgbImage, text: &str) -> PipelineResult<CheckOutcome> {
        if text.trim().is_empty() {
            return Err(PipelineError::MissingInput { field: "text" });
        }

        let start = std::time::Instant::now();
        let caption = self.captioner.caption(image, &self.decoding)?;
        tracing::debug!("  Caption: {:?} ({:?})", caption, start.elapsed());

        let consensus_caption = match &self.consensus {
            Some(plan) => {
                let consensus_start = std::time::Instant::now();
                let samples = self.captioner.captions(image, &plan.decodings)?;
                tracing::debug!("  Sampled captions: {:?}", samples);
                let consensus = consensus_caption(&samples, plan.min_votes);
                tracing::debug!(
                    "  Consensus: {:?} ({:?})",
                    consensus,
                    consensus_start.elapsed()
                );
                Some(consensus)
            }
            None => None,
        };

        let align_start = std::time::Instant::now();
        let scores = self.aligner.similarities(image, &[text, caption.as_str()])?;
        let [user_text, caption_similarity] = scores[..] else {
            return Err(PipelineError::Alignment {
                message: format!("Expected 2 similarity scores, got {}", scores.len()),
            });
        };
        let similarities = Similarities {
            user_text,
            caption: caption_similarity,
        };
        tracing::debug!("  Align: {:?} ({:?})", similarities, align_start.elapsed());

        Ok(CheckOutcome {
            caption,
            consensus_caption,
            similarities,
            assessment: self.scorer.assess(&similarities),
        })
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use crate::math::l2_normalize;

    /// Captions every image with a fixed string; sampled decodings get a suffix.
    pub struct FixedCaptioner(pub String);

    impl Captioner for FixedCaptioner {
        fn caption(&self, _image: &RgbImage, decoding: &Decoding) -> PipelineResult<String> {
            match decoding {
                Decoding::Sample { seed, .. } => Ok(format!("{} seed{}", self.0, seed % 2)),
                _ => Ok(self.0.clone()),
            }
        }
    }

    /// Embeds images by mean color and texts by color words.
    pub struct ColorAligner;

    fn color_vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let has = |w: &str| if text.contains(w) { 1.0 } else { 0.05 };
        l2_normalize(&[has("red"), has("green"), has("blue")])
    }

    impl Aligner for ColorAligner {
        fn embed_image(&self, image: &RgbImage) -> PipelineResult<Vec<f32>> {
            let mut sum = [0.0f32; 3];
            for pixel in image.pixels() {
                for c in 0..3 {
                    sum[c] += pixel.0[c] as f32;
                }
            }
            Ok(l2_normalize(&sum))
        }

        fn embed_texts(&self, texts: &[&str]) -> PipelineResult<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| color_vector(t)).collect())
        }
    }
}
