//! Semantic Lens Core - image-text consistency checks.
//!
//! Semantic Lens answers one question: does this description match this
//! picture? It captions the image independently with BLIP, embeds the image
//! and the texts with CLIP, and maps the similarity to a three-way verdict.
//!
//! # Architecture
//!
//! ```text
//! Image → Validate → Decode (RGB) → Caption (BLIP) → Align (CLIP) → Score → Report
//! ```
//!
//! Both models run locally through ONNX Runtime and are loaded once per
//! process, on first use.
//!
//! # Usage
//!
//! ```rust,ignore
//! use semlens_core::{CheckRequest, Config, Lens};
//!
//! #[tokio::main]
//! async fn main() -> semlens_core::Result<()> {
//!     let lens = Lens::new(Config::load()?);
//!     let report = lens.check(&CheckRequest::new("./cat.jpg", "a cat on a sofa")).await?;
//!     println!("{} ({}%)", report.assessment.verdict, report.assessment.percentage);
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod align;
pub mod caption;
pub mod config;
pub mod error;
pub mod math;
mod onnx;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod scoring;
pub mod types;

// Re-exports for convenient access
pub use align::{Aligner, ClipAligner};
pub use caption::{BlipCaptioner, Captioner, Decoding};
pub use config::{CaptionPreset, Config};
pub use error::{ConfigError, LensError, PipelineError, PipelineResult, Result};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{ConsensusPlan, ConsistencyChecker, ImageDecoder, Validator};
pub use scoring::{Assessment, ConsistencyScorer, Policy, Similarities, Thresholds, Verdict};
pub use types::{BatchStats, CheckRequest, ConsistencyReport};

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, OnceCell};

use pipeline::decode::format_to_string;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The loaded caption and alignment models.
pub struct Models {
    pub captioner: Box<dyn Captioner>,
    pub aligner: Box<dyn Aligner>,
}

impl Models {
    /// Load BLIP and CLIP from the configured model directories. Blocking.
    pub fn load(config: &Config) -> PipelineResult<Self> {
        let start = Instant::now();
        let captioner = BlipCaptioner::load(&config.caption, &config.caption_model_dir())?;
        let aligner = ClipAligner::load(&config.alignment, &config.alignment_model_dir())?;
        tracing::info!("Models loaded in {:.1}s", start.elapsed().as_secs_f64());
        Ok(Self {
            captioner: Box::new(captioner),
            aligner: Box::new(aligner),
        })
    }
}

/// Semantic Lens engine - the main entry point for consistency checks.
///
/// Requests are served one at a time; a second caller waits until the
/// first check finishes.
pub struct Lens {
    config: Config,
    validator: Validator,
    decoder: ImageDecoder,
    models: OnceCell<Arc<Models>>,
    gate: Mutex<()>,
}

impl Lens {
    /// Create an engine. Models are not loaded until the first check.
    pub fn new(config: Config) -> Self {
        tracing::debug!("Initializing Semantic Lens v{}", VERSION);
        Self {
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
            config,
            models: OnceCell::new(),
            gate: Mutex::new(()),
        }
    }

    /// Create an engine around already-constructed models.
    pub fn with_models(config: Config, models: Models) -> Self {
        let mut lens = Self::new(config);
        lens.models = OnceCell::new_with(Some(Arc::new(models)));
        lens
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether every model file for the configured checkpoints is on disk.
    pub fn models_installed(&self) -> bool {
        BlipCaptioner::model_exists(&self.config.caption_model_dir())
            && ClipAligner::model_exists(&self.config.alignment_model_dir())
    }

    /// The model handles, loading them on first call.
    pub async fn models(&self) -> Result<Arc<Models>> {
        let models = self
            .models
            .get_or_try_init(|| async {
                let config = self.config.clone();
                tracing::info!("Loading models from {:?}", config.model_dir());
                let models = tokio::task::spawn_blocking(move || Models::load(&config))
                    .await
                    .map_err(|e| PipelineError::Worker {
                        stage: "model load",
                        message: e.to_string(),
                    })??;
                Ok::<_, LensError>(Arc::new(models))
            })
            .await?;
        Ok(Arc::clone(models))
    }

    fn consensus_plan(&self) -> Option<ConsensusPlan> {
        let consensus = &self.config.consensus;
        consensus.enabled.then(|| ConsensusPlan {
            decodings: consensus.decodings(self.config.caption.max_new_tokens),
            min_votes: consensus.min_votes,
        })
    }

    /// Check one image-text pair.
    pub async fn check(&self, request: &CheckRequest) -> Result<ConsistencyReport> {
        let _gate = self.gate.lock().await;
        let start = Instant::now();

        request.validate()?;
        let path = request.image.as_path();
        tracing::debug!("Checking {:?} against {:?}", path, request.text);

        self.validator.validate(path)?;
        let decoded = self.decoder.decode(path).await?;
        tracing::trace!("  Decode: {:?}", start.elapsed());

        let models = self.models().await?;
        let scorer = ConsistencyScorer::new(
            self.config.scoring.policy,
            self.config.scoring.thresholds(),
        );
        let decoding = self.config.caption.decoding();
        let consensus = self.consensus_plan();
        let text = request.text.clone();
        let image = decoded.image;

        let outcome = tokio::task::spawn_blocking(move || {
            ConsistencyChecker::new(
                models.captioner.as_ref(),
                models.aligner.as_ref(),
                scorer,
                decoding,
            )
            .with_consensus(consensus)
            .check(&image, &text)
        })
        .await
        .map_err(|e| PipelineError::Worker {
            stage: "check",
            message: e.to_string(),
        })??;

        let elapsed = start.elapsed();
        tracing::debug!(
            "Checked {:?} in {:?}: {} ({:.4})",
            path,
            elapsed,
            outcome.assessment.verdict,
            outcome.assessment.score
        );

        Ok(ConsistencyReport {
            file_path: path.to_path_buf(),
            file_name: file_name(path),
            content_hash: decoded.content_hash,
            format: format_to_string(decoded.format),
            width: decoded.width,
            height: decoded.height,
            text: request.text.clone(),
            caption: outcome.caption,
            consensus_caption: outcome.consensus_caption,
            policy: scorer.policy(),
            similarities: outcome.similarities,
            assessment: outcome.assessment,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}
