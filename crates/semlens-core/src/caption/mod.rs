//! Image captioning.
//!
//! [`Captioner`] is the seam between the pipeline and the caption model.
//! [`BlipCaptioner`] runs the BLIP base checkpoint through ONNX Runtime;
//! tests substitute fakes.

mod blip;
pub mod consensus;
pub mod decoding;

pub use blip::BlipCaptioner;
pub use consensus::consensus_caption;
pub use decoding::{generate, Decoding, NextTokenLogits, TokenId};

use image::RgbImage;

use crate::error::PipelineResult;

/// Image to natural-language description.
pub trait Captioner: Send + Sync {
    /// Caption `image` with one decoding strategy.
    fn caption(&self, image: &RgbImage, decoding: &Decoding) -> PipelineResult<String>;

    /// Caption `image` once per strategy, in order.
    ///
    /// Implementations that encode the image separately from decoding should
    /// override this to encode only once.
    fn captions(&self, image: &RgbImage, decodings: &[Decoding]) -> PipelineResult<Vec<String>> {
        decodings.iter().map(|d| self.caption(image, d)).collect()
    }
}
