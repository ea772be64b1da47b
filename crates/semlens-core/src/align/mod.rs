//! Image-text alignment in a shared embedding space.

mod clip;

pub use clip::ClipAligner;

use image::RgbImage;

use crate::error::PipelineResult;
use crate::math::dot;

/// Embeds images and texts into one space with unit-norm vectors.
pub trait Aligner: Send + Sync {
    /// L2-normalized image embedding.
    fn embed_image(&self, image: &RgbImage) -> PipelineResult<Vec<f32>>;

    /// L2-normalized embeddings, one per text, in input order.
    fn embed_texts(&self, texts: &[&str]) -> PipelineResult<Vec<Vec<f32>>>;

    /// Cosine similarity of `image` with each text; `result[i]` pairs with `texts[i]`.
    fn similarities(&self, image: &RgbImage, texts: &[&str]) -> PipelineResult<Vec<f32>> {
        let image_embedding = self.embed_image(image)?;
        let text_embeddings = self.embed_texts(texts)?;
        Ok(text_embeddings
            .iter()
            .map(|t| dot(&image_embedding, t))
            .collect())
    }
}
