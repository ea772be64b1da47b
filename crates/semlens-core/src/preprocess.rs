//! Image preprocessing for the ONNX vision encoders.
//!
//! Both encoders take NCHW float tensors normalized with the OpenAI CLIP
//! statistics. They differ only in geometry:
//! - CLIP: resize shortest edge to 224, center crop 224×224
//! - BLIP: exact resize to 384×384

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;

/// Number of color channels (RGB).
const CHANNELS: usize = 3;

/// OpenAI CLIP per-channel mean (also used by BLIP).
pub const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];

/// OpenAI CLIP per-channel std (also used by BLIP).
pub const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// How the source image is mapped onto the square model input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resize {
    /// Stretch to `size × size`
    Exact,
    /// Center square of the shortest edge, scaled to `size × size`
    ShortestEdgeCenterCrop,
}

/// Geometry and normalization for one vision encoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
    pub size: u32,
    pub resize: Resize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Preprocessor {
    /// CLIP ViT preprocessing at the given crop size.
    pub fn clip(size: u32) -> Self {
        Self {
            size,
            resize: Resize::ShortestEdgeCenterCrop,
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }

    /// BLIP preprocessing at the given input size.
    pub fn blip(size: u32) -> Self {
        Self {
            size,
            resize: Resize::Exact,
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }

    /// Resize/crop to the model's square input.
    fn fit(&self, image: &RgbImage) -> RgbImage {
        let size = self.size;
        match self.resize {
            Resize::Exact => imageops::resize(image, size, size, FilterType::CatmullRom),
            Resize::ShortestEdgeCenterCrop => {
                // Crop in source coordinates first; scaling the whole image
                // would allocate in proportion to its aspect ratio.
                let (w, h) = image.dimensions();
                let side = w.min(h).max(1);
                let x = (w.saturating_sub(side)) / 2;
                let y = (h.saturating_sub(side)) / 2;
                let square = imageops::crop_imm(image, x, y, side, side).to_image();
                imageops::resize(&square, size, size, FilterType::CatmullRom)
            }
        }
    }

    /// Produce a `[1, 3, size, size]` tensor ready for ONNX Runtime.
    pub fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let fitted = self.fit(image);
        let size = self.size as usize;
        let mut tensor = Array4::<f32>::zeros((1, CHANNELS, size, size));

        // Write through the raw slice; 4D indexing per pixel is noticeably slower.
        let plane = size * size;
        if let Some(tensor_data) = tensor.as_slice_mut() {
            for (i, pixel) in fitted.as_raw().chunks_exact(CHANNELS).enumerate() {
                for (c, &val) in pixel.iter().enumerate() {
                    tensor_data[c * plane + i] = (val as f32 / 255.0 - self.mean[c]) / self.std[c];
                }
            }
        }

        tensor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_clip_shape_from_landscape() {
        let img = RgbImage::new(640, 480);
        let tensor = Preprocessor::clip(224).to_tensor(&img);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_blip_shape_from_portrait() {
        let img = RgbImage::new(300, 500);
        let tensor = Preprocessor::blip(384).to_tensor(&img);
        assert_eq!(tensor.shape(), &[1, 3, 384, 384]);
    }

    #[test]
    fn test_center_crop_keeps_middle() {
        // Left third red, middle third green, right third blue; crop must be all green.
        let img = RgbImage::from_fn(90, 30, |x, _| match x {
            0..=29 => Rgb([255, 0, 0]),
            30..=59 => Rgb([0, 255, 0]),
            _ => Rgb([0, 0, 255]),
        });
        let pre = Preprocessor::clip(30);
        let fitted = pre.fit(&img);
        assert_eq!(fitted.dimensions(), (30, 30));
        assert_eq!(fitted.get_pixel(15, 15).0, [0, 255, 0]);
    }

    #[test]
    fn test_extreme_aspect_ratio_stays_bounded() {
        let strip = RgbImage::from_pixel(10_000, 2, Rgb([40, 200, 40]));
        let pre = Preprocessor::clip(224);
        assert_eq!(pre.fit(&strip).dimensions(), (224, 224));
        let tensor = pre.to_tensor(&strip);
        assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        let expected = (200.0 / 255.0 - CLIP_MEAN[1]) / CLIP_STD[1];
        assert!((tensor[[0, 1, 112, 112]] - expected).abs() < 1e-2);
    }

    #[test]
    fn test_normalization_values() {
        let white = RgbImage::from_pixel(10, 10, Rgb([255, 255, 255]));
        let tensor = Preprocessor::blip(16).to_tensor(&white);
        for c in 0..3 {
            let expected = (1.0 - CLIP_MEAN[c]) / CLIP_STD[c];
            assert!((tensor[[0, c, 8, 8]] - expected).abs() < 1e-3);
        }

        let black = RgbImage::from_pixel(10, 10, Rgb([0, 0, 0]));
        let tensor = Preprocessor::blip(16).to_tensor(&black);
        let expected = -CLIP_MEAN[0] / CLIP_STD[0];
        assert!((tensor[[0, 0, 3, 3]] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_channels_are_planar() {
        let red = RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]));
        let tensor = Preprocessor::blip(4).to_tensor(&red);
        assert!(tensor[[0, 0, 0, 0]] > 1.0);
        assert!(tensor[[0, 1, 0, 0]] < 0.0);
        assert!(tensor[[0, 2, 0, 0]] < 0.0);
    }
}
