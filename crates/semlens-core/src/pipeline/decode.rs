//! Image decoding with format detection, dimension limits and RGB normalization.

use image::{GenericImageView, ImageFormat, RgbImage};
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image decoder with configurable limits.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// A decoded request image. The raster is always RGB.
#[derive(Debug)]
pub struct DecodedImage {
    /// RGB pixels, immutable for the rest of the request
    pub image: RgbImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Original file size in bytes
    pub file_size: u64,
    /// BLAKE3 hash of the file bytes
    pub content_hash: String,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Decode an image from an in-memory byte buffer.
    ///
    /// Decoding runs on the blocking pool. Grayscale, RGBA and 16-bit inputs
    /// are converted to 8-bit RGB rather than rejected.
    pub async fn decode_from_bytes(
        &self,
        bytes: Vec<u8>,
        path: &Path,
    ) -> Result<DecodedImage, PipelineError> {
        let path_owned = path.to_path_buf();
        let decoded =
            tokio::task::spawn_blocking(move || Self::decode_bytes_sync(bytes, &path_owned))
                .await
                .map_err(|e| PipelineError::Worker {
                    stage: "decode",
                    message: e.to_string(),
                })??;

        if decoded.width > self.limits.max_image_dimension
            || decoded.height > self.limits.max_image_dimension
        {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width: decoded.width,
                height: decoded.height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        Ok(decoded)
    }

    /// Read and decode an image file.
    pub async fn decode(&self, path: &Path) -> Result<DecodedImage, PipelineError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot read file: {}", e),
            })?;
        self.decode_from_bytes(bytes, path).await
    }

    /// Synchronous decode from bytes (runs in spawn_blocking).
    pub(crate) fn decode_bytes_sync(
        bytes: Vec<u8>,
        path: &Path,
    ) -> Result<DecodedImage, PipelineError> {
        use std::io::Cursor;

        let file_size = bytes.len() as u64;
        let content_hash = content_hash(&bytes);

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let format = match reader.format() {
            Some(f) => f,
            None => ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })?,
        };
        let dynamic = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (width, height) = dynamic.dimensions();
        if !matches!(dynamic, image::DynamicImage::ImageRgb8(_)) {
            tracing::debug!(
                "Converting {:?} from {:?} to RGB8",
                path,
                dynamic.color()
            );
        }

        Ok(DecodedImage {
            image: dynamic.into_rgb8(),
            format,
            width,
            height,
            file_size,
            content_hash,
        })
    }
}

/// BLAKE3 hex digest of a byte buffer.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, LumaA, Rgba};
    use std::io::Cursor;

    fn encode_png(image: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_format_to_string() {
        assert_eq!(format_to_string(ImageFormat::Jpeg), "jpeg");
        assert_eq!(format_to_string(ImageFormat::Png), "png");
        assert_eq!(format_to_string(ImageFormat::Tiff), "unknown");
    }

    #[test]
    fn test_rgba_is_converted_to_rgb() {
        let rgba = ImageBuffer::from_pixel(4, 3, Rgba([10u8, 20, 30, 128]));
        let bytes = encode_png(&DynamicImage::ImageRgba8(rgba));

        let decoded = ImageDecoder::decode_bytes_sync(bytes, Path::new("a.png")).unwrap();
        assert_eq!((decoded.width, decoded.height), (4, 3));
        assert_eq!(decoded.image.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn test_grayscale_alpha_is_converted_to_rgb() {
        let gray = ImageBuffer::from_pixel(2, 2, LumaA([200u8, 255]));
        let bytes = encode_png(&DynamicImage::ImageLumaA8(gray));

        let decoded = ImageDecoder::decode_bytes_sync(bytes, Path::new("g.png")).unwrap();
        assert_eq!(decoded.image.get_pixel(1, 1).0, [200, 200, 200]);
    }

    #[test]
    fn test_format_detected_by_content() {
        let bytes = encode_png(&DynamicImage::new_rgb8(2, 2));
        let decoded = ImageDecoder::decode_bytes_sync(bytes, Path::new("misnamed.jpg")).unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let bytes = encode_png(&DynamicImage::new_rgb8(2, 2));
        let decoded = ImageDecoder::decode_bytes_sync(bytes.clone(), Path::new("a.png")).unwrap();
        assert_eq!(decoded.content_hash, content_hash(&bytes));
        assert_eq!(decoded.content_hash.len(), 64);
        assert_eq!(decoded.file_size, bytes.len() as u64);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = ImageDecoder::decode_bytes_sync(vec![1, 2, 3, 4], Path::new("x.bin"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_dimension_limit_enforced() {
        let bytes = encode_png(&DynamicImage::new_rgb8(32, 8));
        let decoder = ImageDecoder::new(LimitsConfig {
            max_image_dimension: 16,
            ..LimitsConfig::default()
        });
        let err = decoder
            .decode_from_bytes(bytes, Path::new("wide.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::ImageTooLarge { width: 32, .. }));
    }
}
