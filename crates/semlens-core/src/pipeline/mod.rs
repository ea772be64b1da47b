//! Consistency-check pipeline stages.
//!
//! - **validate**: Pre-decode checks (existence, size, magic bytes)
//! - **decode**: Load, decode and convert images to RGB
//! - **check**: Caption, align and score one image-text pair

pub mod check;
pub mod decode;
pub mod validate;

// Re-exports for convenient access
pub use check::{CheckOutcome, ConsensusPlan, ConsistencyChecker};
pub use decode::{DecodedImage, ImageDecoder};
pub use validate::Validator;
