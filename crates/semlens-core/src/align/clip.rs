//! CLIP ViT-B/32 image and text encoders over ONNX Runtime.
//!
//! Both towers are separate exports and already include the projection
//! heads (`image_embeds`, `text_embeds`). Outputs are L2-normalized here.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::Session;
use ort::value::DynValue;
use tokenizers::Tokenizer;

use super::Aligner;
use crate::config::AlignmentConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::math::{l2_normalize, l2_normalize_in_place};
use crate::onnx;
use crate::preprocess::Preprocessor;

const VISION_MODEL: &str = "vision_model.onnx";
const TEXT_MODEL: &str = "text_model.onnx";
const TOKENIZER: &str = "tokenizer.json";

/// `<|endoftext|>`: end token, also used for padding.
const DEFAULT_EOT: i64 = 49407;

fn align_err(message: impl Into<String>) -> PipelineError {
    PipelineError::Alignment {
        message: message.into(),
    }
}

pub struct ClipAligner {
    vision: Mutex<Session>,
    vision_input: String,
    text: Mutex<Session>,
    text_takes_mask: bool,
    tokenizer: Tokenizer,
    preprocessor: Preprocessor,
    eot: i64,
    max_tokens: usize,
}

impl ClipAligner {
    /// Load both encoders and the tokenizer from `model_dir`.
    pub fn load(config: &AlignmentConfig, model_dir: &Path) -> PipelineResult<Self> {
        let tokenizer_path = model_dir.join(TOKENIZER);
        if !tokenizer_path.exists() {
            return Err(PipelineError::Model {
                path: tokenizer_path,
                message: "Tokenizer not found. Run `semlens models download` first.".to_string(),
            });
        }
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| PipelineError::Model {
            path: tokenizer_path.clone(),
            message: format!("Failed to load tokenizer: {e}"),
        })?;

        let vision = onnx::load_session(&model_dir.join(VISION_MODEL))?;
        let vision_input = onnx::input_names(&vision)
            .into_iter()
            .next()
            .unwrap_or_else(|| "pixel_values".to_string());

        let text = onnx::load_session(&model_dir.join(TEXT_MODEL))?;
        let text_takes_mask = onnx::input_names(&text)
            .iter()
            .any(|n| n == "attention_mask");

        let eot = tokenizer
            .token_to_id("<|endoftext|>")
            .map_or(DEFAULT_EOT, i64::from);

        tracing::info!("Loaded CLIP aligner from {:?}", model_dir);

        Ok(Self {
            vision: Mutex::new(vision),
            vision_input,
            text: Mutex::new(text),
            text_takes_mask,
            tokenizer,
            preprocessor: Preprocessor::clip(config.image_size),
            eot,
            max_tokens: config.max_text_tokens,
        })
    }

    /// Check whether all alignment model files exist.
    pub fn model_exists(model_dir: &Path) -> bool {
        [VISION_MODEL, TEXT_MODEL, TOKENIZER]
            .iter()
            .all(|f| model_dir.join(f).exists())
    }

    fn tokenize(&self, texts: &[&str]) -> PipelineResult<Vec<Vec<i64>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| align_err(format!("Tokenization failed: {e}")))?;
        Ok(encodings
            .iter()
            .map(|enc| {
                let ids: Vec<i64> = enc.get_ids().iter().map(|&id| i64::from(id)).collect();
                truncate_ids(ids, self.max_tokens, self.eot)
            })
            .collect())
    }
}

/// Cut to `max` tokens, keeping the end token as the last position.
fn truncate_ids(mut ids: Vec<i64>, max: usize, eot: i64) -> Vec<i64> {
    if ids.len() > max {
        ids.truncate(max);
        if let Some(last) = ids.last_mut() {
            *last = eot;
        }
    }
    ids
}

/// Right-pad to the longest sequence. Returns `(ids, mask, width)` flattened row-major.
fn pad_batch(sequences: &[Vec<i64>], pad: i64) -> (Vec<i64>, Vec<i64>, usize) {
    let width = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut ids = Vec::with_capacity(sequences.len() * width);
    let mut mask = Vec::with_capacity(sequences.len() * width);
    for seq in sequences {
        ids.extend_from_slice(seq);
        ids.extend(std::iter::repeat(pad).take(width - seq.len()));
        mask.extend(std::iter::repeat(1).take(seq.len()));
        mask.extend(std::iter::repeat(0).take(width - seq.len()));
    }
    (ids, mask, width)
}

impl Aligner for ClipAligner {
    fn embed_image(&self, image: &RgbImage) -> PipelineResult<Vec<f32>> {
        let tensor = self.preprocessor.to_tensor(image);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = tensor.iter().copied().collect();
        let input = onnx::f32_tensor(shape, flat).map_err(align_err)?;

        let mut session = self
            .vision
            .lock()
            .map_err(|e| align_err(format!("Vision session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.vision_input.as_str() => input])
            .map_err(|e| align_err(format!("Image encoder inference failed: {e}")))?;

        let (shape, data) = onnx::extract_f32(&outputs, "image_embeds").map_err(align_err)?;
        let mut embedding = match shape.as_slice() {
            [_] => data,
            [1, dim] => data[..*dim as usize].to_vec(),
            _ => return Err(align_err(format!("Unexpected image_embeds shape: {shape:?}"))),
        };
        l2_normalize_in_place(&mut embedding);
        Ok(embedding)
    }

    fn embed_texts(&self, texts: &[&str]) -> PipelineResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let sequences = self.tokenize(texts)?;
        let (ids, mask, width) = pad_batch(&sequences, self.eot);
        let shape = vec![texts.len() as i64, width as i64];

        let mut inputs: Vec<(&str, DynValue)> = vec![(
            "input_ids",
            onnx::i64_tensor(shape.clone(), ids).map_err(align_err)?,
        )];
        if self.text_takes_mask {
            inputs.push((
                "attention_mask",
                onnx::i64_tensor(shape, mask).map_err(align_err)?,
            ));
        }

        let mut session = self
            .text
            .lock()
            .map_err(|e| align_err(format!("Text session lock poisoned: {e}")))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| align_err(format!("Text encoder inference failed: {e}")))?;

        let (shape, data) = onnx::extract_f32(&outputs, "text_embeds").map_err(align_err)?;
        split_text_embeds(&shape, &data, texts.len())
    }
}

/// Split `[n, dim]` text embeddings into normalized rows.
fn split_text_embeds(shape: &[i64], data: &[f32], n: usize) -> PipelineResult<Vec<Vec<f32>>> {
    let dim = match shape {
        [rows, dim] if *rows as usize == n && *dim > 0 && data.len() == n * *dim as usize => {
            *dim as usize
        }
        _ => return Err(align_err(format!("Unexpected text_embeds shape: {shape:?}"))),
    };
    Ok(data.chunks(dim).map(l2_normalize).collect())
}
