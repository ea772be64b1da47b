//! BLIP image captioning over ONNX Runtime.
//!
//! The export is split into a vision encoder (`vision_model.onnx`, producing
//! `last_hidden_state`) and a text decoder (`text_decoder.onnx`, producing
//! `logits` for every position). The decoder has no KV cache, so each step
//! re-runs the whole prefix.

use std::path::Path;
use std::sync::Mutex;

use image::RgbImage;
use ort::session::Session;
use ort::value::DynValue;
use tokenizers::Tokenizer;

use super::decoding::{generate, Decoding, NextTokenLogits, TokenId};
use super::Captioner;
use crate::config::CaptionConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::onnx;
use crate::preprocess::Preprocessor;

const VISION_MODEL: &str = "vision_model.onnx";
const TEXT_DECODER: &str = "text_decoder.onnx";
const TOKENIZER: &str = "tokenizer.json";

/// `[DEC]`: BLIP's decoder start token.
const DEFAULT_BOS: TokenId = 30522;
/// `[SEP]`: end of caption.
const DEFAULT_EOS: TokenId = 102;

fn caption_err(message: impl Into<String>) -> PipelineError {
    PipelineError::Caption {
        message: message.into(),
    }
}

/// Encoder output for one image: `[seq_len, hidden]`, row-major.
struct ImageFeatures {
    data: Vec<f32>,
    seq_len: usize,
    hidden: usize,
}

/// Which optional inputs the exported decoder declares.
struct DecoderInputs {
    attention_mask: bool,
    encoder_attention_mask: bool,
}

pub struct BlipCaptioner {
    vision: Mutex<Session>,
    vision_input: String,
    decoder: Mutex<Session>,
    decoder_inputs: DecoderInputs,
    tokenizer: Tokenizer,
    preprocessor: Preprocessor,
    bos: TokenId,
    eos: TokenId,
    prompt: Option<String>,
    prompt_ids: Vec<TokenId>,
}

impl BlipCaptioner {
    /// Load the encoder, decoder and tokenizer from `model_dir`.
    pub fn load(config: &CaptionConfig, model_dir: &Path) -> PipelineResult<Self> {
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

        let decoder = onnx::load_session(&model_dir.join(TEXT_DECODER))?;
        let names = onnx::input_names(&decoder);
        let decoder_inputs = DecoderInputs {
            attention_mask: names.iter().any(|n| n == "attention_mask"),
            encoder_attention_mask: names.iter().any(|n| n == "encoder_attention_mask"),
        };

        let bos = tokenizer
            .token_to_id("[DEC]")
            .map_or(DEFAULT_BOS, TokenId::from);
        let eos = tokenizer
            .token_to_id("[SEP]")
            .map_or(DEFAULT_EOS, TokenId::from);

        let prompt = config
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);
        let prompt_ids = match &prompt {
            Some(p) => tokenizer
                .encode(p.as_str(), false)
                .map_err(|e| PipelineError::Model {
                    path: tokenizer_path.clone(),
                    message: format!("Failed to tokenize prompt {p:?}: {e}"),
                })?
                .get_ids()
                .iter()
                .map(|&id| TokenId::from(id))
                .collect(),
            None => Vec::new(),
        };

        tracing::info!(
            "Loaded BLIP captioner from {:?} (bos={bos}, eos={eos}, prompt={:?})",
            model_dir,
            prompt
        );

        Ok(Self {
            vision: Mutex::new(vision),
            vision_input,
            decoder: Mutex::new(decoder),
            decoder_inputs,
            tokenizer,
            preprocessor: Preprocessor::blip(config.image_size),
            bos,
            eos,
            prompt,
            prompt_ids,
        })
    }

    /// Check whether all caption model files exist.
    pub fn model_exists(model_dir: &Path) -> bool {
        [VISION_MODEL, TEXT_DECODER, TOKENIZER]
            .iter()
            .all(|f| model_dir.join(f).exists())
    }

    fn encode_image(&self, image: &RgbImage) -> PipelineResult<ImageFeatures> {
        let tensor = self.preprocessor.to_tensor(image);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat: Vec<f32> = tensor.iter().copied().collect();
        let input = onnx::f32_tensor(shape, flat).map_err(caption_err)?;

        let mut session = self
            .vision
            .lock()
            .map_err(|e| caption_err(format!("Vision session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.vision_input.as_str() => input])
            .map_err(|e| caption_err(format!("Vision encoder inference failed: {e}")))?;

        let (shape, data) =
            onnx::extract_f32(&outputs, "last_hidden_state").map_err(caption_err)?;
        match shape.as_slice() {
            [1, seq_len, hidden] => Ok(ImageFeatures {
                data,
                seq_len: *seq_len as usize,
                hidden: *hidden as usize,
            }),
            _ => Err(caption_err(format!(
                "Unexpected last_hidden_state shape: {shape:?}"
            ))),
        }
    }

    fn decode_text(&self, generated: &[TokenId]) -> PipelineResult<String> {
        let ids: Vec<u32> = self
            .prompt_ids
            .iter()
            .chain(generated)
            .map(|&id| id as u32)
            .collect();
        let text = self
            .tokenizer
            .decode(&ids, true)
            .map_err(|e| caption_err(format!("Failed to decode caption: {e}")))?;
        Ok(strip_prompt(&text, self.prompt.as_deref()))
    }

    fn run_decoding(&self, features: &ImageFeatures, decoding: &Decoding) -> PipelineResult<String> {
        let mut prefix = Vec::with_capacity(1 + self.prompt_ids.len());
        prefix.push(self.bos);
        prefix.extend_from_slice(&self.prompt_ids);

        let step = DecoderStep {
            captioner: self,
            features,
        };
        let generated = generate(&step, &prefix, self.eos, decoding)?;
        self.decode_text(&generated)
    }
}

impl Captioner for BlipCaptioner {
    fn caption(&self, image: &RgbImage, decoding: &Decoding) -> PipelineResult<String> {
        let features = self.encode_image(image)?;
        self.run_decoding(&features, decoding)
    }

    fn captions(&self, image: &RgbImage, decodings: &[Decoding]) -> PipelineResult<Vec<String>> {
        let features = self.encode_image(image)?;
        decodings
            .iter()
            .map(|d| self.run_decoding(&features, d))
            .collect()
    }
}

/// One decoder forward pass over a batch of prefixes for a fixed image.
struct DecoderStep<'a> {
    captioner: &'a BlipCaptioner,
    features: &'a ImageFeatures,
}

impl NextTokenLogits for DecoderStep<'_> {
    fn next_token_logits(&self, sequences: &[Vec<TokenId>]) -> PipelineResult<Vec<Vec<f32>>> {
        let batch = sequences.len();
        let len = sequences.first().map_or(0, Vec::len);
        if batch == 0 || len == 0 {
            return Err(caption_err("Empty decoder batch"));
        }
        let ImageFeatures {
            data,
            seq_len,
            hidden,
        } = self.features;

        let input_ids: Vec<i64> = sequences.iter().flatten().copied().collect();
        if input_ids.len() != batch * len {
            return Err(caption_err("Decoder batch sequences differ in length"));
        }
        let encoder_states: Vec<f32> = std::iter::repeat(data.as_slice())
            .take(batch)
            .flatten()
            .copied()
            .collect();

        let mut inputs: Vec<(&str, DynValue)> = vec![
            (
                "input_ids",
                onnx::i64_tensor(vec![batch as i64, len as i64], input_ids).map_err(caption_err)?,
            ),
            (
                "encoder_hidden_states",
                onnx::f32_tensor(
                    vec![batch as i64, *seq_len as i64, *hidden as i64],
                    encoder_states,
                )
                .map_err(caption_err)?,
            ),
        ];
        let inputs_spec = &self.captioner.decoder_inputs;
        if inputs_spec.attention_mask {
            inputs.push((
                "attention_mask",
                onnx::i64_tensor(vec![batch as i64, len as i64], vec![1; batch * len])
                    .map_err(caption_err)?,
            ));
        }
        if inputs_spec.encoder_attention_mask {
            inputs.push((
                "encoder_attention_mask",
                onnx::i64_tensor(
                    vec![batch as i64, *seq_len as i64],
                    vec![1; batch * seq_len],
                )
                .map_err(caption_err)?,
            ));
        }

        let mut session = self
            .captioner
            .decoder
            .lock()
            .map_err(|e| caption_err(format!("Decoder session lock poisoned: {e}")))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| caption_err(format!("Text decoder inference failed: {e}")))?;

        let (shape, logits) = onnx::extract_f32(&outputs, "logits").map_err(caption_err)?;
        last_position_logits(&shape, &logits, batch)
    }
}

/// Slice the final position's vocabulary row for each batch entry of `[B, L, V]` logits.
fn last_position_logits(shape: &[i64], logits: &[f32], batch: usize) -> PipelineResult<Vec<Vec<f32>>> {
    let (b, l, v) = match shape {
        [b, l, v] => (*b as usize, *l as usize, *v as usize),
        _ => return Err(caption_err(format!("Unexpected logits shape: {shape:?}"))),
    };
    if b != batch || l == 0 || logits.len() < b * l * v {
        return Err(caption_err(format!(
            "Logits shape {shape:?} does not match batch of {batch}"
        )));
    }
    Ok((0..b)
        .map(|i| {
            let start = (i * l + l - 1) * v;
            logits[start..start + v].to_vec()
        })
        .collect())
}

/// Remove a leading conditional prompt from decoded text.
fn strip_prompt(text: &str, prompt: Option<&str>) -> String {
    let text = text.trim();
    let Some(prompt) = prompt else {
        return text.to_string();
    };
    let prompt = prompt.trim();
    match text.get(..prompt.len()) {
        Some(head) if head.eq_ignore_ascii_case(prompt) => text[prompt.len()..].trim().to_string(),
        _ => text.to_string(),
    }
}
