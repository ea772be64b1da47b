//! Autoregressive decoding loops driven by a next-token scorer.
//!
//! The ONNX decoder only exposes a single forward pass, so greedy search,
//! beam search and seeded sampling live here. They are generic over
//! [`NextTokenLogits`] so they can be exercised without a model.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PipelineError;
use crate::math::{argmax, log_softmax};

/// Token id type used by the ONNX decoders.
pub type TokenId = i64;

/// Produces next-token logits for a batch of equal-length sequences.
pub trait NextTokenLogits {
    /// One logit row per input sequence, for the position after its last token.
    fn next_token_logits(&self, sequences: &[Vec<TokenId>])
        -> Result<Vec<Vec<f32>>, PipelineError>;
}

/// Caption decoding strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Decoding {
    /// Argmax at every step; ties go to the lowest token id.
    Greedy { max_new_tokens: usize },
    /// Deterministic beam search.
    Beam {
        width: usize,
        max_new_tokens: usize,
        length_penalty: f32,
    },
    /// Seeded top-k sampling with temperature.
    Sample {
        max_new_tokens: usize,
        temperature: f32,
        top_k: usize,
        seed: u64,
    },
}

impl Decoding {
    pub fn max_new_tokens(&self) -> usize {
        match self {
            Decoding::Greedy { max_new_tokens }
            | Decoding::Beam { max_new_tokens, .. }
            | Decoding::Sample { max_new_tokens, .. } => *max_new_tokens,
        }
    }

    /// Whether repeated runs on the same input give the same tokens.
    pub fn is_deterministic(&self) -> bool {
        !matches!(self, Decoding::Sample { .. })
    }
}

impl fmt::Display for Decoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoding::Greedy { max_new_tokens } => write!(f, "greedy, {max_new_tokens} tokens"),
            Decoding::Beam {
                width,
                max_new_tokens,
                length_penalty,
            } => write!(
                f,
                "beam {width}, {max_new_tokens} tokens, length penalty {length_penalty}"
            ),
            Decoding::Sample {
                max_new_tokens,
                temperature,
                top_k,
                seed,
            } => write!(
                f,
                "top-{top_k} sampling at {temperature}, {max_new_tokens} tokens, seed {seed}"
            ),
        }
    }
}

/// Run `decoding` from `prefix` and return the generated tokens.
///
/// The prefix and the end-of-sequence token are not part of the result.
pub fn generate<S>(
    scorer: &S,
    prefix: &[TokenId],
    eos: TokenId,
    decoding: &Decoding,
) -> Result<Vec<TokenId>, PipelineError>
where
    S: NextTokenLogits + ?Sized,
{
    if prefix.is_empty() {
        return Err(PipelineError::Caption {
            message: "Decoder prefix must contain at least the start token".to_string(),
        });
    }
    match *decoding {
        Decoding::Greedy { max_new_tokens } => greedy(scorer, prefix, eos, max_new_tokens),
        Decoding::Beam {
            width,
            max_new_tokens,
            length_penalty,
        } => {
            if width <= 1 {
                greedy(scorer, prefix, eos, max_new_tokens)
            } else {
                beam_search(scorer, prefix, eos, width, max_new_tokens, length_penalty)
            }
        }
        Decoding::Sample {
            max_new_tokens,
            temperature,
            top_k,
            seed,
        } => sample(scorer, prefix, eos, max_new_tokens, temperature, top_k, seed),
    }
}

fn single_row<S>(scorer: &S, sequence: &[TokenId]) -> Result<Vec<f32>, PipelineError>
where
    S: NextTokenLogits + ?Sized,
{
    scorer
        .next_token_logits(&[sequence.to_vec()])?
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::Caption {
            message: "Decoder returned no logits".to_string(),
        })
}

fn greedy<S>(
    scorer: &S,
    prefix: &[TokenId],
    eos: TokenId,
    max_new_tokens: usize,
) -> Result<Vec<TokenId>, PipelineError>
where
    S: NextTokenLogits + ?Sized,
{
    let mut sequence = prefix.to_vec();
    for _ in 0..max_new_tokens {
        let logits = single_row(scorer, &sequence)?;
        let next = argmax(&logits).ok_or_else(|| PipelineError::Caption {
            message: "Decoder produced no finite logits".to_string(),
        })? as TokenId;
        if next == eos {
            break;
        }
        sequence.push(next);
    }
    Ok(sequence.split_off(prefix.len()))
}

struct Beam {
    tokens: Vec<TokenId>,
    log_prob: f32,
}

struct Hypothesis {
    tokens: Vec<TokenId>,
    score: f32,
}

fn normalized(log_prob: f32, len: usize, length_penalty: f32) -> f32 {
    log_prob / (len as f32).powf(length_penalty)
}

fn beam_search<S>(
    scorer: &S,
    prefix: &[TokenId],
    eos: TokenId,
    width: usize,
    max_new_tokens: usize,
    length_penalty: f32,
) -> Result<Vec<TokenId>, PipelineError>
where
    S: NextTokenLogits + ?Sized,
{
    let mut running = vec![Beam {
        tokens: prefix.to_vec(),
        log_prob: 0.0,
    }];
    let mut finished: Vec<Hypothesis> = Vec::new();

    for _ in 0..max_new_tokens {
        let sequences: Vec<Vec<TokenId>> = running.iter().map(|b| b.tokens.clone()).collect();
        let rows = scorer.next_token_logits(&sequences)?;
        if rows.len() != running.len() {
            return Err(PipelineError::Caption {
                message: format!(
                    "Decoder returned {} logit rows for {} beams",
                    rows.len(),
                    running.len()
                ),
            });
        }

        // (beam index, token, cumulative log-prob)
        let mut candidates: Vec<(usize, TokenId, f32)> = Vec::new();
        for (beam_idx, row) in rows.iter().enumerate() {
            let base = running[beam_idx].log_prob;
            let mut scored: Vec<(TokenId, f32)> = log_softmax(row)
                .into_iter()
                .enumerate()
                .filter(|(_, lp)| lp.is_finite())
                .map(|(tok, lp)| (tok as TokenId, base + lp))
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            scored.truncate(2 * width);
            candidates.extend(scored.into_iter().map(|(tok, s)| (beam_idx, tok, s)));
        }
        candidates.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });

        let mut next = Vec::with_capacity(width);
        for (rank, &(beam_idx, token, log_prob)) in candidates.iter().take(2 * width).enumerate() {
            let parent = &running[beam_idx];
            if token == eos {
                // EOS outside the top `width` would displace a better live beam.
                if rank < width {
                    finished.push(Hypothesis {
                        tokens: parent.tokens[prefix.len()..].to_vec(),
                        score: normalized(log_prob, parent.tokens.len(), length_penalty),
                    });
                }
            } else {
                let mut tokens = parent.tokens.clone();
                tokens.push(token);
                next.push(Beam { tokens, log_prob });
            }
            if next.len() == width {
                break;
            }
        }
        running = next;

        if running.is_empty() || search_done(&finished, &running, width, length_penalty) {
            break;
        }
    }

    for beam in running {
        let len = beam.tokens.len();
        finished.push(Hypothesis {
            tokens: beam.tokens[prefix.len()..].to_vec(),
            score: normalized(beam.log_prob, len, length_penalty),
        });
    }

    finished
        .into_iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))
        .map(|h| h.tokens)
        .ok_or_else(|| PipelineError::Caption {
            message: "Beam search produced no hypotheses".to_string(),
        })
}

/// True once `width` hypotheses are closed and no live beam can beat the worst.
fn search_done(finished: &[Hypothesis], running: &[Beam], width: usize, length_penalty: f32) -> bool {
    if finished.len() < width {
        return false;
    }
    let mut scores: Vec<f32> = finished.iter().map(|h| h.score).collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    let worst_kept = scores[width - 1];
    let best_running = running
        .iter()
        .map(|b| normalized(b.log_prob, b.tokens.len(), length_penalty))
        .fold(f32::NEG_INFINITY, f32::max);
    best_running <= worst_kept
}

fn sample<S>(
    scorer: &S,
    prefix: &[TokenId],
    eos: TokenId,
    max_new_tokens: usize,
    temperature: f32,
    top_k: usize,
    seed: u64,
) -> Result<Vec<TokenId>, PipelineError>
where
    S: NextTokenLogits + ?Sized,
{
    let mut rng = StdRng::seed_from_u64(seed);
    let mut sequence = prefix.to_vec();
    let temperature = temperature.max(f32::EPSILON);

    for _ in 0..max_new_tokens {
        let logits = single_row(scorer, &sequence)?;
        let mut top: Vec<(usize, f32)> = logits
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| (i, v / temperature))
            .collect();
        top.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        top.truncate(top_k.max(1));

        let max = top.first().map(|t| t.1).ok_or_else(|| PipelineError::Caption {
            message: "Decoder produced no finite logits".to_string(),
        })?;
        let weights: Vec<f32> = top.iter().map(|(_, v)| (v - max).exp()).collect();
        let dist = WeightedIndex::new(&weights).map_err(|e| PipelineError::Caption {
            message: format!("Invalid sampling distribution: {e}"),
        })?;
        let next = top[dist.sample(&mut rng)].0 as TokenId;
        if next == eos {
            break;
        }
        sequence.push(next);
    }
    Ok(sequence.split_off(prefix.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const EOS: TokenId = 0;
    const A: TokenId = 1;
    const B: TokenId = 2;
    const START: TokenId = 9;
    const VOCAB: usize = 10;

    /// Logits keyed on the last token. Greedy takes A (0.6) and then ends on a
    /// three-way tie; beam search finds B followed by an almost certain EOS.
    struct TrapScorer {
        calls: Cell<usize>,
    }

    impl TrapScorer {
        fn new() -> Self {
            Self {
                calls: Cell::new(0),
            }
        }

        fn row(last: TokenId) -> Vec<f32> {
            let mut row = vec![f32::NEG_INFINITY; VOCAB];
            match last {
                START => {
                    row[A as usize] = 0.6f32.ln();
                    row[B as usize] = 0.4f32.ln();
                }
                A => {
                    for t in [EOS, A, B] {
                        row[t as usize] = (1.0f32 / 3.0).ln();
                    }
                }
                _ => {
                    row[EOS as usize] = 0.99f32.ln();
                    row[A as usize] = 0.005f32.ln();
                    row[B as usize] = 0.005f32.ln();
                }
            }
            row
        }
    }

    impl NextTokenLogits for TrapScorer {
        fn next_token_logits(
            &self,
            sequences: &[Vec<TokenId>],
        ) -> Result<Vec<Vec<f32>>, PipelineError> {
            self.calls.set(self.calls.get() + 1);
            let len = sequences[0].len();
            assert!(sequences.iter().all(|s| s.len() == len), "ragged batch");
            Ok(sequences
                .iter()
                .map(|s| Self::row(*s.last().unwrap()))
                .collect())
        }
    }

    /// Always prefers the next token id in a fixed script, then EOS.
    struct ScriptScorer(Vec<TokenId>);

    impl NextTokenLogits for ScriptScorer {
        fn next_token_logits(
            &self,
            sequences: &[Vec<TokenId>],
        ) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(sequences
                .iter()
                .map(|s| {
                    let step = s.len() - 1;
                    let want = self.0.get(step).copied().unwrap_or(EOS);
                    let mut row = vec![0.0; VOCAB];
                    row[want as usize] = 5.0;
                    row
                })
                .collect())
        }
    }

    #[test]
    fn test_greedy_takes_locally_best_token() {
        let scorer = TrapScorer::new();
        let tokens = generate(
            &scorer,
            &[START],
            EOS,
            &Decoding::Greedy { max_new_tokens: 10 },
        )
        .unwrap();
        // A, then the tie at EOS/A/B resolves to EOS (lowest id)
        assert_eq!(tokens, vec![A]);
    }

    #[test]
    fn test_beam_search_beats_greedy() {
        let scorer = TrapScorer::new();
        let tokens = generate(
            &scorer,
            &[START],
            EOS,
            &Decoding::Beam {
                width: 2,
                max_new_tokens: 10,
                length_penalty: 1.0,
            },
        )
        .unwrap();
        assert_eq!(tokens, vec![B]);
        // Stops early once no live beam can win
        assert!(scorer.calls.get() <= 3);
    }

    #[test]
    fn test_beam_width_one_is_greedy() {
        let scorer = TrapScorer::new();
        let beam = generate(
            &scorer,
            &[START],
            EOS,
            &Decoding::Beam {
                width: 1,
                max_new_tokens: 10,
                length_penalty: 1.0,
            },
        )
        .unwrap();
        assert_eq!(beam, vec![A]);
    }

    #[test]
    fn test_max_new_tokens_caps_output() {
        let scorer = ScriptScorer(vec![3, 4, 5, 6, 7]);
        let greedy = generate(&scorer, &[START], EOS, &Decoding::Greedy { max_new_tokens: 3 })
            .unwrap();
        assert_eq!(greedy, vec![3, 4, 5]);

        let beam = generate(
            &scorer,
            &[START],
            EOS,
            &Decoding::Beam {
                width: 3,
                max_new_tokens: 3,
                length_penalty: 1.0,
            },
        )
        .unwrap();
        assert_eq!(beam, vec![3, 4, 5]);
    }

    #[test]
    fn test_prompt_prefix_is_not_returned() {
        let scorer = ScriptScorer(vec![8, 3, 4]);
        // Prefix [START, 8] already contains the first scripted token.
        let tokens = generate(
            &scorer,
            &[START, 8],
            EOS,
            &Decoding::Greedy { max_new_tokens: 10 },
        )
        .unwrap();
        assert_eq!(tokens, vec![3, 4]);
    }

    #[test]
    fn test_sampling_is_reproducible_with_seed() {
        let scorer = TrapScorer::new();
        let decoding = Decoding::Sample {
            max_new_tokens: 10,
            temperature: 1.0,
            top_k: 50,
            seed: 7,
        };
        let first = generate(&scorer, &[START], EOS, &decoding).unwrap();
        let second = generate(&scorer, &[START], EOS, &decoding).unwrap();
        assert_eq!(first, second);
        assert!(!decoding.is_deterministic());
    }

    #[test]
    fn test_top_k_one_sampling_equals_greedy() {
        let scorer = ScriptScorer(vec![3, 4, 5]);
        let sampled = generate(
            &scorer,
            &[START],
            EOS,
            &Decoding::Sample {
                max_new_tokens: 10,
                temperature: 0.7,
                top_k: 1,
                seed: 123,
            },
        )
        .unwrap();
        let greedy = generate(&scorer, &[START], EOS, &Decoding::Greedy { max_new_tokens: 10 })
            .unwrap();
        assert_eq!(sampled, greedy);
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let scorer = TrapScorer::new();
        let err = generate(&scorer, &[], EOS, &Decoding::Greedy { max_new_tokens: 1 });
        assert!(err.is_err());
    }

    #[test]
    fn test_display_names_strategy() {
        let beam = Decoding::Beam {
            width: 5,
            max_new_tokens: 40,
            length_penalty: 1.0,
        };
        assert_eq!(beam.to_string(), "beam 5, 40 tokens, length penalty 1");
        assert_eq!(
            Decoding::Greedy { max_new_tokens: 30 }.to_string(),
            "greedy, 30 tokens"
        );
    }
}
