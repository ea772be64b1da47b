//! CLI enum types and shared check options.

use clap::{Args, ValueEnum};
use semlens_core::{CaptionPreset, Config, OutputFormat, Policy};

/// Verdict policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Score the description alone (MATCH / UNCERTAIN / MISMATCH)
    Single,
    /// Average description and caption scores (CONSISTENT / PARTIALLY / INCONSISTENT)
    Dual,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Single => Policy::Single,
            PolicyArg::Dual => Policy::Dual,
        }
    }
}

/// Caption decoding preset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PresetArg {
    /// Beam search (5 beams, 40 tokens) with the "a photo of" prompt
    Interactive,
    /// Greedy decoding, 30 tokens, no prompt
    Script,
}

impl From<PresetArg> for CaptionPreset {
    fn from(arg: PresetArg) -> Self {
        match arg {
            PresetArg::Interactive => CaptionPreset::Interactive,
            PresetArg::Script => CaptionPreset::Script,
        }
    }
}

/// Report format for a single check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored terminal view
    Pretty,
    /// JSON object
    Json,
    /// One JSON object per line
    Jsonl,
}

impl ReportFormat {
    /// Resolve from `[output] format`, falling back to pretty.
    pub fn from_config(config: &Config) -> Self {
        match OutputFormat::parse(&config.output.format) {
            Some(OutputFormat::Json) => ReportFormat::Json,
            Some(OutputFormat::JsonLines) => ReportFormat::Jsonl,
            None => ReportFormat::Pretty,
        }
    }

    /// The machine-readable format, if any.
    pub fn machine(self) -> Option<OutputFormat> {
        match self {
            ReportFormat::Pretty => None,
            ReportFormat::Json => Some(OutputFormat::Json),
            ReportFormat::Jsonl => Some(OutputFormat::JsonLines),
        }
    }
}

/// Batch output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum BatchFormat {
    /// JSON array
    Json,
    /// One JSON object per line (streamed)
    #[default]
    Jsonl,
}

impl From<BatchFormat> for OutputFormat {
    fn from(format: BatchFormat) -> Self {
        match format {
            BatchFormat::Json => OutputFormat::Json,
            BatchFormat::Jsonl => OutputFormat::JsonLines,
        }
    }
}

/// Model and scoring flags shared by `check` and `batch`.
#[derive(Args, Debug, Clone, Default)]
pub struct CheckOptions {
    /// Verdict policy (overrides `[scoring] policy`)
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,

    /// Caption decoding preset
    #[arg(long, value_enum)]
    pub preset: Option<PresetArg>,

    /// Also build a consensus caption from N sampled captions
    #[arg(long, value_name = "N")]
    pub consensus: Option<usize>,
}

impl CheckOptions {
    /// Apply the flags to `config`. `default_preset` is used when `--preset` is absent.
    pub fn apply(&self, config: &mut Config, default_preset: Option<PresetArg>) -> anyhow::Result<()> {
        if let Some(policy) = self.policy.map(Policy::from) {
            if policy != config.scoring.policy {
                // Threshold overrides were calibrated for the configured policy.
                config.scoring.upper = None;
                config.scoring.lower = None;
            }
            config.scoring.policy = policy;
        }

        if let Some(preset) = self.preset.or(default_preset) {
            config.caption.apply_preset(preset.into());
        }

        if let Some(samples) = self.consensus {
            if samples < 2 {
                anyhow::bail!("--consensus needs at least 2 samples, got {samples}");
            }
            config.consensus.enabled = true;
            config.consensus.samples = samples;
            config.consensus.min_votes = config.consensus.min_votes.min(samples);
        }
        Ok(())
    }
}
