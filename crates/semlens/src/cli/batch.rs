//! The `semlens batch` command: check every pair in a JSON Lines manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Args;
use semlens_core::scoring::Tier;
use semlens_core::{BatchStats, CaptionPreset, CheckRequest, Config, Lens, OutputWriter, Policy, Verdict};

use super::check::ensure_models;
use super::types::{BatchFormat, CheckOptions, PresetArg};

/// Arguments for the `batch` command.
#[derive(Args, Debug, Clone)]
pub struct BatchArgs {
    /// JSON Lines file, one `{"image": ..., "text": ...}` object per line
    pub manifest: PathBuf,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "jsonl")]
    pub format: BatchFormat,

    #[command(flatten)]
    pub options: CheckOptions,
}

/// One manifest line: its 1-based line number and the parsed request.
pub type ManifestEntry = (usize, Result<CheckRequest, serde_json::Error>);

/// Parse a manifest. Blank lines and `#` comments are skipped; relative image
/// paths are resolved against `base`.
pub fn parse_manifest(content: &str, base: &Path) -> Vec<ManifestEntry> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            let request = serde_json::from_str::<CheckRequest>(line)
                .map(|r| r.resolve_against(base));
            (idx + 1, request)
        })
        .collect()
}

/// Batches default to the script preset, unless `[caption]` was customized.
fn batch_default_preset(config: &Config) -> Option<PresetArg> {
    if config.caption.matches_preset(CaptionPreset::Interactive) {
        tracing::info!("Using the script caption preset (greedy, no prompt)");
        Some(PresetArg::Script)
    } else {
        tracing::info!("Keeping the [caption] decoding settings from the config file");
        None
    }
}

/// Execute the batch command.
pub async fn execute(args: BatchArgs, mut config: Config) -> anyhow::Result<()> {
    let default_preset = batch_default_preset(&config);
    args.options.apply(&mut config, default_preset)?;

    let content = std::fs::read_to_string(&args.manifest).map_err(|e| {
        anyhow::anyhow!("Cannot read manifest {}: {e}", args.manifest.display())
    })?;
    let base = args
        .manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let entries = parse_manifest(&content, &base);
    if entries.is_empty() {
        anyhow::bail!("Manifest {} has no entries", args.manifest.display());
    }
    tracing::info!("Loaded {} entries from {:?}", entries.len(), args.manifest);

    let lens = Lens::new(config);
    ensure_models(&lens)?;

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = OutputWriter::new(sink, args.format.into(), lens.config().output.pretty);

    let progress = create_progress_bar(entries.len() as u64);
    let mut stats = BatchStats::default();
    let start_time = std::time::Instant::now();

    for (line, entry) in entries {
        let request = match entry {
            Ok(request) => request,
            Err(e) => {
                stats.failed += 1;
                tracing::error!("Line {line}: invalid manifest entry: {e}");
                progress.inc(1);
                continue;
            }
        };

        match lens.check(&request).await {
            Ok(report) => {
                stats.record(&report);
                writer.push(&report)?;
            }
            Err(e) => {
                stats.failed += 1;
                tracing::error!("Line {line}: {:?} - {}", request.image, e);
            }
        }

        progress.inc(1);
        let elapsed = start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            let rate = (stats.succeeded + stats.failed) as f64 / elapsed;
            progress.set_message(format!("{:.2} checks/sec", rate));
        }
    }

    writer.finish()?;
    if let Some(path) = &args.output {
        tracing::info!("Output written to {:?}", path);
    }

    stats.total_seconds = start_time.elapsed().as_secs_f64();
    progress.finish_and_clear();
    print_summary(&stats, lens.config().scoring.policy);

    Ok(())
}

/// Create a progress bar for batch checks.
fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
    ) {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.set_message("loading models...");
    pb
}

/// Summary rows from best to worst tier, labelled the way `policy` reports them.
fn summary_rows(stats: &BatchStats, policy: Policy) -> Vec<(String, usize)> {
    [Tier::High, Tier::Mid, Tier::Low]
        .into_iter()
        .map(|tier| {
            let label = format!("{}:", Verdict::from_tier(policy, tier).label());
            (label, stats.tiers[tier as usize])
        })
        .collect()
}

/// Print a formatted summary table after a batch run.
fn print_summary(stats: &BatchStats, policy: Policy) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    for (label, count) in summary_rows(stats, policy) {
        eprintln!("    {:<22}{:>8}", label, count);
    }
    if stats.failed > 0 {
        eprintln!("    {:<22}{:>8}", "Failed:", stats.failed);
    }
    eprintln!("  ------------------------------------");
    eprintln!("    {:<22}{:>8}", "Total:", stats.succeeded + stats.failed);
    eprintln!("    {:<22}{:>7.1}s", "Duration:", stats.total_seconds);
    eprintln!("    {:<22}{:>7.2} checks/sec", "Rate:", stats.checks_per_second());
    eprintln!("  ====================================");
}
