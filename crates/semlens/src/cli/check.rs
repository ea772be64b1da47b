//! The `semlens check` command: verify one description against one image.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use semlens_core::{CheckRequest, Config, ConsistencyReport, Lens, OutputWriter};

use super::report;
use super::types::{CheckOptions, ReportFormat};

/// Arguments for the `check` command.
#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Image file (JPEG or PNG; GIF, WebP and BMP also work)
    pub image: PathBuf,

    /// Description to verify against the image
    pub text: String,

    #[command(flatten)]
    pub options: CheckOptions,

    /// Report format (defaults to `[output] format`)
    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Spinner shown on stderr while a check runs.
pub fn spinner(message: &str) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Fail early with the download hint when model files are missing.
pub fn ensure_models(lens: &Lens) -> anyhow::Result<()> {
    if !lens.models_installed() {
        anyhow::bail!(
            "Models not installed in {}.\nRun `semlens models download` first.",
            lens.config().model_dir().display()
        );
    }
    Ok(())
}

/// Write a report in the chosen format to stdout or `output`.
pub fn emit(
    report: &ConsistencyReport,
    format: ReportFormat,
    pretty_json: bool,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };

    match format.machine() {
        Some(machine) => {
            let mut writer = OutputWriter::new(sink, machine, pretty_json);
            writer.write(report)?;
            writer.finish()?;
        }
        None => {
            let mut sink = sink;
            let text = match output {
                // Files get plain text.
                Some(_) => console::strip_ansi_codes(&report::render(report)).to_string(),
                None => report::render(report),
            };
            sink.write_all(text.as_bytes())?;
            sink.flush()?;
        }
    }

    if let Some(path) = output {
        tracing::info!("Report written to {:?}", path);
    }
    Ok(())
}

/// Execute the check command.
pub async fn execute(args: CheckArgs, mut config: Config) -> anyhow::Result<()> {
    args.options.apply(&mut config, None)?;
    let format = args.format.unwrap_or_else(|| ReportFormat::from_config(&config));
    let pretty_json = config.output.pretty;

    let request = CheckRequest::new(&args.image, &args.text);
    request.validate()?;

    let lens = Lens::new(config);
    ensure_models(&lens)?;

    let progress = spinner("Analyzing image...");
    let result = lens.check(&request).await;
    progress.finish_and_clear();

    emit(&result?, format, pretty_json, args.output.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: CheckArgs,
    }

    #[test]
    fn test_check_args_defaults() {
        let cli = TestCli::parse_from(["test", "cat.jpg", "a cat on a sofa"]);
        assert_eq!(cli.args.image, PathBuf::from("cat.jpg"));
        assert_eq!(cli.args.text, "a cat on a sofa");
        assert!(cli.args.format.is_none());
        assert!(cli.args.options.policy.is_none());
        assert!(cli.args.output.is_none());
    }

    #[test]
    fn test_check_args_flags() {
        let cli = TestCli::parse_from([
            "test",
            "cat.jpg",
            "a cat",
            "--policy",
            "dual",
            "--preset",
            "script",
            "--consensus",
            "4",
            "--format",
            "jsonl",
            "-o",
            "out.jsonl",
        ]);
        assert_eq!(cli.args.options.policy, Some(super::super::types::PolicyArg::Dual));
        assert_eq!(cli.args.options.consensus, Some(4));
        assert_eq!(cli.args.format, Some(ReportFormat::Jsonl));
        assert_eq!(cli.args.output, Some(PathBuf::from("out.jsonl")));
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_model_check() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();
        let args = TestCli::parse_from(["test", "cat.jpg", "  "]).args;

        let err = execute(args, config).await.unwrap_err();
        assert!(err.to_string().contains("both an image and a text description"));
    }

    #[tokio::test]
    async fn test_missing_models_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();
        let args = TestCli::parse_from(["test", "cat.jpg", "a cat"]).args;

        let err = execute(args, config).await.unwrap_err();
        assert!(err.to_string().contains("semlens models download"));
    }
}
