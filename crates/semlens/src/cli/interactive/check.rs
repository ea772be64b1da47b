//! Guided check flow: image path, description, spinner, pretty report.

use std::path::PathBuf;

use console::Style;
use dialoguer::{Confirm, Input};
use semlens_core::{CheckRequest, Lens, LensError, PipelineError};

use super::theme::semlens_theme;
use crate::cli::check::spinner;
use crate::cli::report;

/// Prompt for one image-text pair and show the verdict.
///
/// The `lens` is shared across checks so models load once per session.
pub async fn guided_check(lens: &Lens) -> anyhow::Result<()> {
    let theme = semlens_theme();
    let warn = Style::new().for_stderr().yellow();

    if !lens.models_installed() && !super::models::offer_download(lens.config()).await? {
        return Ok(());
    }

    loop {
        let Some(raw_path) = super::handle_interrupt(
            Input::<String>::with_theme(&theme)
                .with_prompt("Path to image")
                .allow_empty(true)
                .interact_text(),
        )?
        else {
            return Ok(());
        };

        let Some(text) = super::handle_interrupt(
            Input::<String>::with_theme(&theme)
                .with_prompt("Description to verify")
                .allow_empty(true)
                .interact_text(),
        )?
        else {
            return Ok(());
        };

        let request = CheckRequest::new(expand_path(&raw_path), text.trim());
        if request.validate().is_err() {
            eprintln!(
                "  {}",
                warn.apply_to("Please provide both an image and a text description.")
            );
            continue;
        }

        let progress = spinner("Analyzing image...");
        let result = lens.check(&request).await;
        progress.finish_and_clear();

        match result {
            Ok(report) => println!("{}", report::render(&report)),
            Err(LensError::Pipeline(PipelineError::FileNotFound(path))) => {
                eprintln!(
                    "  {}",
                    warn.apply_to(format!("Image not found: {}", path.display()))
                );
                continue;
            }
            Err(e) => {
                let err = Style::new().for_stderr().red();
                eprintln!("  {} {e}", err.apply_to("✗"));
            }
        }

        let again = super::handle_interrupt(
            Confirm::with_theme(&theme)
                .with_prompt("Check another image?")
                .default(true)
                .interact(),
        )?;
        if again != Some(true) {
            return Ok(());
        }
    }
}

/// Expand `~` and strip the quotes terminals add when a file is dragged in.
fn expand_path(raw: &str) -> PathBuf {
    let trimmed = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if trimmed.is_empty() {
        return PathBuf::new();
    }
    PathBuf::from(shellexpand::tilde(trimmed).into_owned())
}
