//! Interactive mode: the menu shown for bare `semlens` on a terminal.
//!
//! Each menu entry delegates to the same code the subcommands use. One
//! [`Lens`] lives for the whole session, so models load on the first check
//! and stay resident afterwards.

pub mod check;
pub mod models;
pub mod theme;

use console::Style;
use dialoguer::Select;
use semlens_core::{Config, Lens};
use std::path::Path;

/// Convert a dialoguer result into `Ok(Some(value))` on success, `Ok(None)` on
/// interrupt (Ctrl+C / terminal disconnect), and `Err` for other I/O failures.
fn handle_interrupt<T>(result: dialoguer::Result<T>) -> anyhow::Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(dialoguer::Error::IO(e)) if e.kind() == std::io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}

const MENU_ITEMS: &[&str] = &[
    "Check an image",
    "Manage models",
    "Show configuration",
    "Exit",
];

/// Entry point for interactive mode.
pub async fn run(config: Config, config_path: &Path) -> anyhow::Result<()> {
    theme::print_banner();

    let theme = theme::semlens_theme();
    let lens = Lens::new(config);

    loop {
        let selection = Select::with_theme(&theme)
            .with_prompt("What would you like to do?")
            .items(MENU_ITEMS)
            .default(0)
            .interact_opt()?;

        match selection {
            Some(0) => check::guided_check(&lens).await?,
            Some(1) => models::guided_models(lens.config()).await?,
            Some(2) => show_config(lens.config(), config_path)?,
            _ => break, // Exit or Ctrl+C / Esc
        }
    }

    Ok(())
}

/// Summary of the settings that shape a check, plus the full TOML on request.
fn show_config(config: &Config, config_path: &Path) -> anyhow::Result<()> {
    let theme = theme::semlens_theme();
    let dim = Style::new().for_stderr().dim();
    let cyan = Style::new().for_stderr().cyan();
    let label = Style::new().for_stderr().bold();

    loop {
        eprintln!();
        eprintln!("  {}", cyan.apply_to("Current configuration:"));
        eprintln!();

        let path_note = if config_path.exists() {
            "(exists)"
        } else {
            "(using defaults)"
        };
        eprintln!(
            "    {:<20} {} {}",
            label.apply_to("Config file:"),
            config_path.display(),
            dim.apply_to(path_note)
        );
        eprintln!(
            "    {:<20} {}",
            label.apply_to("Model dir:"),
            config.model_dir().display()
        );
        eprintln!(
            "    {:<20} {} / {}",
            label.apply_to("Models:"),
            config.caption.model,
            config.alignment.model
        );
        eprintln!(
            "    {:<20} {}",
            label.apply_to("Decoding:"),
            config.caption.decoding()
        );
        let thresholds = config.scoring.thresholds();
        eprintln!(
            "    {:<20} {} (upper {}, lower {})",
            label.apply_to("Policy:"),
            config.scoring.policy,
            thresholds.upper,
            thresholds.lower
        );
        eprintln!(
            "    {:<20} {}",
            label.apply_to("Consensus:"),
            if config.consensus.enabled {
                format!(
                    "{} samples, {} votes",
                    config.consensus.samples, config.consensus.min_votes
                )
            } else {
                "disabled".to_string()
            }
        );
        eprintln!();

        let items = &["View full config (TOML)", "Show config file path", "Back"];
        let selection = Select::with_theme(&theme)
            .with_prompt("Configuration")
            .items(items)
            .default(0)
            .interact_opt()?;

        match selection {
            Some(0) => match config.to_toml() {
                Ok(toml) => {
                    eprintln!();
                    eprintln!("{}", dim.apply_to("─".repeat(50)));
                    eprintln!("{toml}");
                    eprintln!("{}", dim.apply_to("─".repeat(50)));
                    eprintln!();
                }
                Err(e) => {
                    let err = Style::new().for_stderr().red();
                    eprintln!("  {} Failed to serialize config: {e}", err.apply_to("✗"));
                    eprintln!();
                }
            },
            Some(1) => {
                eprintln!();
                eprintln!("  {}", config_path.display());
                eprintln!();
            }
            _ => break,
        }
    }

    Ok(())
}
