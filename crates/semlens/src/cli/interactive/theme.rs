//! Dialoguer theme and entry banner for interactive mode.

use console::{style, Style};
use dialoguer::theme::ColorfulTheme;

/// A `ColorfulTheme` with a cyan `?` prompt and `▸` cursor; all styling targets stderr.
pub fn semlens_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_prefix: style("?".to_string()).for_stderr().cyan(),
        prompt_style: Style::new().for_stderr().bold(),
        prompt_suffix: style("›".to_string()).for_stderr().bright().black(),
        active_item_prefix: style("▸".to_string()).for_stderr().cyan(),
        active_item_style: Style::new().for_stderr().cyan(),
        success_prefix: style("✓".to_string()).for_stderr().green(),
        success_suffix: style("·".to_string()).for_stderr().bright().black(),
        error_prefix: style("✗".to_string()).for_stderr().red(),
        error_style: Style::new().for_stderr().red(),
        values_style: Style::new().for_stderr().green(),
        ..ColorfulTheme::default()
    }
}

fn banner_lines() -> Vec<String> {
    let version_line = format!("Semantic Lens v{}", semlens_core::VERSION);
    let tagline = "Does this description match this picture?";
    let inner_width = tagline.chars().count() + 4;

    vec![
        format!("  ╔{:═<width$}╗", "", width = inner_width),
        format!("  ║{:^width$}║", version_line, width = inner_width),
        format!("  ║{:^width$}║", tagline, width = inner_width),
        format!("  ╚{:═<width$}╝", "", width = inner_width),
    ]
}

/// Prints the banner to stderr, leaving stdout for reports.
pub fn print_banner() {
    let cyan = Style::new().for_stderr().cyan();
    eprintln!();
    for line in banner_lines() {
        eprintln!("{}", cyan.apply_to(line));
    }
    eprintln!();
}
