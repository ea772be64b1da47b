//! Guided model management: show install status and offer downloads.

use crate::cli::models::{check_installed, download, Component, ModelStatus};
use console::Style;
use dialoguer::Select;
use semlens_core::Config;

use super::theme::semlens_theme;

/// Show installed model status and offer download options.
pub async fn guided_models(config: &Config) -> anyhow::Result<()> {
    let theme = semlens_theme();

    loop {
        let status = check_installed(config);
        print_status(&status, config);

        let (items, actions) = menu_for(&status);

        let selection = Select::with_theme(&theme)
            .with_prompt("Model management")
            .items(&items)
            .default(0)
            .interact_opt()?;

        let Some(idx) = selection else {
            break;
        };
        match &actions[idx] {
            ModelAction::Download(components) => {
                let client = reqwest::Client::new();
                download(components, config, &client).await?;
                eprintln!();
                let done = Style::new().for_stderr().green();
                eprintln!("{}", done.apply_to("  Downloads complete."));
                eprintln!();
            }
            ModelAction::ShowPath => {
                eprintln!("  {}", config.model_dir().display());
                eprintln!();
            }
            ModelAction::Back => break,
        }
    }

    Ok(())
}

/// Download every missing model after the user confirms. Returns true when
/// all models are installed afterwards.
pub async fn offer_download(config: &Config) -> anyhow::Result<bool> {
    let theme = semlens_theme();
    let warn = Style::new().for_stderr().yellow();
    eprintln!("  {}", warn.apply_to("Required models not installed."));

    let install = super::handle_interrupt(
        dialoguer::Confirm::with_theme(&theme)
            .with_prompt("Download models now? (about 1.6 GB)")
            .default(true)
            .interact(),
    )?;
    if install != Some(true) {
        return Ok(false);
    }

    let client = reqwest::Client::new();
    download(&[Component::Captioner, Component::Aligner], config, &client).await?;
    Ok(crate::cli::models::can_check(&check_installed(config)))
}

enum ModelAction {
    Download(Vec<Component>),
    ShowPath,
    Back,
}

fn menu_for(status: &[ModelStatus]) -> (Vec<String>, Vec<ModelAction>) {
    let mut items = Vec::new();
    let mut actions = Vec::new();

    let missing: Vec<&ModelStatus> = status.iter().filter(|m| !m.complete()).collect();
    for model in &missing {
        items.push(format!("Download {}", model.label));
        actions.push(ModelAction::Download(vec![model.component]));
    }
    if missing.len() > 1 {
        items.push("Download all models".to_string());
        actions.push(ModelAction::Download(
            missing.iter().map(|m| m.component).collect(),
        ));
    }

    items.push("Show model directory".to_string());
    actions.push(ModelAction::ShowPath);
    items.push("Back".to_string());
    actions.push(ModelAction::Back);

    (items, actions)
}

fn print_status(status: &[ModelStatus], config: &Config) {
    let ok = Style::new().for_stderr().green();
    let missing = Style::new().for_stderr().red();
    let dim = Style::new().for_stderr().dim();

    eprintln!();
    eprintln!(
        "  {}",
        dim.apply_to(format!("Model directory: {}", config.model_dir().display()))
    );

    for model in status {
        eprintln!();
        eprintln!("  {}", Style::new().for_stderr().bold().apply_to(model.label));
        for file in &model.files {
            if file.installed {
                eprintln!(
                    "  {} {:<24} {}",
                    ok.apply_to("✓"),
                    file.name,
                    dim.apply_to(file.approx)
                );
            } else {
                eprintln!(
                    "  {} {:<24} {}",
                    missing.apply_to("✗"),
                    file.name,
                    dim.apply_to("not installed")
                );
            }
        }
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_offers_all_when_everything_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.general.model_dir = dir.path().to_path_buf();

        let (items, actions) = menu_for(&check_installed(&config));
        assert_eq!(items.len(), 5);
        assert_eq!(items[2], "Download all models");
        assert!(matches!(&actions[2], ModelAction::Download(c) if c.len() == 2));
        assert!(matches!(actions.last(), Some(ModelAction::Back)));
    }
}
