//! The `semlens models` command for managing the ONNX model files.

use clap::{Args, Subcommand};
use semlens_core::Config;
use std::path::{Path, PathBuf};

/// Arguments for the `models` command.
#[derive(Args, Debug)]
pub struct ModelsArgs {
    #[command(subcommand)]
    pub command: ModelsCommand,
}

/// Subcommands for model management.
#[derive(Subcommand, Debug)]
pub enum ModelsCommand {
    /// Download the captioner (BLIP) and aligner (CLIP) exports and tokenizers
    Download,

    /// List installed model files
    List,

    /// Show model directory path
    Path,
}

/// One file of a model export on Hugging Face.
struct ModelFile {
    remote_path: &'static str,
    local_name: &'static str,
    approx: &'static str,
}

/// Which component a model serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Captioner,
    Aligner,
}

struct ModelSpec {
    component: Component,
    label: &'static str,
    repo: &'static str,
    files: &'static [ModelFile],
}

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        component: Component::Captioner,
        label: "BLIP captioner",
        repo: "Xenova/blip-image-captioning-base",
        files: &[
            ModelFile {
                remote_path: "onnx/vision_model.onnx",
                local_name: "vision_model.onnx",
                approx: "~345 MB",
            },
            ModelFile {
                remote_path: "onnx/text_decoder_model.onnx",
                local_name: "text_decoder.onnx",
                approx: "~615 MB",
            },
            ModelFile {
                remote_path: "tokenizer.json",
                local_name: "tokenizer.json",
                approx: "~700 KB",
            },
        ],
    },
    ModelSpec {
        component: Component::Aligner,
        label: "CLIP aligner",
        repo: "Xenova/clip-vit-base-patch32",
        files: &[
            ModelFile {
                remote_path: "onnx/vision_model.onnx",
                local_name: "vision_model.onnx",
                approx: "~352 MB",
            },
            ModelFile {
                remote_path: "onnx/text_model.onnx",
                local_name: "text_model.onnx",
                approx: "~254 MB",
            },
            ModelFile {
                remote_path: "tokenizer.json",
                local_name: "tokenizer.json",
                approx: "~2 MB",
            },
        ],
    },
];

fn component_dir(config: &Config, component: Component) -> PathBuf {
    match component {
        Component::Captioner => config.caption_model_dir(),
        Component::Aligner => config.alignment_model_dir(),
    }
}

// ── Reusable public API (used by both flag-based CLI and interactive module) ──

/// Install status of one model file.
pub struct FileStatus {
    pub name: &'static str,
    pub approx: &'static str,
    pub installed: bool,
}

/// Install status of one model.
pub struct ModelStatus {
    pub component: Component,
    pub label: &'static str,
    pub dir: PathBuf,
    pub files: Vec<FileStatus>,
}

impl ModelStatus {
    pub fn complete(&self) -> bool {
        self.files.iter().all(|f| f.installed)
    }
}

/// Check which model files are currently installed.
pub fn check_installed(config: &Config) -> Vec<ModelStatus> {
    MODELS
        .iter()
        .map(|spec| {
            let dir = component_dir(config, spec.component);
            let files = spec
                .files
                .iter()
                .map(|f| FileStatus {
                    name: f.local_name,
                    approx: f.approx,
                    installed: dir.join(f.local_name).exists(),
                })
                .collect();
            ModelStatus {
                component: spec.component,
                label: spec.label,
                dir,
                files,
            }
        })
        .collect()
}

/// True when every file of every model is present.
pub fn can_check(status: &[ModelStatus]) -> bool {
    status.iter().all(ModelStatus::complete)
}

/// Download the missing files of the given components. Skips files already on disk.
pub async fn download(
    components: &[Component],
    config: &Config,
    client: &reqwest::Client,
) -> anyhow::Result<()> {
    for spec in MODELS.iter().filter(|s| components.contains(&s.component)) {
        let dir = component_dir(config, spec.component);
        std::fs::create_dir_all(&dir)?;

        for file in spec.files {
            let dest = dir.join(file.local_name);
            if dest.exists() {
                tracing::info!("{} already exists at {:?}", file.local_name, dest);
                continue;
            }

            let url = format!(
                "https://huggingface.co/{}/resolve/main/{}",
                spec.repo, file.remote_path
            );
            tracing::info!("Downloading {} {} ({})...", spec.label, file.local_name, file.approx);
            tracing::info!("  Source: {}", url);
            tracing::info!("  Destination: {:?}", dest);

            download_file(client, &url, &dest).await?;

            let file_size = std::fs::metadata(&dest)?.len();
            tracing::info!(
                "  {} complete ({:.1} MB)",
                file.local_name,
                file_size as f64 / (1024.0 * 1024.0)
            );
        }
    }
    Ok(())
}

/// Download everything that is missing.
pub async fn download_all(config: &Config, client: &reqwest::Client) -> anyhow::Result<()> {
    download(&[Component::Captioner, Component::Aligner], config, client).await
}

/// Execute the models command.
pub async fn execute(args: ModelsArgs, config: Config) -> anyhow::Result<()> {
    match args.command {
        ModelsCommand::Download => {
            let client = reqwest::Client::new();
            download_all(&config, &client).await?;
            tracing::info!("All downloads complete.");
        }

        ModelsCommand::List => {
            let model_dir = config.model_dir();
            if !model_dir.exists() {
                println!("No models installed.");
                println!("Run `semlens models download` to download required models.");
                return Ok(());
            }

            println!("Installed models:");
            println!("  Directory: {}\n", model_dir.display());
            for model in check_installed(&config) {
                println!("  {} ({}):", model.label, model.dir.display());
                for file in &model.files {
                    let status = if file.installed {
                        "ready"
                    } else {
                        "not installed"
                    };
                    println!("    - {:24} {}", file.name, status);
                }
                println!();
            }
        }

        ModelsCommand::Path => {
            println!("{}", config.model_dir().display());
        }
    }

    Ok(())
}

/// Download a file from a URL, streaming to a `.part` file next to `dest`.
///
/// The partial file is renamed into place only after its size matches the
/// server's `Content-Length`.
async fn download_file(client: &reqwest::Client, url: &str, dest: &Path) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    let response = client
        .get(url)
        .send()
        .await?
        .error_for_status()
        .map_err(|e| anyhow::anyhow!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let partial = partial_path(dest);
    let mut file = tokio::fs::File::create(&partial).await?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = std::fs::remove_file(&partial);
                return Err(e.into());
            }
        };
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total_size {
            if downloaded % (50 * 1024 * 1024) < chunk.len() as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().await?;
    drop(file);

    if let Some(expected) = total_size {
        verify_size(&partial, expected)?;
    }
    std::fs::rename(&partial, dest)?;
    Ok(())
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// Verify a downloaded file's size.
///
/// On mismatch, removes the truncated file so the next run re-downloads.
fn verify_size(path: &Path, expected: u64) -> anyhow::Result<()> {
    let actual = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Cannot stat {}: {e}", path.display()))?
        .len();

    if actual != expected {
        let _ = std::fs::remove_file(path);
        anyhow::bail!(
            "Size mismatch for {}:\n  expected: {} bytes\n  actual:   {} bytes\n\
             Incomplete file removed. Try downloading again.",
            path.display(),
            expected,
            actual
        );
    }

    tracing::debug!("  Size verified: {} bytes", actual);
    Ok(())
}
