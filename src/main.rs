use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::{Path, PathBuf};
use tracing::info;
use tryon_gateway::{
    CallerId, InferenceInputs, InputImage, InputRole, TryOnService, config,
    service::content_type_for_path,
};

/// Validates that a log level string is valid
fn validate_log_level(level: &str) -> Result<()> {
    level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .map_err(|_| {
            anyhow::anyhow!(
                "Invalid log level: '{}'. Valid levels: error, warn, info, debug, trace",
                level
            )
        })?;
    Ok(())
}

fn usage() -> ! {
    eprintln!("Usage: tryon <front-image> <garment-image> [output.png]");
    eprintln!("       tryon model3d <image-url>");
    std::process::exit(2);
}

async fn read_input(path: &Path) -> Result<InputImage> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    Ok(InputImage::new(file_name, content_type_for_path(path), bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        usage();
    }

    // Load configuration first (before logging setup)
    let config = match config::load().await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // Environment variable overrides config
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logs.level.clone());

    if let Err(e) = validate_log_level(&log_level) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .json()
        .init();

    info!("Starting try-on client with log level: {}", log_level);

    let service = TryOnService::new(&config)?;

    if args[0] == "model3d" {
        let assets = service.generate_model(&args[1]).await?;
        println!("{}", serde_json::to_string_pretty(&assets)?);
        return Ok(());
    }

    let (front, garment) = (PathBuf::from(&args[0]), PathBuf::from(&args[1]));
    let caller = CallerId::new(std::env::var("TRYON_CALLER").unwrap_or_else(|_| "cli".to_string()));

    let inputs = InferenceInputs::new()
        .with(InputRole::Subject, read_input(&front).await?)
        .with(InputRole::Garment, read_input(&garment).await?);

    let image = service.process(&caller, &inputs).await?;

    let output = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(image.suggested_filename()));
    let bytes = STANDARD
        .decode(image.data.as_str())
        .context("Generated image is not decodable base64")?;
    tokio::fs::write(&output, bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Wrote generated image to {}", output.display());
    Ok(())
}
