use tempfile::TempDir;
use tokio::fs;
use tryon_gateway::{
    InferenceInputs, InputImage, InputRole, Result,
    config::{
        Config, DownloadConfig, GateConfig, InferenceConfig, LogsConfig, Model3dConfig,
        RetryConfig, UploadLimits,
    },
};

/// Create a test configuration with the documented defaults and fast downloads
pub fn create_test_config(base_url: &str) -> Config {
    Config {
        inference: InferenceConfig {
            base_url: base_url.to_string(),
            access_token: Some("hf_test_token".to_string()),
            endpoint: "/tryon".to_string(),
            api_prefix: "/gradio_api".to_string(),
            request_timeout_ms: 60_000,
            session_max_age_secs: 300,
            denoise_steps: 40,
            max_denoise_steps: 40,
            seed: -1,
            auto_mask: true,
            auto_crop: true,
        },
        retry: RetryConfig {
            max_attempts: 3,
            base_delay_ms: 5_000,
            max_delay_ms: 30_000,
        },
        download: DownloadConfig {
            max_attempts: 3,
            retry_delay_ms: 10,
            max_content_length: 10 * 1024 * 1024,
            user_agent: "tryon-gateway-tests".to_string(),
        },
        gate: GateConfig {
            duplicate_window_ms: 10_000,
            cooldown_ms: 5_000,
        },
        uploads: UploadLimits::default(),
        logs: LogsConfig {
            level: "debug".to_string(),
        },
        model3d: None,
    }
}

/// Same as [`create_test_config`] with backoff shrunk for real-time tests
pub fn create_fast_config(base_url: &str) -> Config {
    let mut config = create_test_config(base_url);
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 20;
    config.inference.request_timeout_ms = 5_000;
    config
}

/// [`create_fast_config`] with image-to-3D generation pointed at `base_url`
pub fn create_model3d_config(base_url: &str) -> Config {
    let mut config = create_fast_config(base_url);
    config.model3d = Some(Model3dConfig {
        base_url: base_url.to_string(),
        endpoint: "/generate3dv2".to_string(),
        api_prefix: "/gradio_api".to_string(),
        remove_background: false,
        seed: -1,
        generate_video: true,
        refine_multiview: false,
        expansion_weight: -1,
        mesh_initialization: "std".to_string(),
    });
    config
}

pub fn sample_inputs() -> InferenceInputs {
    sample_inputs_with(b"front-bytes", b"garment-bytes")
}

pub fn sample_inputs_with(front: &[u8], garment: &[u8]) -> InferenceInputs {
    InferenceInputs::new()
        .with(
            InputRole::Subject,
            InputImage::new("front.png", "image/png", front.to_vec()),
        )
        .with(
            InputRole::Garment,
            InputImage::new("garment.jpg", "image/jpeg", garment.to_vec()),
        )
}

/// Create a temporary directory for test files
pub fn create_temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test config YAML file
pub async fn create_test_config_file(dir: &TempDir, content: &str) -> Result<String> {
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, content).await?;
    Ok(config_path.to_string_lossy().to_string())
}

/// Sample configuration YAML for testing
pub const SAMPLE_CONFIG_YAML: &str = r#"
inference:
  base_url: "https://example-tryon.hf.space/"
  access_token: "hf_from_file"
  request_timeout_ms: 30000
  denoise_steps: 50
  max_denoise_steps: 40
  seed: 42

retry:
  max_attempts: 4
  base_delay_ms: 1000

gate:
  cooldown_ms: 2000

uploads:
  max_file_size: 1048576
  allowed_mime_types: ["image/png"]

logs:
  level: "debug"
"#;
