use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub inference: InferenceConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub uploads: UploadLimits,
    #[serde(default)]
    pub logs: LogsConfig,
    /// Image-to-3D generation. Disabled when absent.
    #[serde(default)]
    pub model3d: Option<Model3dConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Used when the remote config does not advertise its own prefix.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
    #[serde(default = "default_denoise_steps")]
    pub denoise_steps: u32,
    #[serde(default = "default_denoise_steps")]
    pub max_denoise_steps: u32,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default = "default_true")]
    pub auto_mask: bool,
    #[serde(default = "default_true")]
    pub auto_crop: bool,
}

/// A separate remote space that turns one image into a mesh and a preview
/// video. Shares the access token and timeouts of `inference`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model3dConfig {
    pub base_url: String,
    #[serde(default = "default_model3d_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default)]
    pub remove_background: bool,
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub generate_video: bool,
    #[serde(default)]
    pub refine_multiview: bool,
    #[serde(default = "default_expansion_weight")]
    pub expansion_weight: i64,
    #[serde(default = "default_mesh_initialization")]
    pub mesh_initialization: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_download_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadLimits {
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl InferenceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Predictions are heavier than the handshake and get twice the budget.
    pub fn predict_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.saturating_mul(2))
    }

    pub fn session_max_age(&self) -> Duration {
        Duration::from_secs(self.session_max_age_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl DownloadConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl GateConfig {
    pub fn duplicate_window(&self) -> Duration {
        Duration::from_millis(self.duplicate_window_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_download_delay_ms(),
            max_content_length: default_max_content_length(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: default_duplicate_window_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_endpoint() -> String {
    "/tryon".to_string()
}

fn default_api_prefix() -> String {
    "/gradio_api".to_string()
}

fn default_model3d_endpoint() -> String {
    "/generate3dv2".to_string()
}

fn default_expansion_weight() -> i64 {
    -1
}

fn default_mesh_initialization() -> String {
    "std".to_string()
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_session_max_age_secs() -> u64 {
    300
}

fn default_denoise_steps() -> u32 {
    40
}

fn default_seed() -> i64 {
    -1
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_download_delay_ms() -> u64 {
    1_000
}

fn default_max_content_length() -> u64 {
    10 * 1024 * 1024
}

fn default_user_agent() -> String {
    format!("tryon-gateway/{}", env!("CARGO_PKG_VERSION"))
}

fn default_duplicate_window_ms() -> u64 {
    10_000
}

fn default_cooldown_ms() -> u64 {
    5_000
}

fn default_max_file_size() -> u64 {
    5 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/jpg", "image/png"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}
