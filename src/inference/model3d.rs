//! Image-to-3D generation against a second remote space.
//!
//! One attempt per request: the source image is resolved (data URL or
//! download), uploaded, and the procedure's file outputs are mapped to a
//! `.glb` mesh and an `.mp4` preview.

use super::download::Downloader;
use super::remote::GradioConnector;
use super::session::{RemoteSession, SessionCache, SessionConnector};
use super::types::{InputImage, InputRole};
use crate::{
    Error, Result,
    config::{Config, Model3dConfig},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Positional arguments of the 3D procedure after the image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model3dParams {
    pub remove_background: bool,
    pub seed: i64,
    pub generate_video: bool,
    pub refine_multiview: bool,
    pub expansion_weight: i64,
    pub mesh_initialization: String,
}

impl Model3dParams {
    pub fn from_config(config: &Model3dConfig) -> Self {
        Self {
            remove_background: config.remove_background,
            seed: config.seed,
            generate_video: config.generate_video,
            refine_multiview: config.refine_multiview,
            expansion_weight: config.expansion_weight,
            mesh_initialization: config.mesh_initialization.clone(),
        }
    }

    fn arguments(&self, image: Value) -> Vec<Value> {
        vec![
            image,
            Value::Bool(self.remove_background),
            Value::from(self.seed),
            Value::Bool(self.generate_video),
            Value::Bool(self.refine_multiview),
            Value::from(self.expansion_weight),
            Value::String(self.mesh_initialization.clone()),
        ]
    }
}

/// Download URLs of the generated files. At least one is present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAssets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
}

/// Where the source image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Inline(Vec<u8>),
    Remote(String),
}

impl ImageSource {
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.starts_with("data:image/") {
            let (_, encoded) = source
                .split_once(',')
                .ok_or_else(|| Error::invalid_upload("Malformed image data URL"))?;
            let bytes = STANDARD
                .decode(encoded)
                .map_err(|e| Error::invalid_upload(format!("Invalid base64 image data: {}", e)))?;
            Ok(Self::Inline(bytes))
        } else if source.starts_with("http://") || source.starts_with("https://") {
            Ok(Self::Remote(source.to_string()))
        } else {
            Err(Error::invalid_upload(
                "Image source must be an http(s) URL or an image data URL",
            ))
        }
    }
}

pub struct Model3dClient {
    sessions: SessionCache,
    downloader: Downloader,
    endpoint: String,
    params: Model3dParams,
    request_timeout: Duration,
    predict_timeout: Duration,
}

impl Model3dClient {
    /// `None` when the configuration has no `model3d` section.
    pub fn new(config: &Config) -> Result<Option<Self>> {
        let Some(model3d) = &config.model3d else {
            return Ok(None);
        };
        let connector = GradioConnector::for_model3d(model3d, &config.inference)?;
        Self::with_connector(config, Arc::new(connector)).map(Some)
    }

    pub fn with_connector(config: &Config, connector: Arc<dyn SessionConnector>) -> Result<Self> {
        let model3d = config
            .model3d
            .as_ref()
            .ok_or_else(|| Error::config("model3d section is missing"))?;
        let inference = &config.inference;

        Ok(Self {
            sessions: SessionCache::new(
                connector,
                inference.session_max_age(),
                inference.request_timeout(),
            ),
            downloader: Downloader::new(&config.download, inference.request_timeout())?,
            endpoint: model3d.endpoint.clone(),
            params: Model3dParams::from_config(model3d),
            request_timeout: inference.request_timeout(),
            predict_timeout: inference.predict_timeout(),
        })
    }

    /// Generates a mesh (and optionally a preview video) from one image.
    pub async fn generate(&self, source: &str) -> Result<ModelAssets> {
        let bytes = match ImageSource::parse(source)? {
            ImageSource::Inline(bytes) => {
                debug!("Using inline image data, {} bytes", bytes.len());
                bytes
            }
            ImageSource::Remote(url) => self.downloader.fetch(&url).await?,
        };
        if bytes.is_empty() {
            return Err(Error::invalid_upload("Source image is empty"));
        }
        let image = InputImage::new("source.png", "image/png", bytes);

        let session = self.sessions.get().await?;
        match self.run(session.as_ref(), &image).await {
            Ok(assets) => {
                info!(?assets, "3D model generated");
                Ok(assets)
            }
            Err(e) => {
                warn!("3D model generation failed: {}", e);
                if !e.is_terminal() {
                    self.sessions.invalidate().await;
                }
                Err(e)
            }
        }
    }

    async fn run(&self, session: &dyn RemoteSession, image: &InputImage) -> Result<ModelAssets> {
        let upload = session.upload(InputRole::Source, image);
        let handle = match timeout(self.request_timeout, upload).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::UploadTimeout {
                    role: InputRole::Source,
                    timeout_ms: self.request_timeout.as_millis() as u64,
                });
            }
        };

        let arguments = self.params.arguments(serde_json::to_value(handle)?);
        info!(session_id = session.session_id(), "Sending request to {}", self.endpoint);
        let prediction = match timeout(
            self.predict_timeout,
            session.predict(&self.endpoint, arguments),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::RemoteTimeout {
                    timeout_ms: self.predict_timeout.as_millis() as u64,
                });
            }
        };

        extract_assets(session, &prediction.data)
    }
}

/// Maps file outputs by extension. Items without a path are skipped; a later
/// file of the same kind replaces an earlier one.
fn extract_assets(session: &dyn RemoteSession, data: &Value) -> Result<ModelAssets> {
    let Value::Array(items) = data else {
        return Err(Error::UnrecognizedResultShape);
    };

    let mut assets = ModelAssets::default();
    for item in items {
        let Some(path) = item.get("path").and_then(Value::as_str) else {
            continue;
        };
        let url = item
            .get("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| session.file_url(path));

        if path.ends_with(".glb") {
            assets.model = Some(url);
        } else if path.ends_with(".mp4") {
            assets.video = Some(url);
        } else {
            debug!("Skipping unsupported output file {}", path);
        }
    }

    if assets.model.is_none() && assets.video.is_none() {
        return Err(Error::UnrecognizedResultShape);
    }
    Ok(assets)
}
