//! The long-lived service object request handlers share.
//!
//! Constructed once at startup; owns the request gate and the inference
//! client so their state lives exactly as long as the service.

mod validation;

pub use validation::{content_type_for_path, validate_upload};

use crate::{
    Error, Result,
    config::{Config, UploadLimits},
    gate::{CallerId, PayloadSignature, RequestGate},
    inference::{
        GeneratedImage, InferenceClient, InferenceInputs, InferenceParams, InputRole,
        Model3dClient, ModelAssets,
    },
};
use tracing::{error, info};

pub struct TryOnService {
    gate: RequestGate,
    client: InferenceClient,
    limits: UploadLimits,
    default_params: InferenceParams,
    model3d: Option<Model3dClient>,
}

impl TryOnService {
    pub fn new(config: &Config) -> Result<Self> {
        let client = InferenceClient::new(config)?;
        let service = Self::with_client(config, client);
        Ok(match Model3dClient::new(config)? {
            Some(model3d) => service.with_model3d(model3d),
            None => service,
        })
    }

    pub fn with_client(config: &Config, client: InferenceClient) -> Self {
        Self {
            gate: RequestGate::new(&config.gate),
            client,
            limits: config.uploads.clone(),
            default_params: InferenceParams::from_config(&config.inference),
            model3d: None,
        }
    }

    pub fn with_model3d(mut self, model3d: Model3dClient) -> Self {
        self.model3d = Some(model3d);
        self
    }

    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    pub async fn process(
        &self,
        caller: &CallerId,
        inputs: &InferenceInputs,
    ) -> Result<GeneratedImage> {
        self.process_with(caller, inputs, &self.default_params).await
    }

    /// Gate, validate, infer. The caller's gate entry is released on every
    /// exit path when the ticket goes out of scope.
    pub async fn process_with(
        &self,
        caller: &CallerId,
        inputs: &InferenceInputs,
        params: &InferenceParams,
    ) -> Result<GeneratedImage> {
        let signature = PayloadSignature::from_inputs(inputs);
        let ticket = self
            .gate
            .try_acquire(caller, signature)
            .map_err(Error::Rejected)?;

        info!(caller = %ticket.caller(), "Received try-on submission");

        for role in InputRole::ALL {
            validate_upload(inputs.require(role)?, &self.limits)?;
        }

        let result = self.client.submit(inputs, params).await.map_err(|e| {
            error!(caller = %caller, "Image processing failed: {}", e);
            e
        })?;

        let image = GeneratedImage::new(result);
        info!(
            caller = %caller,
            filename = %image.suggested_filename(),
            "Try-on image generated"
        );
        Ok(image)
    }

    /// Administrative reset of all in-flight tracking. Authorization is the
    /// caller's responsibility.
    pub fn clear_pending(&self) -> usize {
        self.gate.clear()
    }

    /// Turns an image URL or data URL into 3D model files. Not gated.
    pub async fn generate_model(&self, source: &str) -> Result<ModelAssets> {
        if source.trim().is_empty() {
            return Err(Error::invalid_upload("Missing imageUrl parameter"));
        }
        let model3d = self
            .model3d
            .as_ref()
            .ok_or_else(|| Error::config("3D model generation is not configured"))?;

        info!("Received 3D model generation request");
        model3d.generate(source).await
    }

    /// Fetches a source image by URL with the download retry policy.
    pub async fn download_source(&self, url: &str) -> Result<Vec<u8>> {
        self.client.downloader().fetch(url).await
    }
}
