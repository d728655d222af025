use crate::config::InferenceConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRole {
    /// The person being dressed.
    #[serde(rename = "front")]
    Subject,
    Garment,
    /// Single image a 3D model is generated from.
    Source,
}

impl InputRole {
    /// The roles a try-on submission requires.
    pub const ALL: [InputRole; 2] = [InputRole::Subject, InputRole::Garment];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subject => "front",
            Self::Garment => "garment",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for InputRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct InputImage {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InputImage {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for InputImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputImage")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Request-scoped binary inputs, one per role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceInputs {
    images: BTreeMap<InputRole, InputImage>,
}

impl InferenceInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: InputRole, image: InputImage) -> Self {
        self.insert(role, image);
        self
    }

    pub fn insert(&mut self, role: InputRole, image: InputImage) -> Option<InputImage> {
        self.images.insert(role, image)
    }

    pub fn get(&self, role: InputRole) -> Option<&InputImage> {
        self.images.get(&role)
    }

    pub fn require(&self, role: InputRole) -> Result<&InputImage> {
        self.get(role).ok_or_else(|| {
            Error::invalid_upload(
                "Missing files. Please upload both front view and garment images.",
            )
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InputRole, &InputImage)> {
        self.images.iter()
    }
}

/// Scalar arguments forwarded positionally to the remote procedure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceParams {
    #[serde(default)]
    pub description: String,
    pub auto_mask: bool,
    pub auto_crop: bool,
    pub denoise_steps: u32,
    pub seed: i64,
}

impl InferenceParams {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            description: String::new(),
            auto_mask: config.auto_mask,
            auto_crop: config.auto_crop,
            denoise_steps: config.denoise_steps,
            seed: config.seed,
        }
    }
}

/// A base64 string holding exactly one image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedResult(String);

impl NormalizedResult {
    /// Accepts only non-empty strings from the base64 alphabet plus padding.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if is_base64(&value) {
            Ok(Self(value))
        } else {
            Err(Error::InvalidResultEncoding)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn is_base64(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
}

/// Output handed to the persistence/response layer.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedImage {
    pub data: NormalizedResult,
    pub content_type: String,
    pub generated_at: DateTime<Utc>,
}

impl GeneratedImage {
    pub fn new(data: NormalizedResult) -> Self {
        Self {
            data,
            content_type: "image/png".to_string(),
            generated_at: Utc::now(),
        }
    }

    pub fn suggested_filename(&self) -> String {
        format!("generated-{}.png", self.generated_at.timestamp_millis())
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.content_type, self.data)
    }
}
