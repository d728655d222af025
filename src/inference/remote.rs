//! HTTP transport for Gradio-style inference spaces.
//!
//! A session is a config handshake plus a client-side session hash. Files are
//! uploaded first and referenced by path; a prediction is queued with
//! `POST /call/<endpoint>` and its outcome read from the event stream at
//! `GET /call/<endpoint>/<event_id>`.

use super::session::{FileHandle, FileMeta, Prediction, RemoteSession, SessionConnector};
use super::types::{InputImage, InputRole};
use crate::{
    Error, Result,
    config::{InferenceConfig, Model3dConfig},
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct GradioConnector {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
    default_api_prefix: String,
}

impl GradioConnector {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        Self::build(config, &config.base_url, &config.api_prefix)
    }

    /// Connector for the image-to-3D space, reusing the try-on token and timeouts.
    pub fn for_model3d(model3d: &Model3dConfig, inference: &InferenceConfig) -> Result<Self> {
        Self::build(inference, &model3d.base_url, &model3d.api_prefix)
    }

    fn build(inference: &InferenceConfig, base_url: &str, api_prefix: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(inference.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: inference
                .access_token
                .clone()
                .filter(|token| !token.trim().is_empty()),
            default_api_prefix: normalize_path(api_prefix),
        })
    }
}

#[derive(Debug, Deserialize)]
struct EventHandle {
    event_id: String,
}

#[async_trait]
impl SessionConnector for GradioConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteSession>> {
        let url = format!("{}/config", self.base_url);
        debug!("Fetching remote config from: {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::session(format!("Failed to reach {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::session(format!(
                "Handshake failed with status {}: {}",
                status, body
            )));
        }

        let remote_config: Value = response
            .json()
            .await
            .map_err(|e| Error::session(format!("Invalid remote config: {}", e)))?;

        let api_prefix = remote_config
            .get("api_prefix")
            .and_then(Value::as_str)
            .map(normalize_path)
            .unwrap_or_else(|| self.default_api_prefix.clone());

        let session = GradioSession {
            client: self.client.clone(),
            api_root: format!("{}{}", self.base_url, api_prefix),
            access_token: self.access_token.clone(),
            session_hash: Uuid::new_v4().simple().to_string(),
        };
        Ok(Arc::new(session))
    }
}

pub struct GradioSession {
    client: reqwest::Client,
    api_root: String,
    access_token: Option<String>,
    session_hash: String,
}

impl GradioSession {
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl RemoteSession for GradioSession {
    fn session_id(&self) -> &str {
        &self.session_hash
    }

    async fn upload(&self, role: InputRole, image: &InputImage) -> Result<FileHandle> {
        let url = format!("{}/upload", self.api_root);
        debug!(role = %role, size = image.bytes.len(), "Uploading input to {}", url);

        let part = Part::bytes(image.bytes.clone())
            .file_name(image.file_name.clone())
            .mime_str(&image.mime_type)
            .map_err(|e| {
                Error::invalid_upload(format!("Invalid MIME type '{}': {}", image.mime_type, e))
            })?;
        let form = Form::new().part("files", part);

        let response = self
            .authorized(self.client.post(&url))
            .query(&[("upload_id", Uuid::new_v4().simple().to_string())])
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "Upload of {} failed with status {}: {}",
                role, status, body
            )));
        }

        let paths: Vec<String> = response
            .json()
            .await
            .map_err(|e| Error::remote(format!("Invalid upload response: {}", e)))?;
        let path = paths
            .into_iter()
            .next()
            .ok_or_else(|| Error::remote("Upload response contained no file paths"))?;

        Ok(FileHandle {
            path,
            url: None,
            orig_name: Some(image.file_name.clone()),
            mime_type: Some(image.mime_type.clone()),
            size: Some(image.size()),
            meta: FileMeta::default(),
        })
    }

    async fn predict(&self, endpoint: &str, arguments: Vec<Value>) -> Result<Prediction> {
        let call_url = format!("{}/call{}", self.api_root, normalize_path(endpoint));
        debug!("Queueing prediction at: {}", call_url);

        let response = self
            .authorized(self.client.post(&call_url))
            .json(&json!({
                "data": arguments,
                "session_hash": self.session_hash,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "Prediction request failed with status {}: {}",
                status, body
            )));
        }

        let handle: EventHandle = response
            .json()
            .await
            .map_err(|e| Error::remote(format!("Invalid prediction response: {}", e)))?;

        let events_url = format!("{}/{}", call_url, handle.event_id);
        debug!("Awaiting prediction result from: {}", events_url);

        let response = self.authorized(self.client.get(&events_url)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::remote(format!(
                "Result stream failed with status {}: {}",
                status, body
            )));
        }

        let body = response.text().await?;
        let data = parse_event_stream(&body)?;
        Ok(Prediction { data })
    }

    fn file_url(&self, path: &str) -> String {
        format!("{}/file={}", self.api_root, path)
    }
}

/// Extracts the payload of the `complete` event from a server-sent event body.
pub fn parse_event_stream(body: &str) -> Result<Value> {
    let mut event = "";

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => return Ok(serde_json::from_str(data)?),
                "error" => return Err(Error::remote(remote_error_message(data))),
                _ => {}
            }
        } else if line.is_empty() {
            event = "";
        }
    }

    Err(Error::remote("Event stream ended without a result"))
}

fn remote_error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::String(message)) => message,
        Ok(Value::Null) => "Remote service reported an error".to_string(),
        Ok(other) => other.to_string(),
        Err(_) if data.is_empty() => "Remote service reported an error".to_string(),
        Err(_) => data.to_string(),
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
