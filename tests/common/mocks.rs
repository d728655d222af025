use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tryon_gateway::{
    Error, InputImage, InputRole, Result,
    inference::{FileHandle, FileMeta, Prediction, RemoteSession, SessionConnector},
};

/// What the fake service does for one prediction.
#[derive(Debug, Clone)]
pub enum PredictStep {
    Respond(Value),
    Fail(String),
    Hang,
}

#[derive(Debug, Default)]
struct FakeState {
    connects: Vec<Instant>,
    connect_failures: usize,
    hang_uploads: bool,
    steps: VecDeque<PredictStep>,
    uploads: Vec<(InputRole, String)>,
    predictions: Vec<Vec<Value>>,
}

/// Scripted stand-in for the remote inference service.
#[derive(Debug, Clone, Default)]
pub struct MockInferenceService {
    state: Arc<Mutex<FakeState>>,
}

impl MockInferenceService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(self, steps: Vec<PredictStep>) -> Self {
        self.state.lock().unwrap().steps = steps.into();
        self
    }

    pub fn with_connect_failures(self, count: usize) -> Self {
        self.state.lock().unwrap().connect_failures = count;
        self
    }

    /// Uploads never complete, so only the caller's timeout ends them.
    pub fn with_hanging_uploads(self) -> Self {
        self.state.lock().unwrap().hang_uploads = true;
        self
    }

    pub fn connector(&self) -> Arc<dyn SessionConnector> {
        Arc::new(self.clone())
    }

    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap().connects.len()
    }

    /// Time between consecutive handshakes, i.e. the observed backoff.
    pub fn connect_gaps(&self) -> Vec<Duration> {
        let state = self.state.lock().unwrap();
        state
            .connects
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub fn uploads(&self) -> Vec<(InputRole, String)> {
        self.state.lock().unwrap().uploads.clone()
    }

    pub fn predictions(&self) -> Vec<Vec<Value>> {
        self.state.lock().unwrap().predictions.clone()
    }
}

#[async_trait]
impl SessionConnector for MockInferenceService {
    async fn connect(&self) -> Result<Arc<dyn RemoteSession>> {
        let mut state = self.state.lock().unwrap();
        state.connects.push(Instant::now());
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(Error::session("handshake refused"));
        }
        let id = format!("session-{}", state.connects.len());
        Ok(Arc::new(MockSession {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockSession {
    id: String,
    state: Arc<Mutex<FakeState>>,
}

#[async_trait]
impl RemoteSession for MockSession {
    fn session_id(&self) -> &str {
        &self.id
    }

    async fn upload(&self, role: InputRole, image: &InputImage) -> Result<FileHandle> {
        let hang = {
            let mut state = self.state.lock().unwrap();
            state.uploads.push((role, image.mime_type.clone()));
            state.hang_uploads
        };
        if hang {
            tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        }
        // Same check the multipart encoder applies before sending.
        if !image.mime_type.contains('/') {
            return Err(Error::invalid_upload(format!(
                "Invalid MIME type '{}'",
                image.mime_type
            )));
        }
        Ok(FileHandle {
            path: format!("/tmp/gradio/{}/{}", self.id, image.file_name),
            url: None,
            orig_name: Some(image.file_name.clone()),
            mime_type: Some(image.mime_type.clone()),
            size: Some(image.size()),
            meta: FileMeta::default(),
        })
    }

    async fn predict(&self, _endpoint: &str, arguments: Vec<Value>) -> Result<Prediction> {
        let step = {
            let mut state = self.state.lock().unwrap();
            state.predictions.push(arguments);
            state.steps.pop_front()
        };

        match step {
            Some(PredictStep::Respond(data)) => Ok(Prediction { data }),
            Some(PredictStep::Fail(message)) => Err(Error::remote(message)),
            Some(PredictStep::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(Error::remote("hung prediction finished"))
            }
            None => Err(Error::remote("No more mock responses available")),
        }
    }

    fn file_url(&self, path: &str) -> String {
        format!("https://mock.space/gradio_api/file={path}")
    }
}
