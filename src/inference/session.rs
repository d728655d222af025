use super::types::{InputImage, InputRole};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout};
use tracing::{debug, info, warn};

/// Opaque reference to a file already uploaded to the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHandle {
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub orig_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub meta: FileMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    #[serde(rename = "_type")]
    pub kind: String,
}

impl Default for FileMeta {
    fn default() -> Self {
        Self {
            kind: "gradio.FileData".to_string(),
        }
    }
}

/// Raw response of a remote procedure. `data` has no fixed shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub data: Value,
}

/// An established session with the remote inference service.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    fn session_id(&self) -> &str;

    async fn upload(&self, role: InputRole, image: &InputImage) -> Result<FileHandle>;

    async fn predict(&self, endpoint: &str, arguments: Vec<Value>) -> Result<Prediction>;

    /// Download URL for a file the remote service produced at `path`.
    fn file_url(&self, path: &str) -> String;
}

/// Performs the handshake that yields a new [`RemoteSession`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RemoteSession>>;
}

struct CachedSession {
    session: Arc<dyn RemoteSession>,
    created_at: Instant,
}

/// Single shared session slot with a maximum age.
///
/// Construction happens while the slot lock is held, so concurrent callers
/// that find the slot empty wait for one handshake instead of racing.
pub struct SessionCache {
    connector: Arc<dyn SessionConnector>,
    slot: Mutex<Option<CachedSession>>,
    max_age: Duration,
    connect_timeout: Duration,
}

impl SessionCache {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        max_age: Duration,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            max_age,
            connect_timeout,
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn RemoteSession>> {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref() {
            let age = cached.created_at.elapsed();
            if age < self.max_age {
                debug!(
                    session_id = cached.session.session_id(),
                    age_ms = age.as_millis() as u64,
                    "Using cached inference session"
                );
                return Ok(Arc::clone(&cached.session));
            }
            info!("Cached inference session expired after {}s", age.as_secs());
            *slot = None;
        }

        info!("Creating new inference session");
        let session = match timeout(self.connect_timeout, self.connector.connect()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!("Failed to initialize inference session: {}", e);
                return Err(e);
            }
            Err(_) => {
                warn!(
                    "Inference session initialization timed out after {}ms",
                    self.connect_timeout.as_millis()
                );
                return Err(Error::SessionTimeout {
                    timeout_ms: self.connect_timeout.as_millis() as u64,
                });
            }
        };

        info!(session_id = session.session_id(), "Inference session initialized");
        *slot = Some(CachedSession {
            session: Arc::clone(&session),
            created_at: Instant::now(),
        });
        Ok(session)
    }

    pub async fn invalidate(&self) {
        if let Some(cached) = self.slot.lock().await.take() {
            debug!(session_id = cached.session.session_id(), "Discarded cached inference session");
        }
    }

    pub async fn cached_age(&self) -> Option<Duration> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|cached| cached.created_at.elapsed())
    }
}
