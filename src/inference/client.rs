use super::download::Downloader;
use super::remote::GradioConnector;
use super::result::{ResultNormalizer, ResultPayload};
use super::session::{FileHandle, RemoteSession, SessionCache, SessionConnector};
use super::types::{InferenceInputs, InferenceParams, InputRole, NormalizedResult};
use crate::{Error, Result, config::Config};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

const MAX_BOUND_MARKER: &str = "greater than maximum value";

/// Resilient client for the remote try-on procedure.
///
/// Owns the cached session, the retry policy and the process-wide ceiling
/// for the denoising-steps parameter.
pub struct InferenceClient {
    sessions: SessionCache,
    downloader: Downloader,
    endpoint: String,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    request_timeout: Duration,
    predict_timeout: Duration,
    steps_ceiling: AtomicU32,
}

impl InferenceClient {
    pub fn new(config: &Config) -> Result<Self> {
        let connector = GradioConnector::new(&config.inference)?;
        Self::with_connector(config, Arc::new(connector))
    }

    pub fn with_connector(config: &Config, connector: Arc<dyn SessionConnector>) -> Result<Self> {
        let inference = &config.inference;
        let downloader = Downloader::new(&config.download, inference.request_timeout())?;

        Ok(Self {
            sessions: SessionCache::new(
                connector,
                inference.session_max_age(),
                inference.request_timeout(),
            ),
            downloader,
            endpoint: inference.endpoint.clone(),
            max_attempts: config.retry.max_attempts.max(1),
            base_delay: config.retry.base_delay(),
            max_delay: config.retry.max_delay(),
            request_timeout: inference.request_timeout(),
            predict_timeout: inference.predict_timeout(),
            steps_ceiling: AtomicU32::new(inference.max_denoise_steps),
        })
    }

    pub async fn get_session(&self) -> Result<Arc<dyn RemoteSession>> {
        self.sessions.get().await
    }

    pub async fn invalidate_session(&self) {
        self.sessions.invalidate().await;
    }

    pub async fn cached_session_age(&self) -> Option<Duration> {
        self.sessions.cached_age().await
    }

    pub fn downloader(&self) -> &Downloader {
        &self.downloader
    }

    pub fn denoise_steps_ceiling(&self) -> u32 {
        self.steps_ceiling.load(Ordering::Relaxed)
    }

    /// Runs the remote procedure with retries and returns one base64 image.
    ///
    /// Every failed attempt discards the cached session and, unless it was
    /// the last one, backs off exponentially. Result-shape errors end the
    /// loop immediately.
    pub async fn submit(
        &self,
        inputs: &InferenceInputs,
        params: &InferenceParams,
    ) -> Result<NormalizedResult> {
        for role in InputRole::ALL {
            inputs.require(role)?;
        }

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            info!("Processing attempt {}/{}", attempt, self.max_attempts);

            if attempt > 1 {
                debug!("Forcing a new inference session for retry");
                self.sessions.invalidate().await;
            }

            let steps = self.clamp_steps(params.denoise_steps);
            if steps != params.denoise_steps {
                debug!("Clamped denoising steps from {} to {}", params.denoise_steps, steps);
            }

            match self.attempt(inputs, params, steps).await {
                Ok(result) => {
                    info!(attempt, "Inference completed");
                    return Ok(result);
                }
                Err(e) if e.is_terminal() => {
                    warn!("Request cannot succeed on retry: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Attempt {} failed: {}", attempt, e);
                    self.tighten_bounds(&e, steps);
                    self.sessions.invalidate().await;

                    if attempt < self.max_attempts {
                        let delay = backoff_delay(self.base_delay, self.max_delay, attempt);
                        info!("Waiting {}ms before retry...", delay.as_millis());
                        sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(Error::ExhaustedRetries {
            attempts: self.max_attempts,
            last_error: Box::new(
                last_error.unwrap_or_else(|| Error::internal("no attempt was made")),
            ),
        })
    }

    async fn attempt(
        &self,
        inputs: &InferenceInputs,
        params: &InferenceParams,
        steps: u32,
    ) -> Result<NormalizedResult> {
        let session = self.sessions.get().await?;

        let subject = self.upload(session.as_ref(), inputs, InputRole::Subject).await?;
        let garment = self.upload(session.as_ref(), inputs, InputRole::Garment).await?;

        let arguments = tryon_arguments(subject, garment, params, steps)?;

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

        ResultNormalizer::new(&self.downloader)
            .normalize(ResultPayload::from(prediction.data))
            .await
    }

    async fn upload(
        &self,
        session: &dyn RemoteSession,
        inputs: &InferenceInputs,
        role: InputRole,
    ) -> Result<FileHandle> {
        let image = inputs.require(role)?;
        match timeout(self.request_timeout, session.upload(role, image)).await {
            Ok(result) => result,
            Err(_) => Err(Error::UploadTimeout {
                role,
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn clamp_steps(&self, requested: u32) -> u32 {
        requested.min(self.steps_ceiling.load(Ordering::Relaxed))
    }

    /// Lowers the steps ceiling when the remote rejects the steps value
    /// that was actually sent. Bounds on other parameters are ignored.
    fn tighten_bounds(&self, error: &Error, sent_steps: u32) {
        let Error::RemoteCall(message) = error else {
            return;
        };
        let Some((value, maximum)) = parse_bound_violation(message) else {
            return;
        };
        if value != f64::from(sent_steps) {
            debug!("Ignoring bound violation for another parameter: {}", message);
            return;
        }
        let previous = self.steps_ceiling.fetch_min(maximum, Ordering::Relaxed);
        if maximum < previous {
            warn!(
                "Denoising steps too high for the remote service, lowering ceiling from {} to {}",
                previous, maximum
            );
        }
    }
}

/// `min(base * 2^(attempt - 1), cap)` for a 1-based attempt number.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 1u32
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(cap)
}

/// Reads `Value N is greater than maximum value M` into `(N, M)`.
fn parse_bound_violation(message: &str) -> Option<(f64, u32)> {
    let (head, rest) = message.split_once(MAX_BOUND_MARKER)?;
    let (_, value) = head.trim_end().strip_suffix(" is")?.rsplit_once("Value ")?;
    let value = value.trim().parse().ok()?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some((value, digits.parse().ok()?))
}

fn tryon_arguments(
    subject: FileHandle,
    garment: FileHandle,
    params: &InferenceParams,
    denoise_steps: u32,
) -> Result<Vec<Value>> {
    Ok(vec![
        json!({
            "background": serde_json::to_value(subject)?,
            "layers": [],
            "composite": null,
        }),
        serde_json::to_value(garment)?,
        Value::String(params.description.clone()),
        Value::Bool(params.auto_mask),
        Value::Bool(params.auto_crop),
        Value::from(denoise_steps),
        Value::from(params.seed),
    ])
}
