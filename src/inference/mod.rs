//! Resilient access to the remote image-synthesis service.

mod client;
mod download;
mod model3d;
mod remote;
mod result;
mod session;
mod types;

pub use client::{InferenceClient, backoff_delay};
pub use download::Downloader;
pub use model3d::{Model3dClient, ModelAssets};
pub use remote::{GradioConnector, GradioSession, parse_event_stream};
pub use result::{ResultItem, ResultNormalizer, ResultPayload};
pub use session::{FileHandle, FileMeta, Prediction, RemoteSession, SessionCache, SessionConnector};
pub use types::{
    GeneratedImage, InferenceInputs, InferenceParams, InputImage, InputRole, NormalizedResult,
};
