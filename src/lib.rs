pub mod config;
pub mod error;
pub mod gate;
pub mod inference;
pub mod service;

pub use error::{Error, Result};
pub use gate::{CallerId, GateTicket, PayloadSignature, Rejection, RequestGate};
pub use inference::{
    GeneratedImage, InferenceClient, InferenceInputs, InferenceParams, InputImage, InputRole,
    Model3dClient, ModelAssets,
};
pub use service::TryOnService;
