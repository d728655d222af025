use crate::inference::InferenceInputs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Stable identity of an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Digest of a submission's input payloads, used to spot exact duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadSignature(String);

impl PayloadSignature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// SHA-256 over every input's role, file name and bytes, in role order.
    pub fn from_inputs(inputs: &InferenceInputs) -> Self {
        let mut hasher = Sha256::new();
        for (role, image) in inputs.iter() {
            hasher.update(role.as_str().as_bytes());
            hasher.update([0u8]);
            hasher.update(image.file_name.as_bytes());
            hasher.update([0u8]);
            hasher.update((image.bytes.len() as u64).to_be_bytes());
            hasher.update(&image.bytes);
        }
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for PayloadSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct PendingSubmission {
    pub signature: PayloadSignature,
    pub submitted_at: Instant,
    pub(crate) ticket: u64,
}

impl PendingSubmission {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.submitted_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    DuplicateInFlight { retry_after: Duration },
    ResubmittedTooSoon { retry_after: Duration },
}

impl Rejection {
    /// Time left before the blocking window closes.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::DuplicateInFlight { retry_after } | Self::ResubmittedTooSoon { retry_after } => {
                *retry_after
            }
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateInFlight { .. } => {
                f.write_str("A request with these exact files is already being processed")
            }
            Self::ResubmittedTooSoon { .. } => {
                f.write_str("Please wait before submitting another request")
            }
        }
    }
}
