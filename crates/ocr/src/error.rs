use std::time::Duration;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The provider answered with a non-success status.
    #[error("OCR upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("OCR upload request failed: {0}")]
    Transport(String),

    #[error("OCR upload response carried no token: {body}")]
    MissingToken { body: String },
}

impl UploadError {
    /// Detail forwarded to the caller: the provider's raw text where there is one.
    pub fn details(&self) -> Value {
        match self {
            UploadError::Rejected { body, .. } | UploadError::MissingToken { body } => {
                Value::String(body.clone())
            }
            UploadError::Transport(msg) => Value::String(msg.clone()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("OCR result request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The provider reported a terminal job state other than ready.
    #[error("OCR job failed: {0}")]
    Failed(Value),

    #[error("OCR result request failed: {0}")]
    Transport(String),

    #[error("OCR result could not be decoded: {0}")]
    Malformed(String),

    #[error("OCR job still processing after {elapsed:?}")]
    Timeout { elapsed: Duration },
}

impl PollError {
    pub fn details(&self) -> Value {
        match self {
            PollError::Rejected { body, .. } => Value::String(body.clone()),
            PollError::Failed(body) => body.clone(),
            PollError::Transport(msg) | PollError::Malformed(msg) => Value::String(msg.clone()),
            PollError::Timeout { elapsed } => Value::String(format!(
                "extraction not ready after {} seconds",
                elapsed.as_secs()
            )),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }
}
