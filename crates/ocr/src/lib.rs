pub mod client;
pub mod error;
pub mod poller;
pub mod schema;

pub use client::TabscannerClient;
pub use error::{PollError, UploadError};
pub use poller::{ExtractionPoller, PollPolicy};
pub use schema::{ExtractedLine, JobToken, PollStatus, RawExtraction, ReceiptImage};

use async_trait::async_trait;

/// A receipt OCR service that works in two steps: upload, then fetch by token.
#[async_trait]
pub trait OcrProvider: Send + Sync {
    async fn upload(&self, image: &ReceiptImage) -> Result<JobToken, UploadError>;

    /// One poll of the result endpoint.
    async fn fetch_result(&self, token: &JobToken) -> Result<PollStatus, PollError>;
}
