use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::error::{PollError, UploadError};
use crate::schema::{JobToken, PollStatus, RawExtraction, ReceiptImage};
use crate::OcrProvider;

/// Wait schedule for a job the provider reports as still processing.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    initial_interval: Duration,
    max_interval: Duration,
    deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(2_000, 10_000, 120)
    }
}

/// Floor for the first wait, so a zero interval cannot turn polling into a busy loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

impl PollPolicy {
    pub fn new(initial_interval_ms: u64, max_interval_ms: u64, deadline_secs: u64) -> Self {
        let initial_interval = Duration::from_millis(initial_interval_ms).max(MIN_POLL_INTERVAL);
        Self {
            initial_interval,
            max_interval: Duration::from_millis(max_interval_ms).max(initial_interval),
            deadline: Duration::from_secs(deadline_secs),
        }
    }

    pub fn initial_interval(&self) -> Duration {
        self.initial_interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    fn next_interval(&self, current: Duration) -> Duration {
        std::cmp::min(current * 2, self.max_interval)
    }
}

/// Submits receipt images and waits for their extraction to finish.
pub struct ExtractionPoller {
    provider: Arc<dyn OcrProvider>,
    policy: PollPolicy,
}

impl ExtractionPoller {
    pub fn new(provider: Arc<dyn OcrProvider>, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    /// Single upload attempt; never retried.
    pub async fn submit(&self, image: &ReceiptImage) -> Result<JobToken, UploadError> {
        let token = self.provider.upload(image).await?;
        info!(token = %token, filename = %image.filename, "Receipt accepted by OCR provider");
        Ok(token)
    }

    /// Poll until the job is ready, fails, or the deadline passes.
    pub async fn await_result(&self, token: &JobToken) -> Result<RawExtraction, PollError> {
        let started = Instant::now();
        let mut interval = self.policy.initial_interval;
        let mut attempt = 0usize;

        loop {
            attempt += 1;
            match self.provider.fetch_result(token).await {
                Ok(PollStatus::Ready(extraction)) => {
                    info!(
                        token = %token,
                        attempts = attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        line_items = extraction.line_items.len(),
                        "OCR extraction ready"
                    );
                    return Ok(extraction);
                }
                Ok(PollStatus::Processing) => {
                    let elapsed = started.elapsed();
                    if elapsed + interval > self.policy.deadline {
                        warn!(
                            token = %token,
                            attempts = attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "OCR extraction exceeded deadline"
                        );
                        return Err(PollError::Timeout { elapsed });
                    }

                    debug!(
                        token = %token,
                        attempt = attempt,
                        wait_ms = interval.as_millis() as u64,
                        "OCR extraction still processing"
                    );

                    sleep(interval).await;
                    interval = self.policy.next_interval(interval);
                }
                Err(e) => {
                    warn!(token = %token, attempts = attempt, error = %e, "OCR extraction failed");
                    return Err(e);
                }
            }
        }
    }
}
