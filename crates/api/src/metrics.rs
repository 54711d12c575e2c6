use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// How a scan request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Success,
    Rejected,
    UploadFailed,
    PollFailed,
    TimedOut,
    Internal,
}

pub struct Metrics {
    // Counters
    total_requests: AtomicUsize,
    successful_requests: AtomicUsize,
    rejected_requests: AtomicUsize,
    upload_failures: AtomicUsize,
    poll_failures: AtomicUsize,
    poll_timeouts: AtomicUsize,
    internal_failures: AtomicUsize,

    // Timing (in microseconds)
    total_ocr_time_us: AtomicU64,
    total_classify_time_us: AtomicU64,

    // Counts
    ocr_jobs_completed: AtomicUsize,
    receipts_parsed: AtomicUsize,
    items_classified: AtomicUsize,
    unknown_categories: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            total_requests: AtomicUsize::new(0),
            successful_requests: AtomicUsize::new(0),
            rejected_requests: AtomicUsize::new(0),
            upload_failures: AtomicUsize::new(0),
            poll_failures: AtomicUsize::new(0),
            poll_timeouts: AtomicUsize::new(0),
            internal_failures: AtomicUsize::new(0),
            total_ocr_time_us: AtomicU64::new(0),
            total_classify_time_us: AtomicU64::new(0),
            ocr_jobs_completed: AtomicUsize::new(0),
            receipts_parsed: AtomicUsize::new(0),
            items_classified: AtomicUsize::new(0),
            unknown_categories: AtomicUsize::new(0),
        })
    }

    pub fn record_request(&self, outcome: RequestOutcome) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            RequestOutcome::Success => &self.successful_requests,
            RequestOutcome::Rejected => &self.rejected_requests,
            RequestOutcome::UploadFailed => &self.upload_failures,
            RequestOutcome::PollFailed => &self.poll_failures,
            RequestOutcome::TimedOut => &self.poll_timeouts,
            RequestOutcome::Internal => &self.internal_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Upload through ready result, for one job.
    pub fn record_ocr(&self, duration: Duration) {
        self.total_ocr_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.ocr_jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse(&self, duration: Duration, items: usize, unknown: usize) {
        self.total_classify_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.receipts_parsed.fetch_add(1, Ordering::Relaxed);
        self.items_classified.fetch_add(items, Ordering::Relaxed);
        self.unknown_categories.fetch_add(unknown, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            upload_failures: self.upload_failures.load(Ordering::Relaxed),
            poll_failures: self.poll_failures.load(Ordering::Relaxed),
            poll_timeouts: self.poll_timeouts.load(Ordering::Relaxed),
            internal_failures: self.internal_failures.load(Ordering::Relaxed),
            avg_ocr_time_ms: self.avg_time_ms(&self.total_ocr_time_us, &self.ocr_jobs_completed),
            avg_classify_time_ms: self
                .avg_time_ms(&self.total_classify_time_us, &self.receipts_parsed),
            items_classified: self.items_classified.load(Ordering::Relaxed),
            unknown_categories: self.unknown_categories.load(Ordering::Relaxed),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub rejected_requests: usize,
    pub upload_failures: usize,
    pub poll_failures: usize,
    pub poll_timeouts: usize,
    pub internal_failures: usize,
    pub avg_ocr_time_ms: f64,
    pub avg_classify_time_ms: f64,
    pub items_classified: usize,
    pub unknown_categories: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
