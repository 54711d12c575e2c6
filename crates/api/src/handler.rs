use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, RawQuery, State},
};
use ocr::ReceiptImage;
use receipt::ParsedReceipt;
use serde::Serialize;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use crate::AppState;
use crate::cache::CacheStats;
use crate::error::ApiError;
use crate::metrics::{MetricsSnapshot, RequestOutcome, TimedOperation};

const FILE_FIELD: &str = "file";
const CATEGORIES_FIELD: &str = "categories";

/// One scan request after the multipart body has been read.
#[derive(Debug)]
pub struct UploadRequest {
    pub image: ReceiptImage,
    pub categories: Vec<String>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct MetricsResponse {
    requests: MetricsSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache: Option<CacheStats>,
}

pub async fn scan_receipt(
    State(state): State<Arc<AppState>>,
    RawQuery(query): RawQuery,
    multipart: Multipart,
) -> Result<Json<ParsedReceipt>, ApiError> {
    let request_id = Uuid::new_v4();

    async move {
        let result = match read_upload(query.as_deref(), multipart).await {
            Ok(request) => process(&state, request).await,
            Err(e) => Err(e),
        };

        let outcome = match &result {
            Ok(_) => RequestOutcome::Success,
            Err(e) => e.outcome(),
        };
        state.metrics.record_request(outcome);

        result.map(Json)
    }
    .instrument(info_span!("scan_receipt", %request_id))
    .await
}

/// Upload, wait for extraction, then classify.
pub async fn process(state: &AppState, request: UploadRequest) -> Result<ParsedReceipt, ApiError> {
    if request.categories.is_empty() {
        return Err(ApiError::BadRequest("Categories are required".to_string()));
    }

    let permit = state
        .ocr_permits
        .acquire()
        .await
        .map_err(|e| ApiError::Internal(format!("OCR gate closed: {e}")))?;

    let timer = TimedOperation::start();
    let token = state.poller.submit(&request.image).await?;
    let raw = state.poller.await_result(&token).await?;
    state.metrics.record_ocr(timer.elapsed());
    drop(permit);

    let timer = TimedOperation::start();
    let parsed = state.parser.parse(&raw, &request.categories).await;
    state
        .metrics
        .record_parse(timer.elapsed(), parsed.items.len(), parsed.unknown_count());

    info!(
        items = parsed.items.len(),
        unknown = parsed.unknown_count(),
        "Receipt scanned"
    );

    Ok(parsed)
}

/// Collect the image and categories. Categories from the query string come
/// first, then any multipart `categories` fields; blank values are dropped.
async fn read_upload(query: Option<&str>, mut multipart: Multipart) -> Result<UploadRequest, ApiError> {
    let mut categories: Vec<String> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(key, _)| key == CATEGORIES_FIELD)
                .map(|(_, value)| value.into_owned())
                .collect()
        })
        .unwrap_or_default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some(FILE_FIELD) => {
                let filename = field.file_name().unwrap_or("receipt").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                image = Some(ReceiptImage {
                    bytes: bytes.to_vec(),
                    filename,
                    content_type,
                });
            }
            Some(CATEGORIES_FIELD) => categories.push(field.text().await?),
            _ => {}
        }
    }

    categories.retain(|c| !c.trim().is_empty());
    if categories.is_empty() {
        return Err(ApiError::BadRequest("Categories are required".to_string()));
    }

    let image = image.ok_or_else(|| ApiError::BadRequest("File is required".to_string()))?;

    Ok(UploadRequest { image, categories })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        requests: state.metrics.snapshot(),
        cache: state.cache.as_ref().map(|cache| cache.stats()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_router;
    use crate::metrics::Metrics;
    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use classify::{Classifier, LabelProvider};
    use ocr::{
        ExtractedLine, ExtractionPoller, JobToken, OcrProvider, PollError, PollPolicy, PollStatus,
        RawExtraction, UploadError,
    };
    use receipt::ReceiptParser;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    enum Script {
        Ready(RawExtraction),
        UploadRejected(&'static str),
        JobFailed(Value),
        NeverReady,
    }

    struct MockOcr {
        script: Script,
        uploads: AtomicUsize,
        polls: AtomicUsize,
    }

    #[async_trait]
    impl OcrProvider for MockOcr {
        async fn upload(&self, image: &ReceiptImage) -> Result<JobToken, UploadError> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            assert_eq!(image.filename, "receipt.jpg");
            assert_eq!(image.content_type, "image/jpeg");
            match &self.script {
                Script::UploadRejected(body) => Err(UploadError::Rejected {
                    status: 403,
                    body: body.to_string(),
                }),
                _ => Ok(JobToken("tok-1".into())),
            }
        }

        async fn fetch_result(&self, _token: &JobToken) -> Result<PollStatus, PollError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Ready(raw) => Ok(PollStatus::Ready(raw.clone())),
                Script::JobFailed(body) => Err(PollError::Failed(body.clone())),
                Script::NeverReady => Ok(PollStatus::Processing),
                Script::UploadRejected(_) => unreachable!("polled after failed upload"),
            }
        }
    }

    struct MockLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LabelProvider for MockLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Food".to_string())
        }
    }

    struct Harness {
        state: Arc<AppState>,
        ocr: Arc<MockOcr>,
        llm: Arc<MockLlm>,
    }

    fn harness(script: Script) -> Harness {
        let ocr = Arc::new(MockOcr {
            script,
            uploads: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
        });
        let llm = Arc::new(MockLlm {
            calls: AtomicUsize::new(0),
        });
        let state = Arc::new(AppState::new(
            ExtractionPoller::new(ocr.clone(), PollPolicy::new(10, 20, 1)),
            ReceiptParser::new(Classifier::new(llm.clone(), 4)),
            Metrics::new(),
            None,
            2,
        ));
        Harness { state, ocr, llm }
    }

    fn milk_receipt() -> RawExtraction {
        RawExtraction {
            establishment: Some("ShopMart".into()),
            line_items: vec![ExtractedLine {
                desc_clean: Some("Milk".into()),
                line_total: Some(3.50),
            }],
            summary_items: vec![],
        }
    }

    const BOUNDARY: &str = "receipt-test-boundary";

    fn scan_request(uri: &str, with_file: bool, categories: &[&str]) -> Request<Body> {
        let mut body = Vec::new();
        for category in categories {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"categories\"\r\n\r\n{category}\r\n"
                )
                .as_bytes(),
            );
        }
        if with_file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"receipt.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(&[0xff, 0xd8, 0xff, 0xe0]);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state.clone(), 1024 * 1024)
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_scan_end_to_end() {
        let h = harness(Script::Ready(milk_receipt()));

        let (status, body) = send(&h.state, scan_request("/scan-receipt", true, &["Food", "Other"])).await;

        assert_eq!(status, StatusCode::OK);
        let item = &body["items"][0];
        assert_eq!(item["name"], "Milk");
        assert_eq!(item["price"], 3.5);
        assert_eq!(item["vendor"], "ShopMart");
        assert_eq!(item["category"], "food");
        assert!(item["uploadedAt"].as_str().unwrap().ends_with('Z'));
        assert_eq!(body["tax"], 0.0);
        assert_eq!(body["total"], 0.0);
        assert_eq!(h.ocr.uploads.load(Ordering::SeqCst), 1);
        assert_eq!(h.ocr.polls.load(Ordering::SeqCst), 1);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_runs_on_a_spawned_task() {
        let h = harness(Script::Ready(milk_receipt()));
        let router = build_router(h.state.clone(), 1024 * 1024);
        let request = scan_request("/scan-receipt", true, &["Food", "Other"]);

        let response = tokio::spawn(router.oneshot(request)).await.unwrap().unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_encoded_category_list_and_trailing_slash() {
        let h = harness(Script::Ready(milk_receipt()));

        let (status, body) =
            send(&h.state, scan_request("/scan-receipt/", true, &["['Food', 'Other']"])).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"][0]["category"], "food");
    }

    #[tokio::test]
    async fn test_categories_from_query_string() {
        let h = harness(Script::Ready(milk_receipt()));

        let (status, body) = send(
            &h.state,
            scan_request("/scan-receipt?categories=Food&categories=Other", true, &[]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"][0]["category"], "food");
    }

    #[tokio::test]
    async fn test_missing_categories_never_reach_providers() {
        let h = harness(Script::Ready(milk_receipt()));

        let (status, body) = send(&h.state, scan_request("/scan-receipt", true, &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({"error": "Categories are required"}));

        let (status, _) = send(&h.state, scan_request("/scan-receipt", true, &["  "])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(h.ocr.uploads.load(Ordering::SeqCst), 0);
        assert_eq!(h.ocr.polls.load(Ordering::SeqCst), 0);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let h = harness(Script::Ready(milk_receipt()));

        let (status, body) = send(&h.state, scan_request("/scan-receipt", false, &["Food"])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File is required");
        assert_eq!(h.ocr.uploads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_stops_the_flow() {
        let h = harness(Script::UploadRejected("invalid api key"));

        let (status, body) = send(&h.state, scan_request("/scan-receipt", true, &["Food", "Other"])).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Upload failed", "details": "invalid api key"}));
        assert_eq!(h.ocr.polls.load(Ordering::SeqCst), 0);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_poll_failure_returns_provider_body() {
        let failure = json!({"code": 500, "message": "image unreadable"});
        let h = harness(Script::JobFailed(failure.clone()));

        let (status, body) = send(&h.state, scan_request("/scan-receipt", true, &["Food", "Other"])).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Processing failed");
        assert_eq!(body["details"], failure);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_job_times_out() {
        let h = harness(Script::NeverReady);

        let (status, body) = send(&h.state, scan_request("/scan-receipt", true, &["Food", "Other"])).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["error"], "Processing timed out");
        assert!(h.ocr.polls.load(Ordering::SeqCst) > 1);
        assert_eq!(h.llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_metrics_and_health() {
        let h = harness(Script::Ready(milk_receipt()));
        send(&h.state, scan_request("/scan-receipt", true, &["Food", "Other"])).await;
        send(&h.state, scan_request("/scan-receipt", true, &[])).await;

        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

        let (status, body) = send(&h.state, get("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["requests"]["total_requests"], 2);
        assert_eq!(body["requests"]["successful_requests"], 1);
        assert_eq!(body["requests"]["rejected_requests"], 1);
        assert_eq!(body["requests"]["items_classified"], 1);
        assert!(body.get("cache").is_none());

        let (status, body) = send(&h.state, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok"}));
    }
}
