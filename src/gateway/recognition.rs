//! Recognition providers: the registry the orchestrator routes through, an
//! HTTP client for a remote recognition service, and a scripted mock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CaptureImage, GatewayError, RecognitionBackend, RecognitionResponse};
use crate::config::IntakeConfig;
use crate::models::{DocumentType, ExtractionField, ExtractionRecord};
use crate::pipeline::extraction::ProviderId;

// ──────────────────────────────────────────────
// ProviderRegistry
// ──────────────────────────────────────────────

/// Maps provider ids to backends. Several ids may share one backend
/// (e.g. one HTTP service hosting every cloud tier).
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    backends: HashMap<ProviderId, Arc<dyn RecognitionBackend>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ProviderId, backend: Arc<dyn RecognitionBackend>) {
        tracing::debug!(provider = %id, "Registered recognition provider");
        self.backends.insert(id, backend);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, id: ProviderId, backend: Arc<dyn RecognitionBackend>) -> Self {
        self.register(id, backend);
        self
    }

    pub fn contains(&self, id: &ProviderId) -> bool {
        self.backends.contains_key(id)
    }

    /// Registered ids, sorted for stable output.
    pub fn provider_ids(&self) -> Vec<ProviderId> {
        let mut ids: Vec<ProviderId> = self.backends.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registry with every configured tier routed to the remote recognition
    /// service, when one is configured. Otherwise empty; callers register
    /// local backends themselves.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, GatewayError> {
        let mut registry = Self::new();
        if let Some(url) = config.recognition_url.as_deref() {
            let http: Arc<dyn RecognitionBackend> =
                Arc::new(HttpRecognitionBackend::new(url, config.provider_timeout())?);
            let tiers = &config.providers;
            for id in [&tiers.accurate, &tiers.balanced, &tiers.economy, &tiers.offline] {
                registry.register(id.clone(), Arc::clone(&http));
            }
        }
        Ok(registry)
    }

    /// Route one call. An unregistered id is a provider failure like any other.
    pub async fn recognize(
        &self,
        provider: &ProviderId,
        image: &CaptureImage,
    ) -> Result<RecognitionResponse, GatewayError> {
        let backend = self
            .backends
            .get(provider)
            .ok_or_else(|| GatewayError::UnknownProvider(provider.to_string()))?;
        backend.recognize(provider, image).await
    }
}

// ──────────────────────────────────────────────
// HttpRecognitionBackend
// ──────────────────────────────────────────────

#[derive(Serialize)]
struct ExtractRequest<'a> {
    provider: &'a str,
    image_base64: String,
}

#[derive(Deserialize)]
struct ExtractResponse {
    success: bool,
    #[serde(default)]
    documents: Vec<WireDocument>,
    #[serde(default)]
    document_count: Option<u32>,
    #[serde(default)]
    image_quality: Option<f64>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Document as the service sends it. Every field is optional and the type
/// label is free text.
#[derive(Deserialize, Default)]
#[serde(default)]
struct WireDocument {
    document_type: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    id_number: Option<String>,
    document_number: Option<String>,
    birth_date: Option<String>,
    gender: Option<String>,
    nationality: Option<String>,
    birth_place: Option<String>,
    issue_date: Option<String>,
    expiry_date: Option<String>,
    father_name: Option<String>,
    mother_name: Option<String>,
    is_valid: Option<bool>,
    warnings: Vec<String>,
}

impl WireDocument {
    fn into_record(self) -> ExtractionRecord {
        let document_type = self
            .document_type
            .as_deref()
            .map(DocumentType::from_label)
            .unwrap_or(DocumentType::Other);
        let mut record = ExtractionRecord::empty(document_type);
        let fields = [
            (ExtractionField::GivenName, self.given_name),
            (ExtractionField::FamilyName, self.family_name),
            (ExtractionField::IdNumber, self.id_number),
            (ExtractionField::DocumentNumber, self.document_number),
            (ExtractionField::BirthDate, self.birth_date),
            (ExtractionField::Gender, self.gender),
            (ExtractionField::Nationality, self.nationality),
            (ExtractionField::BirthPlace, self.birth_place),
            (ExtractionField::IssueDate, self.issue_date),
            (ExtractionField::ExpiryDate, self.expiry_date),
            (ExtractionField::FatherName, self.father_name),
            (ExtractionField::MotherName, self.mother_name),
        ];
        for (field, value) in fields {
            record.set(field, value);
        }
        record.is_valid = self.is_valid.unwrap_or(true);
        record.warnings = self.warnings;
        record
    }
}

/// JSON client for a remote recognition service.
///
/// `POST {base_url}/extract` with `{ provider, image_base64 }`.
pub struct HttpRecognitionBackend {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpRecognitionBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Connection(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RecognitionBackend for HttpRecognitionBackend {
    async fn recognize(
        &self,
        provider: &ProviderId,
        image: &CaptureImage,
    ) -> Result<RecognitionResponse, GatewayError> {
        let url = format!("{}/extract", self.base_url);
        let body = ExtractRequest {
            provider: provider.as_str(),
            image_base64: image.to_base64(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    GatewayError::Connection(self.base_url.clone())
                } else {
                    GatewayError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ExtractResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout(self.timeout_secs)
            } else {
                GatewayError::Malformed(e.to_string())
            }
        })?;

        let documents: Vec<ExtractionRecord> = parsed
            .documents
            .into_iter()
            .map(WireDocument::into_record)
            .collect();
        Ok(RecognitionResponse {
            success: parsed.success,
            document_count: parsed.document_count.unwrap_or(documents.len() as u32),
            documents,
            image_quality: parsed
                .image_quality
                .map(|q| q.clamp(0.0, 100.0).round() as u8),
            warnings: parsed.warnings,
            error: parsed.error,
        })
    }
}

// ──────────────────────────────────────────────
// MockRecognitionBackend (testing)
// ──────────────────────────────────────────────

/// Scripted recognition backend.
///
/// Queued results are returned in order; once the queue is empty every
/// call gets the fallback result. Records which providers were asked.
pub struct MockRecognitionBackend {
    queue: Mutex<VecDeque<Result<RecognitionResponse, GatewayError>>>,
    fallback: Result<RecognitionResponse, GatewayError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ProviderId>>,
}

impl MockRecognitionBackend {
    pub fn new(fallback: Result<RecognitionResponse, GatewayError>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always returns these documents.
    pub fn returning(documents: Vec<ExtractionRecord>) -> Self {
        Self::new(Ok(RecognitionResponse::with_documents(documents)))
    }

    /// Always fails with this error.
    pub fn failing(error: GatewayError) -> Self {
        Self::new(Err(error))
    }

    /// Sleep before answering, to model a slow provider.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, result: Result<RecognitionResponse, GatewayError>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(result);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn providers_called(&self) -> Vec<ProviderId> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecognitionBackend for MockRecognitionBackend {
    async fn recognize(
        &self,
        provider: &ProviderId,
        _image: &CaptureImage,
    ) -> Result<RecognitionResponse, GatewayError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(provider.clone());
        }
        let scripted = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> CaptureImage {
        CaptureImage::from_bytes(vec![0xFF, 0xD8, 0xFF]).unwrap()
    }

    #[tokio::test]
    async fn registry_routes_to_registered_backend() {
        let backend = Arc::new(MockRecognitionBackend::returning(vec![
            ExtractionRecord::empty(DocumentType::Passport),
        ]));
        let registry = ProviderRegistry::new().with(ProviderId::new("economy"), backend.clone());

        let response = registry
            .recognize(&ProviderId::new("economy"), &image())
            .await
            .unwrap();
        assert_eq!(response.document_count, 1);
        assert_eq!(backend.providers_called(), vec![ProviderId::new("economy")]);
    }

    #[tokio::test]
    async fn unknown_provider_is_an_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .recognize(&ProviderId::new("premium"), &image())
            .await
            .unwrap_err();
        assert_eq!(err, GatewayError::UnknownProvider("premium".into()));
    }

    #[tokio::test]
    async fn mock_replays_queue_then_fallback() {
        let mock = MockRecognitionBackend::failing(GatewayError::Timeout(60));
        mock.push(Ok(RecognitionResponse::with_documents(Vec::new())));
        let provider = ProviderId::new("offline");

        assert!(mock.recognize(&provider, &image()).await.is_ok());
        assert_eq!(
            mock.recognize(&provider, &image()).await.unwrap_err(),
            GatewayError::Timeout(60)
        );
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn wire_document_normalized() {
        let wire = WireDocument {
            document_type: Some("ID Card".into()),
            given_name: Some("  Jane ".into()),
            family_name: Some("".into()),
            ..WireDocument::default()
        };
        let record = wire.into_record();
        assert_eq!(record.document_type, DocumentType::NationalId);
        assert_eq!(record.given_name.as_deref(), Some("Jane"));
        assert!(record.family_name.is_none());
        assert!(record.is_valid);
    }

    #[test]
    fn config_routes_every_tier_to_remote_service() {
        let config = IntakeConfig {
            recognition_url: Some("http://127.0.0.1:9".into()),
            ..IntakeConfig::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();
        assert_eq!(registry.provider_ids().len(), 4);
        assert!(registry.contains(&config.providers.offline));

        let local_only = ProviderRegistry::from_config(&IntakeConfig::default()).unwrap();
        assert!(local_only.provider_ids().is_empty());
    }

    #[test]
    fn registry_lists_sorted_ids() {
        let backend: Arc<dyn RecognitionBackend> =
            Arc::new(MockRecognitionBackend::returning(Vec::new()));
        let registry = ProviderRegistry::new()
            .with(ProviderId::new("premium"), backend.clone())
            .with(ProviderId::new("economy"), backend);
        assert_eq!(
            registry.provider_ids(),
            vec![ProviderId::new("economy"), ProviderId::new("premium")]
        );
        assert!(registry.contains(&ProviderId::new("premium")));
    }

    mod http {
        use super::super::*;
        use crate::pipeline::extraction::{ExtractionOrchestrator, QualityPolicy, SubmitOptions};
        use wiremock::matchers::{body_partial_json, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        fn image() -> CaptureImage {
            CaptureImage::from_bytes(b"not really a jpeg".to_vec()).unwrap()
        }

        fn backend_for(server: &MockServer) -> HttpRecognitionBackend {
            HttpRecognitionBackend::new(&server.uri(), Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn documents_parsed_from_service_response() {
            let server = MockServer::start().await;
            let body = serde_json::json!({
                "success": true,
                "documents": [{
                    "document_type": "passport",
                    "given_name": "Maria",
                    "family_name": "Silva",
                    "id_number": "P1234567",
                    "birth_date": "14 MAR 1991"
                }],
                "document_count": 1,
                "image_quality": 83.6,
                "warnings": ["low light"]
            });
            Mock::given(method("POST"))
                .and(path("/extract"))
                .and(body_partial_json(serde_json::json!({
                    "provider": "premium",
                    "image_base64": image().to_base64()
                })))
                .respond_with(ResponseTemplate::new(200).set_body_json(&body))
                .expect(1)
                .mount(&server)
                .await;

            let response = backend_for(&server)
                .recognize(&ProviderId::new("premium"), &image())
                .await
                .unwrap();

            assert!(response.success);
            assert_eq!(response.document_count, 1);
            assert_eq!(response.image_quality, Some(84));
            assert_eq!(response.warnings, vec!["low light".to_string()]);
            let doc = &response.documents[0];
            assert_eq!(doc.document_type, DocumentType::Passport);
            assert_eq!(doc.family_name.as_deref(), Some("Silva"));
            assert_eq!(doc.birth_date.as_deref(), Some("14 MAR 1991"));
        }

        #[tokio::test]
        async fn server_error_is_http_status() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/extract"))
                .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
                .mount(&server)
                .await;

            let err = backend_for(&server)
                .recognize(&ProviderId::new("economy"), &image())
                .await
                .unwrap_err();
            assert_eq!(
                err,
                GatewayError::HttpStatus {
                    status: 503,
                    body: "overloaded".into()
                }
            );
        }

        #[tokio::test]
        async fn garbage_body_is_malformed() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/extract"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
                .mount(&server)
                .await;

            let err = backend_for(&server)
                .recognize(&ProviderId::new("economy"), &image())
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::Malformed(_)));
        }

        #[tokio::test]
        async fn remote_failure_falls_back_to_local_provider() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/extract"))
                .respond_with(ResponseTemplate::new(500))
                .expect(1)
                .mount(&server)
                .await;

            let remote = Arc::new(backend_for(&server));
            let mut local_doc = ExtractionRecord::empty(DocumentType::NationalId);
            local_doc.family_name = Some("Local".into());
            let local = Arc::new(MockRecognitionBackend::returning(vec![local_doc]));
            let registry = ProviderRegistry::new()
                .with(ProviderId::new("premium"), remote)
                .with(ProviderId::new("offline"), local);
            let orchestrator = ExtractionOrchestrator::new(
                registry,
                QualityPolicy::default(),
                Duration::from_secs(5),
            );

            let outcome = orchestrator
                .submit(&image(), SubmitOptions::named(ProviderId::new("premium")))
                .await
                .unwrap();
            assert!(outcome.fallback_used);
            assert_eq!(outcome.provider, ProviderId::new("offline"));
            assert_eq!(outcome.documents[0].family_name.as_deref(), Some("Local"));
        }
    }
}
