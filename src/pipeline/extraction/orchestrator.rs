//! Capture → recognized documents.
//!
//! State machine: `idle → capturing → extracting → {ready | failed | no_document}`.
//! The provider call is the only suspension point. Every submission carries a
//! sequence number; a result whose number is no longer current is discarded,
//! which is how starting a new capture cancels a stuck extraction.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::policy::{QualityPolicy, QualityReport};
use super::quality::{LocalQualityAssessor, QualityAssessor};
use super::{ExtractionError, ProviderId, ProviderMode};
use crate::config::IntakeConfig;
use crate::gateway::{
    CaptureImage, GatewayError, PersistenceGateway, ProviderRegistry, RecognitionResponse,
};
use crate::models::{ExtractionRecord, ScanRecord};
use crate::pipeline::normalize::apply_document_checks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionState {
    Idle,
    Capturing,
    Extracting,
    Ready,
    Failed,
    NoDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOptions {
    pub mode: ProviderMode,
    /// Assessment received with the image; skips local measurement.
    #[serde(default)]
    pub quality: Option<QualityReport>,
}

impl SubmitOptions {
    pub fn auto() -> Self {
        Self::default()
    }

    pub fn named(provider: ProviderId) -> Self {
        Self {
            mode: ProviderMode::Named(provider),
            quality: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            mode: ProviderMode::Offline,
            quality: None,
        }
    }

    pub fn with_quality(mut self, report: QualityReport) -> Self {
        self.quality = Some(report);
        self
    }
}

/// Documents recognized in one capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub sequence: u64,
    /// Provider whose output `documents` is.
    pub provider: ProviderId,
    pub fallback_used: bool,
    /// Why the first provider was abandoned, when `fallback_used`.
    pub primary_error: Option<String>,
    pub documents: Vec<ExtractionRecord>,
    pub document_count: u32,
    pub quality: Option<QualityReport>,
    /// Warnings as the provider returned them.
    pub warnings: Vec<String>,
}

struct Machine {
    state: ExtractionState,
    sequence: u64,
}

pub struct ExtractionOrchestrator {
    registry: Arc<ProviderRegistry>,
    policy: QualityPolicy,
    assessor: Arc<dyn QualityAssessor>,
    scans: Option<Arc<dyn PersistenceGateway>>,
    timeout: Duration,
    machine: Mutex<Machine>,
}

impl ExtractionOrchestrator {
    pub fn new(registry: ProviderRegistry, policy: QualityPolicy, timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            policy,
            assessor: Arc::new(LocalQualityAssessor),
            scans: None,
            timeout,
            machine: Mutex::new(Machine {
                state: ExtractionState::Idle,
                sequence: 0,
            }),
        }
    }

    pub fn from_config(config: &IntakeConfig, registry: ProviderRegistry) -> Self {
        Self::new(
            registry,
            QualityPolicy::new(config.providers.clone()),
            config.provider_timeout(),
        )
    }

    pub fn with_assessor(mut self, assessor: Arc<dyn QualityAssessor>) -> Self {
        self.assessor = assessor;
        self
    }

    /// Register a scan record for every successful provider call.
    pub fn with_scan_log(mut self, scans: Arc<dyn PersistenceGateway>) -> Self {
        self.scans = Some(scans);
        self
    }

    /// Fresh state machine sharing providers, policy and scan log. Used by
    /// the offline replay so it never supersedes a live capture.
    pub fn detached(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            policy: self.policy.clone(),
            assessor: Arc::clone(&self.assessor),
            scans: self.scans.clone(),
            timeout: self.timeout,
            machine: Mutex::new(Machine {
                state: ExtractionState::Idle,
                sequence: 0,
            }),
        }
    }

    pub fn policy(&self) -> &QualityPolicy {
        &self.policy
    }

    fn machine(&self) -> MutexGuard<'_, Machine> {
        // state is two plain fields; a poisoned lock still holds valid data
        self.machine.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> ExtractionState {
        self.machine().state
    }

    pub fn current_sequence(&self) -> u64 {
        self.machine().sequence
    }

    /// Enter `capturing`. Any extraction still in flight becomes stale.
    pub fn begin_capture(&self) -> u64 {
        let mut m = self.machine();
        if m.state == ExtractionState::Extracting {
            debug!(sequence = m.sequence, "New capture supersedes in-flight extraction");
        }
        m.sequence += 1;
        m.state = ExtractionState::Capturing;
        m.sequence
    }

    /// Abandon the current capture or extraction.
    pub fn cancel(&self) {
        let mut m = self.machine();
        if matches!(
            m.state,
            ExtractionState::Capturing | ExtractionState::Extracting
        ) {
            m.sequence += 1;
            m.state = ExtractionState::Idle;
        }
    }

    /// Back to `idle` from any state.
    pub fn reset(&self) {
        let mut m = self.machine();
        m.sequence += 1;
        m.state = ExtractionState::Idle;
    }

    fn start_extraction(&self) -> u64 {
        let mut m = self.machine();
        if m.state != ExtractionState::Capturing {
            m.sequence += 1;
        }
        m.state = ExtractionState::Extracting;
        m.sequence
    }

    /// Apply a terminal state if `sequence` is still current.
    fn settle(&self, sequence: u64, state: ExtractionState) -> Result<(), ExtractionError> {
        let mut m = self.machine();
        if m.sequence != sequence {
            debug!(sequence, current = m.sequence, "Discarding stale extraction result");
            return Err(ExtractionError::Superseded { sequence });
        }
        m.state = state;
        Ok(())
    }

    /// Recognize the documents in `image`.
    ///
    /// A provider failure is retried once on the offline provider. No
    /// document detected is a result, never a reason to fall back.
    pub async fn submit(
        &self,
        image: &CaptureImage,
        options: SubmitOptions,
    ) -> Result<ExtractionOutcome, ExtractionError> {
        let sequence = self.start_extraction();
        let (provider, quality) = self.choose_provider(image, options).await;
        if self.machine().sequence != sequence {
            debug!(sequence, "Capture superseded during quality assessment");
            return Err(ExtractionError::Superseded { sequence });
        }
        let offline = self.policy.tiers().offline.clone();
        debug!(sequence, provider = %provider, "Extraction started");

        let (response, provider, primary_error) = match self.call(&provider, image).await {
            Ok(response) => (response, provider, None),
            Err(primary) if provider == offline => {
                warn!(sequence, provider = %provider, error = %primary, "Offline provider failed");
                self.settle(sequence, ExtractionState::Failed)?;
                return Err(ExtractionError::ExtractionFailed {
                    primary: primary.to_string(),
                    fallback: None,
                });
            }
            Err(primary) => {
                warn!(
                    sequence,
                    provider = %provider,
                    error = %primary,
                    "Provider failed, falling back to offline"
                );
                if self.machine().sequence != sequence {
                    return Err(ExtractionError::Superseded { sequence });
                }
                match self.call(&offline, image).await {
                    Ok(response) => (response, offline, Some(primary.to_string())),
                    Err(fallback) => {
                        warn!(sequence, error = %fallback, "Offline fallback failed");
                        self.settle(sequence, ExtractionState::Failed)?;
                        return Err(ExtractionError::ExtractionFailed {
                            primary: primary.to_string(),
                            fallback: Some(fallback.to_string()),
                        });
                    }
                }
            }
        };
        let fallback_used = primary_error.is_some();

        self.register_scan(image, &provider, fallback_used, &response, quality.as_ref())
            .await;

        let today = Utc::now().date_naive();
        let mut documents = response.documents;
        for document in &mut documents {
            apply_document_checks(document, today);
        }

        if documents.is_empty() {
            self.settle(sequence, ExtractionState::NoDocument)?;
            info!(sequence, provider = %provider, "No document detected");
            return Err(ExtractionError::NoDocumentDetected);
        }

        self.settle(sequence, ExtractionState::Ready)?;
        info!(
            sequence,
            provider = %provider,
            fallback_used,
            documents = documents.len(),
            "Extraction complete"
        );
        Ok(ExtractionOutcome {
            sequence,
            provider,
            fallback_used,
            primary_error,
            document_count: documents.len() as u32,
            documents,
            quality,
            warnings: response.warnings,
        })
    }

    async fn choose_provider(
        &self,
        image: &CaptureImage,
        options: SubmitOptions,
    ) -> (ProviderId, Option<QualityReport>) {
        match options.mode {
            ProviderMode::Named(provider) => (provider, options.quality),
            ProviderMode::Offline => (self.policy.tiers().offline.clone(), options.quality),
            ProviderMode::Auto => {
                let report = match options.quality {
                    Some(report) => Some(report),
                    None => self.assess(image).await,
                };
                let provider = match &report {
                    Some(report) => report
                        .suggested_provider
                        .clone()
                        .unwrap_or_else(|| self.policy.select(report)),
                    None => self.policy.unassessed(),
                };
                if let Some(report) = &report {
                    debug!(score = report.score, provider = %provider, "Provider selected by quality");
                }
                (provider, report)
            }
        }
    }

    /// Decode and measure off the runtime threads. `None` when the image
    /// cannot be assessed.
    async fn assess(&self, image: &CaptureImage) -> Option<QualityReport> {
        let assessor = Arc::clone(&self.assessor);
        let image = image.clone();
        let measured = tokio::task::spawn_blocking(move || assessor.measure(&image)).await;
        match measured {
            Ok(Ok(measurements)) => Some(self.policy.assess(&measurements)),
            Ok(Err(e)) => {
                warn!(error = %e, "Quality assessment unavailable");
                None
            }
            Err(e) => {
                warn!(error = %e, "Quality assessment task failed");
                None
            }
        }
    }

    /// One provider call. Timeouts and `success: false` are failures.
    async fn call(
        &self,
        provider: &ProviderId,
        image: &CaptureImage,
    ) -> Result<RecognitionResponse, GatewayError> {
        let response = tokio::time::timeout(self.timeout, self.registry.recognize(provider, image))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs()))??;
        if !response.success {
            return Err(GatewayError::ProviderFailure(
                response
                    .error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            ));
        }
        Ok(response)
    }

    async fn register_scan(
        &self,
        image: &CaptureImage,
        provider: &ProviderId,
        fallback_used: bool,
        response: &RecognitionResponse,
        quality: Option<&QualityReport>,
    ) {
        let Some(scans) = &self.scans else {
            return;
        };
        let record = ScanRecord {
            id: Uuid::new_v4(),
            provider: provider.to_string(),
            fallback_used,
            document_count: response.documents.len() as u32,
            quality_score: quality.map(|q| q.score).or(response.image_quality),
            image_sha256: image.content_hash(),
            created_at: Utc::now().naive_utc(),
        };
        if let Err(e) = scans.record_scan(record).await {
            warn!(provider = %provider, error = %e, "Scan registration failed");
        }
    }
}
