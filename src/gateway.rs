use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::approval::{ApprovalService, BulkOutcome, PageSelection};
use crate::audit::AuditRecorder;
use crate::config::Config;
use crate::constants::Constants;
use crate::error::{ReservationError, Result};
use crate::models::{AuditLogEntry, Lab, RequestStatus, ReservationRequest};
use crate::traits::{AuditSink, Clock, LabCatalog, ReservationStore};
use crate::wizard::ReservationWizard;

#[derive(Debug, Clone, Copy)]
pub struct GatewayConfig {
    /// Artificial delay applied before every call
    pub latency: Duration,
    pub read_retry_attempts: u32,
    pub read_retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            latency: Duration::ZERO,
            read_retry_attempts: Constants::DEFAULT_READ_RETRY_ATTEMPTS,
            read_retry_base_delay: Duration::from_millis(
                Constants::DEFAULT_READ_RETRY_BASE_DELAY_MS,
            ),
        }
    }
}

impl From<&Config> for GatewayConfig {
    fn from(config: &Config) -> Self {
        Self {
            latency: Duration::from_millis(config.simulated_latency_ms),
            read_retry_attempts: config.read_retry_attempts,
            read_retry_base_delay: Duration::from_millis(config.read_retry_base_delay_ms),
        }
    }
}

/// Creates a linked abort handle / registration pair for one operation
pub fn abort_pair() -> (AbortHandle, AbortRegistration) {
    AbortHandle::new_pair()
}

/// Asynchronous front door to the stores.
///
/// Reads are retried with exponential backoff on transport failures.
/// Mutations are never retried. A mutation can be aborted while it waits
/// out the simulated latency, in which case the stores are untouched; once
/// its write has started it runs to completion on its own task and the
/// caller receives the real outcome.
#[derive(Clone)]
pub struct ReservationGateway {
    store: Arc<dyn ReservationStore>,
    audit: Arc<dyn AuditSink>,
    labs: Arc<dyn LabCatalog>,
    clock: Arc<dyn Clock>,
    approvals: ApprovalService,
    config: GatewayConfig,
}

impl ReservationGateway {
    pub fn new(
        store: Arc<dyn ReservationStore>,
        audit: Arc<dyn AuditSink>,
        labs: Arc<dyn LabCatalog>,
        clock: Arc<dyn Clock>,
        approvals: ApprovalService,
        config: GatewayConfig,
    ) -> Self {
        Self {
            store,
            audit,
            labs,
            clock,
            approvals,
            config,
        }
    }

    async fn simulate_latency(&self) {
        if !self.config.latency.is_zero() {
            sleep(self.config.latency).await;
        }
    }

    async fn retry_read<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.config.read_retry_attempts.max(1);
        let mut attempt = 0;
        loop {
            self.simulate_latency().await;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.config.read_retry_base_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Waits out the simulated latency unless the operation is aborted first
    async fn admit(&self, registration: AbortRegistration) -> Result<()> {
        match Abortable::new(self.simulate_latency(), registration).await {
            Ok(()) => Ok(()),
            Err(_) => Err(ReservationError::Aborted),
        }
    }

    /// Runs a started write on its own task so that dropping or aborting
    /// the caller cannot stop it halfway
    async fn commit<T, Fut>(op: Fut) -> Result<T>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        tokio::spawn(op).await?
    }

    pub async fn list_requests(&self) -> Result<Vec<ReservationRequest>> {
        self.retry_read("list requests", || self.store.list_requests()).await
    }

    pub async fn get_request(&self, id: i64) -> Result<Option<ReservationRequest>> {
        self.retry_read("get request", || self.store.get_request(id)).await
    }

    pub async fn list_audit_entries(&self) -> Result<Vec<AuditLogEntry>> {
        self.retry_read("list audit entries", || self.audit.list_entries()).await
    }

    pub async fn list_labs(&self) -> Result<Vec<Lab>> {
        self.retry_read("list labs", || self.labs.list_labs()).await
    }

    pub async fn get_lab(&self, id: i64) -> Result<Option<Lab>> {
        self.retry_read("get lab", || self.labs.get_lab(id)).await
    }

    /// Submits the wizard's reservation(s); a second call while one is in
    /// flight fails with `SubmissionInFlight`.
    pub async fn submit(
        &self,
        wizard: &mut ReservationWizard,
        recorder: &AuditRecorder,
        registration: AbortRegistration,
    ) -> Result<Vec<ReservationRequest>> {
        let records = wizard.begin_submission()?;

        let result = match self.admit(registration).await {
            Ok(()) => {
                let store = self.store.clone();
                let recorder = recorder.clone();
                let now = self.clock.now_utc();
                let task = async move { store.create_requests(records, now, &recorder).await };
                Self::commit(task).await
            }
            Err(e) => Err(e),
        };

        wizard.finish_submission(result.is_ok());
        match &result {
            Ok(created) => info!(
                "{} submitted {} reservation request(s)",
                recorder.actor().name,
                created.len()
            ),
            Err(e) => warn!("Submission by {} failed: {}", recorder.actor().name, e),
        }
        result
    }

    pub async fn decide(
        &self,
        recorder: &AuditRecorder,
        id: i64,
        target: RequestStatus,
        notes: Option<String>,
        registration: AbortRegistration,
    ) -> Result<ReservationRequest> {
        self.admit(registration).await?;
        let approvals = self.approvals.clone();
        let recorder = recorder.clone();
        Self::commit(async move { approvals.decide(&recorder, id, target, notes).await }).await
    }

    /// Bulk decision over the selected ids; the selection is cleared once
    /// the decisions have been applied
    pub async fn bulk_decide(
        &self,
        recorder: &AuditRecorder,
        selection: &mut PageSelection,
        target: RequestStatus,
        notes: Option<String>,
        registration: AbortRegistration,
    ) -> Result<BulkOutcome> {
        self.admit(registration).await?;
        let approvals = self.approvals.clone();
        let recorder = recorder.clone();
        let ids = selection.ids();
        let task = async move { approvals.decide_each(&recorder, ids, target, notes).await };
        let outcome = Self::commit(task).await?;
        selection.clear();
        Ok(outcome)
    }

    pub async fn cancel(
        &self,
        recorder: &AuditRecorder,
        id: i64,
        reason: Option<String>,
        registration: AbortRegistration,
    ) -> Result<ReservationRequest> {
        self.admit(registration).await?;
        let approvals = self.approvals.clone();
        let recorder = recorder.clone();
        Self::commit(async move { approvals.cancel(&recorder, id, reason).await }).await
    }
}
