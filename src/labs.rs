use std::sync::Arc;

use tracing::info;

use crate::audit::AuditRecorder;
use crate::error::{ReservationError, Result};
use crate::models::{ActionType, Lab, LabStatus};
use crate::traits::{AuditSink, Clock, LabCatalog};

/// Labs whose name or description contains `term`, ignoring case
pub fn search_labs<'a>(labs: &'a [Lab], term: &str) -> Vec<&'a Lab> {
    let term = term.trim().to_lowercase();
    labs.iter()
        .filter(|lab| {
            term.is_empty()
                || lab.name.to_lowercase().contains(&term)
                || lab.description.to_lowercase().contains(&term)
        })
        .collect()
}

/// Administrative lab operations
pub struct LabDirectory {
    labs: Arc<dyn LabCatalog>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl LabDirectory {
    pub fn new(
        labs: Arc<dyn LabCatalog>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { labs, audit, clock }
    }

    pub async fn set_status(
        &self,
        recorder: &AuditRecorder,
        id: i64,
        status: LabStatus,
    ) -> Result<Lab> {
        let lab = self
            .labs
            .get_lab(id)
            .await?
            .ok_or(ReservationError::NotFound(id))?;
        if lab.status == status {
            return Ok(lab);
        }
        if !self.labs.set_lab_status(id, status).await? {
            return Err(ReservationError::NotFound(id));
        }

        self.audit
            .append(recorder.entry(
                ActionType::LabStatusChanged,
                format!("{} changed from {} to {}", lab.name, lab.status, status),
                Some(id),
                self.clock.now_utc(),
            ))
            .await?;
        info!("Lab {} is now {}", lab.name, status);

        Ok(Lab { status, ..lab })
    }
}
