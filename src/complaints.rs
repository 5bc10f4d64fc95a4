//! Complaint repository: the sole writer of complaint records. Owns id
//! generation and the timeline append semantics. Every mutation is a whole
//! record rewrite, which the store applies as one atomic document write.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use serde::Deserialize;
use tracing::info;

use crate::{
    error::AppError,
    models::{Complaint, ComplaintStatus, Department, TimelineEntry},
    store::DocumentStore,
    utils::validate_required,
};

pub const INITIAL_TIMELINE_NOTE: &str = "Complaint received and registered";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComplaint {
    pub user_name: String,
    pub address: String,
    pub issue: String,
    pub department: Department,
}

#[derive(Clone)]
pub struct ComplaintRepository {
    store: Arc<dyn DocumentStore>,
}

impl ComplaintRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Files a new complaint. The id is `GRV-<year>-<seq>` where the
    /// sequence is a per-year counter reserved atomically in the store, so
    /// concurrent submissions never collide.
    pub async fn submit(&self, owner_uid: &str, fields: NewComplaint) -> Result<Complaint, AppError> {
        validate_required("userName", &fields.user_name)?;
        validate_required("address", &fields.address)?;
        validate_required("issue", &fields.issue)?;

        let now = Utc::now();
        let year = now.year();
        let seq = self.store.next_sequence(year).await?;
        let complaint_id = format!("GRV-{year}-{seq:03}");

        let complaint = Complaint {
            complaint_id,
            user_id: owner_uid.to_string(),
            user_name: fields.user_name,
            address: fields.address,
            issue: fields.issue,
            department: fields.department,
            status: ComplaintStatus::Submitted,
            submission_date: now,
            last_updated: now,
            timeline: vec![TimelineEntry {
                status: ComplaintStatus::Submitted,
                date: now,
                description: INITIAL_TIMELINE_NOTE.to_string(),
            }],
        };

        self.store.put_complaint(&complaint).await?;

        info!(
            id = %complaint.complaint_id,
            department = %complaint.department,
            "complaint filed"
        );

        Ok(complaint)
    }

    /// The owner's complaints, most recent first. Empty for owners with no
    /// records.
    pub async fn list_by_owner(&self, owner_uid: &str) -> Result<Vec<Complaint>, AppError> {
        self.store.complaints_by_owner(owner_uid).await
    }

    /// Exact-match lookup; callers normalize the id to uppercase first.
    pub async fn find_by_id(&self, complaint_id: &str) -> Result<Option<Complaint>, AppError> {
        self.store.get_complaint(complaint_id).await
    }

    /// Appends one timeline entry and moves the complaint to `new_status`.
    /// The only mutation path; top-level status and last_updated always
    /// follow the final entry.
    pub async fn append_status(
        &self,
        complaint_id: &str,
        new_status: ComplaintStatus,
        description: &str,
    ) -> Result<(), AppError> {
        let Some(mut complaint) = self.store.get_complaint(complaint_id).await? else {
            return Err(AppError::NotFound);
        };

        let now = Utc::now();
        complaint.timeline.push(TimelineEntry {
            status: new_status,
            date: now,
            description: description.to_string(),
        });
        complaint.status = new_status;
        complaint.last_updated = now;

        self.store.put_complaint(&complaint).await?;

        info!(id = %complaint_id, status = %new_status, "complaint status updated");
        Ok(())
    }

    /// Every complaint across all owners, most recent first. Unscoped
    /// administrative read; authorization is the caller's concern.
    pub async fn list_all(&self) -> Result<Vec<Complaint>, AppError> {
        self.store.all_complaints().await
    }
}
