//! Tracking resolver. Looks a complaint id up across the session-local
//! overlay first and the durable store second, then computes the derived
//! display state (status badge, completed/current timeline steps).
//!
//! The overlay exists because the store is eventually consistent for the
//! read path: a just-submitted complaint must be trackable before the owner
//! query reflects the write.

use serde::Serialize;

use crate::{
    complaints::ComplaintRepository,
    error::AppError,
    models::{Complaint, ComplaintStatus, TimelineEntry},
    utils::normalize_complaint_id,
};

/// Badge classification for a status, the presentation contract for the
/// dashboard cards and the tracking header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusBadge {
    Done,
    Active,
    Rejected,
    Pending,
}

pub fn status_badge(status: ComplaintStatus) -> StatusBadge {
    match status {
        ComplaintStatus::Resolved => StatusBadge::Done,
        ComplaintStatus::UnderReview | ComplaintStatus::InProgress => StatusBadge::Active,
        ComplaintStatus::Rejected => StatusBadge::Rejected,
        ComplaintStatus::Submitted => StatusBadge::Pending,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineStep {
    #[serde(flatten)]
    pub entry: TimelineEntry,
    pub completed: bool,
    pub current: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingView {
    #[serde(flatten)]
    pub complaint: Complaint,
    pub badge: StatusBadge,
    pub steps: Vec<TimelineStep>,
}

/// A step is completed once a later entry exists, or immediately when the
/// complaint reached a terminal status. Only the last step of a still-open
/// complaint is "current"; terminal complaints (Resolved or Rejected) have
/// no current step.
pub fn timeline_steps(complaint: &Complaint) -> Vec<TimelineStep> {
    let last = complaint.timeline.len().saturating_sub(1);
    let terminal = complaint.status.is_terminal();

    complaint
        .timeline
        .iter()
        .enumerate()
        .map(|(i, entry)| TimelineStep {
            entry: entry.clone(),
            completed: i < last || terminal,
            current: i == last && !terminal,
        })
        .collect()
}

pub fn tracking_view(complaint: Complaint) -> TrackingView {
    TrackingView {
        badge: status_badge(complaint.status),
        steps: timeline_steps(&complaint),
        complaint,
    }
}

#[derive(Clone)]
pub struct TrackingResolver {
    repo: ComplaintRepository,
}

impl TrackingResolver {
    pub fn new(repo: ComplaintRepository) -> Self {
        Self { repo }
    }

    /// Resolves an id to a single record. Overlay entries win over
    /// persisted records with the same id.
    pub async fn resolve(
        &self,
        complaint_id: &str,
        overlay: &[Complaint],
    ) -> Result<Option<Complaint>, AppError> {
        let id = normalize_complaint_id(complaint_id);

        if let Some(hit) = overlay.iter().find(|c| c.complaint_id == id) {
            return Ok(Some(hit.clone()));
        }

        self.repo.find_by_id(&id).await
    }
}
