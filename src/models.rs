use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Municipal departments a complaint can be filed against. Closed set;
/// extending it is a deploy, not a data migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    Healthcare,
    Sanitation,
    Transportation,
    Education,
}

impl Department {
    pub fn as_str(&self) -> &'static str {
        match self {
            Department::Healthcare => "Healthcare",
            Department::Sanitation => "Sanitation",
            Department::Transportation => "Transportation",
            Department::Education => "Education",
        }
    }
}

impl fmt::Display for Department {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complaint lifecycle states. Submitted -> Under Review -> In Progress ->
/// Resolved is the happy path; Rejected is the terminal alternate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintStatus {
    Submitted,
    #[serde(rename = "Under Review")]
    UnderReview,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
    Rejected,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Submitted => "Submitted",
            ComplaintStatus::UnderReview => "Under Review",
            ComplaintStatus::InProgress => "In Progress",
            ComplaintStatus::Resolved => "Resolved",
            ComplaintStatus::Rejected => "Rejected",
        }
    }

    /// Resolved and Rejected both close the complaint; nothing is appended
    /// after them in practice and the timeline renders them as finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ComplaintStatus::Resolved | ComplaintStatus::Rejected)
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable status-change record in a complaint's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: ComplaintStatus,
    pub date: DateTime<Utc>,
    pub description: String,
}

/// A filed grievance. The timeline is append-only: the first entry is always
/// Submitted at `submission_date`, the last entry always matches `status`
/// and `last_updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub complaint_id: String,
    pub user_id: String,
    pub user_name: String,
    pub address: String,
    pub issue: String,
    pub department: Department,
    pub status: ComplaintStatus,
    pub submission_date: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub timeline: Vec<TimelineEntry>,
}

/// Profile record created once at registration, keyed by the identity
/// service's uid. Effectively immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}
