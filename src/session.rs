//! Session registry: the in-memory state of signed-in identities. Each
//! session holds a read-through cache of its owner's complaints, seeded
//! from the repository at login and prepended optimistically on submit.
//! Staleness is accepted until the next login or explicit reload; there is
//! no background refresh.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::models::{Complaint, ComplaintStatus, UserProfile};

struct SessionState {
    profile: UserProfile,
    complaints: Vec<Complaint>,
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionState>>,
    identity_tx: watch::Sender<Option<String>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            sessions: RwLock::new(HashMap::new()),
            identity_tx,
        }
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for a signed-in identity, seeded with the complaint
    /// set loaded from the repository. Returns the session token.
    pub async fn open(&self, profile: UserProfile, complaints: Vec<Complaint>) -> String {
        let token = Uuid::new_v4().to_string();
        let uid = profile.uid.clone();

        self.sessions
            .write()
            .await
            .insert(token.clone(), SessionState { profile, complaints });

        self.identity_tx.send_replace(Some(uid));
        token
    }

    /// Clears the session. Idempotent: closing an unknown or already-closed
    /// token is a no-op. Subscribers only hear a sign-out when a live
    /// session was actually removed.
    pub async fn close(&self, token: &str) {
        if self.sessions.write().await.remove(token).is_some() {
            self.identity_tx.send_replace(None);
        }
    }

    pub async fn current(&self, token: &str) -> Option<UserProfile> {
        self.sessions
            .read()
            .await
            .get(token)
            .map(|s| s.profile.clone())
    }

    /// The cached complaint set, or `None` when no session exists for the
    /// token.
    pub async fn complaints(&self, token: &str) -> Option<Vec<Complaint>> {
        self.sessions
            .read()
            .await
            .get(token)
            .map(|s| s.complaints.clone())
    }

    /// Optimistic update after a successful submit: the new complaint goes
    /// to the front without waiting for a fresh repository read.
    pub async fn prepend(&self, token: &str, complaint: Complaint) {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.complaints.insert(0, complaint);
        }
    }

    /// Replaces the cached set wholesale, used on explicit reload.
    pub async fn replace(&self, token: &str, complaints: Vec<Complaint>) {
        if let Some(session) = self.sessions.write().await.get_mut(token) {
            session.complaints = complaints;
        }
    }

    /// Fires with the current uid (or none) on every login/logout, so a
    /// restarted frontend can re-establish its session state.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.identity_tx.subscribe()
    }

    pub async fn stats(&self, token: &str) -> Option<DashboardStats> {
        self.complaints(token)
            .await
            .map(|complaints| dashboard_stats(&complaints))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total: usize,
    pub in_progress: usize,
    pub resolved: usize,
    /// Percentage of resolved complaints, 0 when there are none at all.
    pub resolution_rate: u32,
}

pub fn dashboard_stats(complaints: &[Complaint]) -> DashboardStats {
    let total = complaints.len();
    let in_progress = complaints
        .iter()
        .filter(|c| c.status == ComplaintStatus::InProgress)
        .count();
    let resolved = complaints
        .iter()
        .filter(|c| c.status == ComplaintStatus::Resolved)
        .count();
    let resolution_rate = if total == 0 {
        0
    } else {
        (resolved * 100 / total) as u32
    };

    DashboardStats {
        total,
        in_progress,
        resolved,
        resolution_rate,
    }
}
