//! # Document store
//!
//! Two logical collections behind one async boundary:
//!
//! - `users`, keyed by the identity service's uid
//! - `complaints`, keyed by complaint id, queryable by owner and orderable
//!   by submission date
//!
//! The production backend is redis: records are JSON strings under
//! `user:<uid>` / `complaint:<id>`, with sorted-set indexes
//! (`complaints:owner:<uid>`, `complaints:all`) scored by submission
//! timestamp so owner queries come back most-recent-first without a scan.
//! A record write is a single `SET`, which gives the one-document atomicity
//! the timeline append relies on (no partial timeline is ever visible).
//!
//! Per-year id sequences live under `complaint:seq:<year>` and are reserved
//! with `INCR`, so two concurrent submissions can never be handed the same
//! complaint id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    error::AppError,
    models::{Complaint, UserProfile},
};

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(500));

    let client = Client::open(redis_url).map_err(AppError::from)?;
    let connection = client
        .get_connection_manager_with_config(config)
        .await
        .map_err(AppError::from)?;

    Ok(connection)
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError>;
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError>;

    /// Writes the whole complaint record in one shot. Used for both the
    /// initial insert and the status-append rewrite.
    async fn put_complaint(&self, complaint: &Complaint) -> Result<(), AppError>;
    async fn get_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, AppError>;
    async fn complaints_by_owner(&self, uid: &str) -> Result<Vec<Complaint>, AppError>;
    async fn all_complaints(&self) -> Result<Vec<Complaint>, AppError>;

    /// Reserves the next per-year id sequence number. Must be atomic across
    /// concurrent submissions.
    async fn next_sequence(&self, year: i32) -> Result<u32, AppError>;
}

pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    fn profile_key(uid: &str) -> String {
        format!("user:{uid}")
    }

    fn complaint_key(id: &str) -> String {
        format!("complaint:{id}")
    }

    fn owner_index_key(uid: &str) -> String {
        format!("complaints:owner:{uid}")
    }

    const ALL_INDEX_KEY: &'static str = "complaints:all";

    async fn fetch_ordered(&self, index_key: &str) -> Result<Vec<Complaint>, AppError> {
        let mut conn = self.connection.clone();

        let ids: Vec<String> = conn.zrevrange(index_key, 0, -1).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| Self::complaint_key(id)).collect();
        let raw: Vec<Option<String>> = conn.mget(&keys).await?;

        let mut complaints = Vec::with_capacity(raw.len());
        for (id, value) in ids.iter().zip(raw) {
            match value {
                Some(json) => complaints.push(serde_json::from_str(&json)?),
                // Index entry without a record means a torn delete; skip it.
                None => debug!("index entry {id} has no backing record"),
            }
        }

        Ok(complaints)
    }
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(profile)?;

        conn.set::<_, _, ()>(Self::profile_key(&profile.uid), json)
            .await?;

        Ok(())
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(Self::profile_key(uid)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_complaint(&self, complaint: &Complaint) -> Result<(), AppError> {
        let mut conn = self.connection.clone();
        let json = serde_json::to_string(complaint)?;
        let score = complaint.submission_date.timestamp_millis();

        redis::pipe()
            .set(Self::complaint_key(&complaint.complaint_id), json)
            .ignore()
            .zadd(
                Self::owner_index_key(&complaint.user_id),
                &complaint.complaint_id,
                score,
            )
            .ignore()
            .zadd(Self::ALL_INDEX_KEY, &complaint.complaint_id, score)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn get_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, AppError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = conn.get(Self::complaint_key(complaint_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn complaints_by_owner(&self, uid: &str) -> Result<Vec<Complaint>, AppError> {
        self.fetch_ordered(&Self::owner_index_key(uid)).await
    }

    async fn all_complaints(&self) -> Result<Vec<Complaint>, AppError> {
        self.fetch_ordered(Self::ALL_INDEX_KEY).await
    }

    async fn next_sequence(&self, year: i32) -> Result<u32, AppError> {
        let mut conn = self.connection.clone();

        let seq: u32 = conn.incr(format!("complaint:seq:{year}"), 1u32).await?;
        Ok(seq)
    }
}

/// In-memory store with the same contract, used by the integration tests
/// and for running without a redis instance.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    profiles: HashMap<String, UserProfile>,
    complaints: HashMap<String, (u64, Complaint)>,
    sequences: HashMap<i32, u32>,
    insertions: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sort_most_recent_first(mut complaints: Vec<(u64, Complaint)>) -> Vec<Complaint> {
    // Insertion order breaks submission-timestamp ties deterministically.
    complaints.sort_by(|(seq_a, a), (seq_b, b)| {
        (b.submission_date, seq_b).cmp(&(a.submission_date, seq_a))
    });
    complaints.into_iter().map(|(_, c)| c).collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        inner.profiles.insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.profiles.get(uid).cloned())
    }

    async fn put_complaint(&self, complaint: &Complaint) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;

        let seq = match inner.complaints.get(&complaint.complaint_id) {
            Some((seq, _)) => *seq,
            None => {
                inner.insertions += 1;
                inner.insertions
            }
        };
        inner
            .complaints
            .insert(complaint.complaint_id.clone(), (seq, complaint.clone()));

        Ok(())
    }

    async fn get_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.complaints.get(complaint_id).map(|(_, c)| c.clone()))
    }

    async fn complaints_by_owner(&self, uid: &str) -> Result<Vec<Complaint>, AppError> {
        let inner = self.inner.lock().await;

        let owned = inner
            .complaints
            .values()
            .filter(|(_, c)| c.user_id == uid)
            .cloned()
            .collect();

        Ok(sort_most_recent_first(owned))
    }

    async fn all_complaints(&self) -> Result<Vec<Complaint>, AppError> {
        let inner = self.inner.lock().await;
        Ok(sort_most_recent_first(
            inner.complaints.values().cloned().collect(),
        ))
    }

    async fn next_sequence(&self, year: i32) -> Result<u32, AppError> {
        let mut inner = self.inner.lock().await;

        let seq = inner.sequences.entry(year).or_insert(0);
        *seq += 1;

        Ok(*seq)
    }
}
