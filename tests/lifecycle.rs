use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use regex::Regex;

use grievance_server::{
    auth::NewUserFields,
    complaints::{NewComplaint, INITIAL_TIMELINE_NOTE},
    config::Config,
    error::AppError,
    identity::{IdentityService, MemoryIdentity},
    models::{Complaint, ComplaintStatus, Department, UserProfile},
    state::AppState,
    store::{DocumentStore, MemoryStore},
};

fn test_config() -> Config {
    Config {
        port: 0,
        redis_url: String::new(),
        max_login_attempts: 5,
        attempt_window_secs: 900,
    }
}

fn test_state() -> Arc<AppState> {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let identity: Arc<dyn IdentityService> =
        Arc::new(MemoryIdentity::new(5, Duration::from_secs(900)));

    AppState::assemble(test_config(), store, identity)
}

fn fields(name: &str) -> NewUserFields {
    NewUserFields {
        name: name.to_string(),
        phone_number: Some("555-0100".to_string()),
        address: Some("123 Main Street".to_string()),
    }
}

fn new_complaint(department: Department, issue: &str) -> NewComplaint {
    NewComplaint {
        user_name: "John Doe".to_string(),
        address: "123 Main Street, Downtown Area".to_string(),
        issue: issue.to_string(),
        department,
    }
}

async fn registered_user(state: &AppState, email: &str, name: &str) -> UserProfile {
    state
        .auth
        .register(email, "secret1", fields(name))
        .await
        .unwrap()
}

fn id_pattern() -> Regex {
    Regex::new(r"^GRV-\d{4}-\d{3,}$").unwrap()
}

/// Store double that can fail the next profile read or write, delegating
/// everything else to the in-memory store.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    put_profile_error: Mutex<Option<AppError>>,
    get_profile_error: Mutex<Option<AppError>>,
}

impl FlakyStore {
    fn fail_next_put_profile(&self, err: AppError) {
        *self.put_profile_error.lock().unwrap() = Some(err);
    }

    fn fail_next_get_profile(&self, err: AppError) {
        *self.get_profile_error.lock().unwrap() = Some(err);
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn put_profile(&self, profile: &UserProfile) -> Result<(), AppError> {
        if let Some(err) = self.put_profile_error.lock().unwrap().take() {
            return Err(err);
        }
        self.inner.put_profile(profile).await
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        if let Some(err) = self.get_profile_error.lock().unwrap().take() {
            return Err(err);
        }
        self.inner.get_profile(uid).await
    }

    async fn put_complaint(&self, complaint: &Complaint) -> Result<(), AppError> {
        self.inner.put_complaint(complaint).await
    }

    async fn get_complaint(&self, complaint_id: &str) -> Result<Option<Complaint>, AppError> {
        self.inner.get_complaint(complaint_id).await
    }

    async fn complaints_by_owner(&self, uid: &str) -> Result<Vec<Complaint>, AppError> {
        self.inner.complaints_by_owner(uid).await
    }

    async fn all_complaints(&self) -> Result<Vec<Complaint>, AppError> {
        self.inner.all_complaints().await
    }

    async fn next_sequence(&self, year: i32) -> Result<u32, AppError> {
        self.inner.next_sequence(year).await
    }
}

#[tokio::test]
async fn submit_creates_single_submitted_entry() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let complaint = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Transportation, "Bus stop damaged"))
        .await
        .unwrap();

    assert!(id_pattern().is_match(&complaint.complaint_id));
    assert_eq!(complaint.status, ComplaintStatus::Submitted);
    assert_eq!(complaint.timeline.len(), 1);

    let entry = &complaint.timeline[0];
    assert_eq!(entry.status, ComplaintStatus::Submitted);
    assert_eq!(entry.description, INITIAL_TIMELINE_NOTE);
    assert_eq!(complaint.submission_date, complaint.last_updated);
    assert_eq!(complaint.submission_date, entry.date);
}

#[tokio::test]
async fn append_status_is_append_only() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let complaint = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Healthcare, "Clinic closed"))
        .await
        .unwrap();
    let id = complaint.complaint_id.clone();

    let updates = [
        (ComplaintStatus::UnderReview, "Assigned for assessment"),
        (ComplaintStatus::InProgress, "Work started"),
        (ComplaintStatus::Resolved, "Work finished"),
    ];
    for (status, note) in updates {
        state.complaints.append_status(&id, status, note).await.unwrap();
    }

    let stored = state.complaints.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.timeline.len(), 4);
    assert_eq!(stored.status, ComplaintStatus::Resolved);

    for pair in stored.timeline.windows(2) {
        assert!(pair[0].date <= pair[1].date);
    }

    let last = stored.timeline.last().unwrap();
    assert_eq!(last.status, stored.status);
    assert_eq!(last.date, stored.last_updated);

    // The owner query sees the same record.
    let listed = state.complaints.list_by_owner(&user.uid).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], stored);
}

#[tokio::test]
async fn append_status_unknown_id_is_not_found() {
    let state = test_state();

    let err = state
        .complaints
        .append_status("GRV-2099-999", ComplaintStatus::Resolved, "done")
        .await;
    assert!(matches!(err, Err(AppError::NotFound)));
}

#[tokio::test]
async fn find_by_id_unknown_returns_none() {
    let state = test_state();

    let found = state.complaints.find_by_id("GRV-2099-999").await.unwrap();
    assert_eq!(found, None);
}

#[tokio::test]
async fn resolver_prefers_local_overlay() {
    let filed_on = test_state();
    let user = registered_user(&filed_on, "a@b.com", "A").await;
    let complaint = filed_on
        .complaints
        .submit(&user.uid, new_complaint(Department::Education, "School roof leaking"))
        .await
        .unwrap();

    // A state whose store never saw the write: only the overlay can answer.
    let fresh = test_state();
    let resolved = fresh
        .tracker
        .resolve(&complaint.complaint_id, std::slice::from_ref(&complaint))
        .await
        .unwrap();
    assert_eq!(resolved, Some(complaint.clone()));

    let without_overlay = fresh
        .tracker
        .resolve(&complaint.complaint_id, &[])
        .await
        .unwrap();
    assert_eq!(without_overlay, None);
}

#[tokio::test]
async fn resolver_overlay_wins_over_persisted_record() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;
    let complaint = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Sanitation, "Missed pickup"))
        .await
        .unwrap();

    let mut overlay_copy = complaint.clone();
    overlay_copy.issue = "Missed pickup, second week running".to_string();

    let resolved = state
        .tracker
        .resolve(&complaint.complaint_id, &[overlay_copy.clone()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.issue, overlay_copy.issue);
}

#[tokio::test]
async fn resolver_normalizes_id_case() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;
    let complaint = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Sanitation, "Overflowing bins"))
        .await
        .unwrap();

    let lowered = complaint.complaint_id.to_lowercase();
    let resolved = state.tracker.resolve(&lowered, &[]).await.unwrap();
    assert_eq!(resolved, Some(complaint));
}

#[tokio::test]
async fn list_by_owner_scopes_and_orders() {
    let state = test_state();
    let alice = registered_user(&state, "alice@b.com", "Alice").await;
    let bob = registered_user(&state, "bob@b.com", "Bob").await;

    let mut alice_ids = Vec::new();
    for (owner, dept) in [
        (&alice, Department::Sanitation),
        (&bob, Department::Healthcare),
        (&alice, Department::Education),
        (&bob, Department::Transportation),
        (&alice, Department::Transportation),
    ] {
        let complaint = state
            .complaints
            .submit(&owner.uid, new_complaint(dept, "issue"))
            .await
            .unwrap();
        if owner.uid == alice.uid {
            alice_ids.push(complaint.complaint_id);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let listed = state.complaints.list_by_owner(&alice.uid).await.unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|c| c.user_id == alice.uid));

    // Most recent first.
    let listed_ids: Vec<_> = listed.iter().map(|c| c.complaint_id.clone()).collect();
    alice_ids.reverse();
    assert_eq!(listed_ids, alice_ids);
    for pair in listed.windows(2) {
        assert!(pair[0].submission_date >= pair[1].submission_date);
    }

    let everyone = state.complaints.list_all().await.unwrap();
    assert_eq!(everyone.len(), 5);
    for pair in everyone.windows(2) {
        assert!(pair[0].submission_date >= pair[1].submission_date);
    }
}

#[tokio::test]
async fn per_year_ids_are_sequential_and_unique() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let mut ids = Vec::new();
    for _ in 0..3 {
        let complaint = state
            .complaints
            .submit(&user.uid, new_complaint(Department::Sanitation, "issue"))
            .await
            .unwrap();
        ids.push(complaint.complaint_id);
    }

    let year = ids[0].split('-').nth(1).unwrap().to_string();
    assert_eq!(ids[0], format!("GRV-{year}-001"));
    assert_eq!(ids[1], format!("GRV-{year}-002"));
    assert_eq!(ids[2], format!("GRV-{year}-003"));
}

#[tokio::test]
async fn sanitation_scenario_submit_then_resolve() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let complaint = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Sanitation, "Garbage not collected"))
        .await
        .unwrap();
    assert!(id_pattern().is_match(&complaint.complaint_id));
    assert_eq!(complaint.status, ComplaintStatus::Submitted);

    state
        .complaints
        .append_status(&complaint.complaint_id, ComplaintStatus::Resolved, "Fixed")
        .await
        .unwrap();

    let stored = state
        .complaints
        .find_by_id(&complaint.complaint_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.timeline.len(), 2);
    assert_eq!(stored.status, ComplaintStatus::Resolved);
    assert_eq!(stored.timeline[1].status, ComplaintStatus::Resolved);
    assert_eq!(stored.timeline[1].description, "Fixed");
}

#[tokio::test]
async fn duplicate_registration_fails_with_already_exists() {
    let state = test_state();

    registered_user(&state, "a@b.com", "A").await;
    let err = state.auth.register("a@b.com", "other-secret", fields("B")).await;
    assert!(matches!(err, Err(AppError::AlreadyExists)));
}

#[tokio::test]
async fn registration_validates_before_store_access() {
    let state = test_state();

    let bad_email = state.auth.register("not-an-email", "secret1", fields("A")).await;
    assert!(matches!(bad_email, Err(AppError::Validation { field: "email", .. })));

    let short_password = state.auth.register("a@b.com", "12345", fields("A")).await;
    assert!(matches!(
        short_password,
        Err(AppError::Validation { field: "password", .. })
    ));

    let blank_name = state.auth.register("a@b.com", "secret1", fields("  ")).await;
    assert!(matches!(blank_name, Err(AppError::Validation { field: "name", .. })));

    // Nothing reached the credential service: the email is still free.
    assert!(state.auth.register("a@b.com", "secret1", fields("A")).await.is_ok());
}

#[tokio::test]
async fn submit_validates_required_fields() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let mut missing_issue = new_complaint(Department::Healthcare, "");
    missing_issue.issue = String::new();

    let err = state.complaints.submit(&user.uid, missing_issue).await;
    assert!(matches!(err, Err(AppError::Validation { field: "issue", .. })));
    assert!(state.complaints.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_returns_profile_and_rejects_bad_credentials() {
    let state = test_state();
    let registered = registered_user(&state, "a@b.com", "A").await;

    let logged_in = state.auth.login("a@b.com", "secret1").await.unwrap();
    assert_eq!(logged_in, registered);

    let wrong = state.auth.login("a@b.com", "wrong-pass").await;
    assert!(matches!(wrong, Err(AppError::InvalidCredentials)));

    let unknown = state.auth.login("nobody@b.com", "secret1").await;
    assert!(matches!(unknown, Err(AppError::InvalidCredentials)));
}

#[tokio::test]
async fn login_synthesizes_profile_when_record_missing() {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let identity = Arc::new(MemoryIdentity::new(5, Duration::from_secs(900)));

    // Credential exists but the profile write never happened.
    identity
        .create_credential("a@b.com", "secret1", "Jane Doe")
        .await
        .unwrap();

    let state = AppState::assemble(test_config(), store, identity);

    let profile = state.auth.login("a@b.com", "secret1").await.unwrap();
    assert_eq!(profile.email, "a@b.com");
    assert_eq!(profile.name, "Jane Doe");
}

#[tokio::test]
async fn logout_is_idempotent() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let logged_in = state.auth.login("a@b.com", "secret1").await.unwrap();
    let complaints = state.complaints.list_by_owner(&user.uid).await.unwrap();
    let token = state.sessions.open(logged_in, complaints).await;

    state.sessions.close(&token).await;
    assert_eq!(state.sessions.current(&token).await, None);

    state.sessions.close(&token).await;
    assert_eq!(state.sessions.current(&token).await, None);
}

#[tokio::test]
async fn session_seeded_on_login_and_prepended_on_submit() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let first = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Education, "first"))
        .await
        .unwrap();

    let logged_in = state.auth.login("a@b.com", "secret1").await.unwrap();
    let seeded = state.complaints.list_by_owner(&user.uid).await.unwrap();
    let token = state.sessions.open(logged_in, seeded).await;

    let cached = state.sessions.complaints(&token).await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].complaint_id, first.complaint_id);

    let second = state
        .complaints
        .submit(&user.uid, new_complaint(Department::Sanitation, "second"))
        .await
        .unwrap();
    state.sessions.prepend(&token, second.clone()).await;

    let cached = state.sessions.complaints(&token).await.unwrap();
    assert_eq!(cached[0].complaint_id, second.complaint_id);
    assert_eq!(cached[1].complaint_id, first.complaint_id);

    // The just-submitted record resolves through the cache as overlay.
    let resolved = state
        .tracker
        .resolve(&second.complaint_id, &cached)
        .await
        .unwrap();
    assert_eq!(resolved, Some(second));
}

#[tokio::test]
async fn registration_failure_after_credential_leaves_it_usable() {
    let store = Arc::new(FlakyStore::default());
    let identity = Arc::new(MemoryIdentity::new(5, Duration::from_secs(900)));
    let state = AppState::assemble(test_config(), store.clone(), identity);

    store.fail_next_put_profile(AppError::Unavailable("store down".into()));
    let err = state.auth.register("a@b.com", "secret1", fields("Jane Doe")).await;
    assert!(matches!(err, Err(AppError::Unavailable(_))));

    // The credential was not rolled back: the email is taken now.
    let err = state.auth.register("a@b.com", "secret1", fields("Jane Doe")).await;
    assert!(matches!(err, Err(AppError::AlreadyExists)));

    // And it still verifies; login synthesizes the missing profile.
    let profile = state.auth.login("a@b.com", "secret1").await.unwrap();
    assert_eq!(profile.email, "a@b.com");
    assert_eq!(profile.name, "Jane Doe");
}

#[tokio::test]
async fn current_user_degrades_when_profile_store_unreadable() {
    let store = Arc::new(FlakyStore::default());
    let identity = Arc::new(MemoryIdentity::new(5, Duration::from_secs(900)));
    let state = AppState::assemble(test_config(), store.clone(), identity);

    let user = registered_user(&state, "a@b.com", "Jane Doe").await;

    store.fail_next_get_profile(AppError::PermissionDenied);
    let fallback = state.auth.current_user(&user.uid).await.unwrap().unwrap();
    assert_eq!(fallback.email, "a@b.com");
    assert_eq!(fallback.name, "Jane Doe");
    assert_eq!(fallback.phone_number, None);

    store.fail_next_get_profile(AppError::Unavailable("store down".into()));
    let fallback = state.auth.current_user(&user.uid).await.unwrap().unwrap();
    assert_eq!(fallback.name, "Jane Doe");

    // Other error kinds are not masked.
    store.fail_next_get_profile(AppError::Unknown("boom".into()));
    let err = state.auth.current_user(&user.uid).await;
    assert!(matches!(err, Err(AppError::Unknown(_))));

    // With the store healthy again the real record comes back.
    let current = state.auth.current_user(&user.uid).await.unwrap();
    assert_eq!(current, Some(user));
}

#[tokio::test]
async fn current_user_resolves_stored_profile() {
    let state = test_state();
    let user = registered_user(&state, "a@b.com", "A").await;

    let current = state.auth.current_user(&user.uid).await.unwrap();
    assert_eq!(current, Some(user));

    let unknown = state.auth.current_user("missing-uid").await.unwrap();
    assert_eq!(unknown, None);
}
