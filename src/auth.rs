//! Identity gateway. Wraps the credential service and the profile
//! collection into the register/login/current-user operations the rest of
//! the service consumes. All validation happens here, before any store
//! access.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    error::AppError,
    identity::{Credential, IdentityService},
    models::UserProfile,
    store::DocumentStore,
    utils::{validate_email, validate_password, validate_required},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUserFields {
    pub name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone)]
pub struct AuthGateway {
    identity: Arc<dyn IdentityService>,
    store: Arc<dyn DocumentStore>,
}

impl AuthGateway {
    pub fn new(identity: Arc<dyn IdentityService>, store: Arc<dyn DocumentStore>) -> Self {
        Self { identity, store }
    }

    /// Creates the credential and the profile record as one logical unit.
    /// The two writes are not transactional: a profile-write failure is
    /// surfaced as a failed registration and the credential is left behind
    /// (known limitation, not rolled back).
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        fields: NewUserFields,
    ) -> Result<UserProfile, AppError> {
        validate_email(email)?;
        validate_password(password)?;
        validate_required("name", &fields.name)?;

        let credential = self
            .identity
            .create_credential(email, password, &fields.name)
            .await?;

        let profile = UserProfile {
            uid: credential.uid.clone(),
            email: credential.email.clone(),
            name: fields.name,
            phone_number: fields.phone_number.filter(|s| !s.trim().is_empty()),
            address: fields.address.filter(|s| !s.trim().is_empty()),
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.put_profile(&profile).await {
            warn!(
                uid = %credential.uid,
                "profile write failed after credential creation, credential orphaned: {err}"
            );
            return Err(err);
        }

        info!(uid = %profile.uid, "registered new user");
        Ok(profile)
    }

    /// Verifies credentials and resolves the caller's profile. A missing
    /// profile record is a data inconsistency, not a login failure: the
    /// profile is synthesized from the credential instead.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AppError> {
        validate_email(email)?;
        validate_required("password", password)?;

        let credential = self.identity.verify_credential(email, password).await?;

        match self.store.get_profile(&credential.uid).await? {
            Some(profile) => Ok(profile),
            None => {
                warn!(uid = %credential.uid, "no profile record, synthesizing from credential");
                Ok(synthesize_profile(&credential))
            }
        }
    }

    /// Resolves a uid to its profile, used to re-establish a session on
    /// restart. An unreadable profile store degrades to a synthesized
    /// profile rather than signing the user out.
    pub async fn current_user(&self, uid: &str) -> Result<Option<UserProfile>, AppError> {
        let Some(credential) = self.identity.lookup(uid).await? else {
            return Ok(None);
        };

        match self.store.get_profile(uid).await {
            Ok(profile) => Ok(profile),
            Err(AppError::PermissionDenied) | Err(AppError::Unavailable(_)) => {
                Ok(Some(synthesize_profile(&credential)))
            }
            Err(err) => Err(err),
        }
    }
}

fn synthesize_profile(credential: &Credential) -> UserProfile {
    let name = if credential.display_name.trim().is_empty() {
        "User".to_string()
    } else {
        credential.display_name.clone()
    };

    UserProfile {
        uid: credential.uid.clone(),
        email: credential.email.clone(),
        name,
        phone_number: None,
        address: None,
        created_at: Utc::now(),
    }
}
