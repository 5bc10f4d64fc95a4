use std::sync::Arc;

use crate::{
    auth::AuthGateway,
    complaints::ComplaintRepository,
    config::Config,
    error::AppError,
    identity::{IdentityService, RedisIdentity},
    session::SessionRegistry,
    store::{init_redis, DocumentStore, RedisStore},
    tracking::TrackingResolver,
};

/// Context object wiring the gateway, repository, resolver, and session
/// registry over the configured backends. Built once at process start and
/// shared by every handler; nothing here is ambient module state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthGateway,
    pub complaints: ComplaintRepository,
    pub tracker: TrackingResolver,
    pub sessions: SessionRegistry,
}

impl AppState {
    pub async fn new() -> Result<Arc<Self>, AppError> {
        let config = Config::load();

        let connection = init_redis(&config.redis_url).await?;
        let store: Arc<dyn DocumentStore> = Arc::new(RedisStore::new(connection.clone()));
        let identity: Arc<dyn IdentityService> = Arc::new(RedisIdentity::new(
            connection,
            config.max_login_attempts,
            config.attempt_window(),
        ));

        Ok(Self::assemble(config, store, identity))
    }

    /// Wires the components over any store/identity pair. Tests use this
    /// with the in-memory backends.
    pub fn assemble(
        config: Config,
        store: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityService>,
    ) -> Arc<Self> {
        let auth = AuthGateway::new(identity, store.clone());
        let complaints = ComplaintRepository::new(store);
        let tracker = TrackingResolver::new(complaints.clone());

        Arc::new(Self {
            config,
            auth,
            complaints,
            tracker,
            sessions: SessionRegistry::new(),
        })
    }
}
