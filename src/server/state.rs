use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

use crate::jobs::JobStore;
use crate::scoring::ProfileRegistry;

use super::ServerConfig;

pub type GuardedJobStore = Arc<dyn JobStore>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_store: GuardedJobStore,
    pub profiles: Arc<ProfileRegistry>,
}

impl FromRef<ServerState> for GuardedJobStore {
    fn from_ref(input: &ServerState) -> Self {
        input.job_store.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
