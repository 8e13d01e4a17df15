use crate::heartbeat::HeartbeatRegistry;
use crate::queue::BuildQueue;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub queue: BuildQueue,
    pub heartbeats: HeartbeatRegistry,
}

impl AppState {
    pub fn new(pool: Pool, stale_after: chrono::Duration) -> Self {
        Self {
            queue: BuildQueue::new(pool.clone()),
            heartbeats: HeartbeatRegistry::new(pool.clone(), stale_after),
            pool,
        }
    }
}
