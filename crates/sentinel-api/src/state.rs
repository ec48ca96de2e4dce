//! Shared application state.

use std::sync::Arc;

use sentinel_core::clock::Clock;
use sentinel_core::store::{EventStore, TransactionalStore};
use sentinel_org::application::command_handlers::OrgContext;
use sentinel_org::domain::events::ORG_TOPICS;
use sentinel_outbox::worker::EventWorker;
use sentinel_outbox::writer::OutboxWriter;
use sentinel_resilience::executor::GuardedExecutor;
use sentinel_resilience::rate_limit::RateLimiter;
use sentinel_resilience::registry::CircuitBreakerRegistry;

use crate::config::Config;
use crate::error::ServerError;
use crate::notifications::register_org_handlers;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Guards the operational endpoints.
    pub executor: GuardedExecutor,
    /// Dispatches outbox events.
    pub worker: Arc<EventWorker>,
    /// Read access to outbox events.
    pub event_store: Arc<dyn EventStore>,
    /// Organization command dependencies.
    pub org: OrgContext,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("executor", &self.executor)
            .field("worker", &self.worker)
            .field("org", &self.org)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        executor: GuardedExecutor,
        worker: Arc<EventWorker>,
        event_store: Arc<dyn EventStore>,
        org: OrgContext,
    ) -> Self {
        Self {
            executor,
            worker,
            event_store,
            org,
        }
    }
}

/// Wires the executor, worker and org context over one store.
///
/// # Errors
///
/// Returns `ServerError::Worker` if an organization topic is left without a
/// handler.
pub fn build_state<S>(
    config: &Config,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    rate_limiter: Arc<dyn RateLimiter>,
) -> Result<AppState, ServerError>
where
    S: TransactionalStore + EventStore + 'static,
{
    let breakers = Arc::new(CircuitBreakerRegistry::new(
        config.breaker,
        Arc::clone(&clock),
    ));
    let executor = GuardedExecutor::new(config.executor, breakers, rate_limiter);

    let event_store: Arc<dyn EventStore> = store.clone();
    let mut worker = EventWorker::new(Arc::clone(&event_store), Arc::clone(&clock), config.worker);
    register_org_handlers(&mut worker);
    worker.validate_topics(ORG_TOPICS)?;

    let org = OrgContext {
        executor: executor.clone(),
        store,
        writer: OutboxWriter::new(Arc::clone(&clock)),
        clock,
    };

    Ok(AppState::new(executor, Arc::new(worker), event_store, org))
}
