//! Application state for the SmartHealth REST API.
//!
//! Holds the store and the services built over it. Cloned into every handler.

use std::sync::Arc;

use smarthealth_core::{Clock, HealthStore, SystemClock};

use crate::alerting::{EscalationEvaluator, NotificationQueue};
use crate::care::CareService;
use crate::ingest::IngestionGateway;

/// Shared application state for the API.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (not cloned, shared via Arc).
struct AppStateInner {
    store: Arc<dyn HealthStore>,
    clock: Arc<dyn Clock>,
    gateway: IngestionGateway,
    escalation: EscalationEvaluator,
    care: CareService,
}

impl AppState {
    /// Create state on the wall clock.
    pub fn new(store: Arc<dyn HealthStore>, queue: NotificationQueue) -> Self {
        Self::with_clock(store, queue, Arc::new(SystemClock))
    }

    /// Create state with an explicit clock.
    pub fn with_clock(
        store: Arc<dyn HealthStore>,
        queue: NotificationQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                gateway: IngestionGateway::new(Arc::clone(&store), Arc::clone(&clock)),
                escalation: EscalationEvaluator::new(Arc::clone(&store), Arc::clone(&clock), queue),
                care: CareService::new(Arc::clone(&store), Arc::clone(&clock)),
                store,
                clock,
            }),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn HealthStore {
        self.inner.store.as_ref()
    }

    /// The clock used for freshness windows.
    pub fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    /// Device ingestion.
    pub fn gateway(&self) -> &IngestionGateway {
        &self.inner.gateway
    }

    /// SOS routing.
    pub fn escalation(&self) -> &EscalationEvaluator {
        &self.inner.escalation
    }

    /// Dashboards and care records.
    pub fn care(&self) -> &CareService {
        &self.inner.care
    }
}
