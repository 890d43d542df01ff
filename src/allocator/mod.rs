mod basic;
mod error;
mod explicit;
mod repurpose;
mod request;
#[cfg(test)]
mod tests;

pub use basic::next_basic_slot;
pub use error::AllocError;
pub use explicit::resolve_explicit;
pub use repurpose::{find_repurpose_slots, normalize_template};
pub use request::parse_timestamp;

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::alert::AlertSink;
use crate::catalog::SlotTemplateCatalog;
use crate::model::*;
use crate::store::TakenDateStore;

/// Hands out publish times per priority class.
///
/// Every load -> search -> save cycle runs under that class's lock, so two
/// requests for the same class can never be given the same slot.
pub struct SlotAllocator {
    catalog: Arc<SlotTemplateCatalog>,
    store: Arc<dyn TakenDateStore>,
    alerts: Option<Arc<dyn AlertSink>>,
    class_locks: DashMap<PriorityClass, Arc<Mutex<()>>>,
}

impl SlotAllocator {
    pub fn new(catalog: Arc<SlotTemplateCatalog>, store: Arc<dyn TakenDateStore>) -> Self {
        Self {
            catalog,
            store,
            alerts: None,
            class_locks: DashMap::new(),
        }
    }

    pub fn with_alerts(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn catalog(&self) -> &SlotTemplateCatalog {
        &self.catalog
    }

    async fn lock_class(&self, class: PriorityClass) -> OwnedMutexGuard<()> {
        let lock = self
            .class_locks
            .entry(class)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        lock.lock_owned().await
    }

    /// Entry point for the scheduling workflow.
    pub async fn allocate(&self, request: ScheduleRequest) -> Result<ScheduleResult, AllocError> {
        request.validate()?;
        let kind = crate::observability::request_label(&request);
        let started = Instant::now();

        let result = match (request.target, request.batch) {
            (ScheduleTarget::Explicit(at), _) => {
                let (at, offset) = resolve_explicit(at, request.base_time);
                Ok(ScheduleResult::Single { at, offset })
            }
            (ScheduleTarget::Class(class), Some(batch)) => self
                .allocate_repurpose(class, request.base_time, batch.count, batch.weeks_between)
                .await
                .map(ScheduleResult::Batch),
            (ScheduleTarget::Class(class), None) => {
                self.allocate_basic(class, request.base_time)
                    .await
                    .map(|at| ScheduleResult::Single {
                        at,
                        offset: offset_between(at, request.base_time),
                    })
            }
        };

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(crate::observability::ALLOCATIONS_TOTAL, "kind" => kind, "status" => status)
            .increment(1);
        metrics::histogram!(crate::observability::ALLOCATION_DURATION_SECONDS, "kind" => kind)
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Give a reserved slot back to the pool. Returns whether it was reserved.
    pub async fn release(&self, class: PriorityClass, at: Ts) -> Result<bool, AllocError> {
        let _class = self.lock_class(class).await;
        let mut taken = self.store.load(class).await?;
        let before = taken.len();
        taken.retain(|t| *t != at);
        if taken.len() == before {
            debug!(%class, %at, "release of unreserved slot ignored");
            return Ok(false);
        }
        self.store.save(class, &taken).await?;
        metrics::counter!(crate::observability::RELEASES_TOTAL, "class" => class.as_str())
            .increment(1);
        info!(%class, %at, "slot released");
        Ok(true)
    }

    /// Reserved slots for `class`, in reservation order.
    pub async fn taken(&self, class: PriorityClass) -> Result<Vec<Ts>, AllocError> {
        Ok(self.store.load(class).await?)
    }
}
