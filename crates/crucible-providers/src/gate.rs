use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crucible_core::{CallFailure, FailureKind};

/// Process-wide limit on in-flight model calls.
///
/// Backed by tokio's FIFO-fair semaphore, so waiting callers are admitted in
/// arrival order. Cloning shares the same permits.
#[derive(Clone, Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    /// Creates a gate admitting `capacity` calls at once.
    ///
    /// A zero capacity is replaced by 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!("Concurrency gate capacity 0 is invalid, using 1");
            1
        } else {
            capacity.min(Semaphore::MAX_PERMITS)
        };

        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Creates a gate from the configured `max_concurrent_calls`.
    ///
    /// Missing, zero or negative values fall back to a capacity of 1.
    pub fn from_configured(value: Option<i64>) -> Self {
        match value.and_then(|raw| usize::try_from(raw).ok()) {
            Some(capacity) if capacity >= 1 => Self::new(capacity),
            _ => {
                warn!(
                    configured = ?value,
                    "Invalid max_concurrent_calls, defaulting concurrency gate to 1"
                );
                Self::new(1)
            }
        }
    }

    /// Waits for a free slot. The slot is released when the permit is dropped.
    ///
    /// # Errors
    /// Returns an `unexpected` failure if the gate was closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, CallFailure> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|err| CallFailure::new(FailureKind::Unexpected, err.to_string()))?;
        debug!(
            in_flight = self.in_flight(),
            capacity = self.capacity,
            "Admitted model call"
        );
        Ok(permit)
    }

    /// Maximum number of concurrent calls.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}
