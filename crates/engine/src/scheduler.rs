//! One-shot continuation triggers.
//!
//! At most one continuation is pending at any time. Arming always disarms
//! first, so a crash between slices can never leave two resumes racing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use geobatch_core::JobId;

use crate::checkpoint::{KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("scheduler storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("scheduler error: {0}")]
    Internal(String),
}

/// A pending resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedContinuation {
    pub id: Uuid,
    pub job_id: JobId,
    pub armed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl ArmedContinuation {
    pub fn new(job_id: JobId, after: Duration, now: DateTime<Utc>) -> Self {
        let after = chrono::Duration::from_std(after).unwrap_or(chrono::Duration::MAX);
        Self {
            id: Uuid::now_v7(),
            job_id,
            armed_at: now,
            due_at: now.checked_add_signed(after).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Schedules a single future invocation of the resume entry point.
pub trait ContinuationScheduler: Send + Sync {
    /// Record a new trigger. Called only through `arm`, after `disarm`.
    fn register(&self, job_id: JobId, after: Duration) -> Result<ArmedContinuation, SchedulerError>;

    /// Remove every pending trigger. Idempotent.
    fn disarm(&self) -> Result<(), SchedulerError>;

    /// Replace any pending trigger with one firing `after` from now.
    fn arm(&self, job_id: JobId, after: Duration) -> Result<ArmedContinuation, SchedulerError> {
        self.disarm()?;
        let armed = self.register(job_id, after)?;
        debug!(%job_id, due_at = %armed.due_at, "continuation armed");
        Ok(armed)
    }
}

impl<S> ContinuationScheduler for Arc<S>
where
    S: ContinuationScheduler + ?Sized,
{
    fn register(
        &self,
        job_id: JobId,
        after: Duration,
    ) -> Result<ArmedContinuation, SchedulerError> {
        (**self).register(job_id, after)
    }

    fn disarm(&self) -> Result<(), SchedulerError> {
        (**self).disarm()
    }

    fn arm(&self, job_id: JobId, after: Duration) -> Result<ArmedContinuation, SchedulerError> {
        (**self).arm(job_id, after)
    }
}

/// Scheduler calls observed by `InMemoryScheduler`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    Registered { job_id: JobId, after: Duration },
    Disarmed,
}

/// In-memory scheduler (for tests/dev). Nothing fires by itself; tests take the
/// pending trigger and call resume.
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    pending: Mutex<Vec<ArmedContinuation>>,
    events: Mutex<Vec<SchedulerEvent>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn pending(&self) -> Vec<ArmedContinuation> {
        self.pending.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn is_armed(&self) -> bool {
        !self.pending().is_empty()
    }

    /// Remove and return the pending trigger, as if it fired.
    pub fn fire(&self) -> Option<ArmedContinuation> {
        self.pending.lock().ok()?.pop()
    }

    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn record(&self, event: SchedulerEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl ContinuationScheduler for InMemoryScheduler {
    fn register(
        &self,
        job_id: JobId,
        after: Duration,
    ) -> Result<ArmedContinuation, SchedulerError> {
        let armed = ArmedContinuation::new(job_id, after, Utc::now());
        self.pending
            .lock()
            .map_err(|_| SchedulerError::Internal("scheduler lock poisoned".to_string()))?
            .push(armed.clone());
        self.record(SchedulerEvent::Registered { job_id, after });
        Ok(armed)
    }

    fn disarm(&self) -> Result<(), SchedulerError> {
        self.pending
            .lock()
            .map_err(|_| SchedulerError::Internal("scheduler lock poisoned".to_string()))?
            .clear();
        self.record(SchedulerEvent::Disarmed);
        Ok(())
    }
}

/// Default slot holding the pending continuation.
pub const CONTINUATION_KEY: &str = "geobatch.continuation";

/// Scheduler whose single trigger lives in a `KeyValueStore`.
///
/// A separate process (cron, a worker loop) polls `take_due` and calls resume
/// when it returns a trigger.
#[derive(Clone)]
pub struct PersistentScheduler {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl PersistentScheduler {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            key: CONTINUATION_KEY.to_string(),
        }
    }

    pub fn pending(&self) -> Result<Option<ArmedContinuation>, SchedulerError> {
        let Some(raw) = self.kv.get(&self.key)? else {
            return Ok(None);
        };
        let armed = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: self.key.clone(),
            reason: e.to_string(),
        })?;
        Ok(Some(armed))
    }

    /// Remove and return the trigger if it is due at `now`.
    ///
    /// Consuming before resuming keeps a trigger from firing twice; the
    /// resume it leads to re-arms if work remains.
    pub fn take_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<ArmedContinuation>, SchedulerError> {
        match self.pending()? {
            Some(armed) if armed.is_due(now) => {
                self.kv.delete(&self.key)?;
                info!(job_id = %armed.job_id, "continuation due");
                Ok(Some(armed))
            }
            _ => Ok(None),
        }
    }
}

impl ContinuationScheduler for PersistentScheduler {
    fn register(
        &self,
        job_id: JobId,
        after: Duration,
    ) -> Result<ArmedContinuation, SchedulerError> {
        let armed = ArmedContinuation::new(job_id, after, Utc::now());
        let raw = serde_json::to_string(&armed)
            .map_err(|e| SchedulerError::Internal(format!("failed to encode trigger: {e}")))?;
        self.kv.put(&self.key, &raw)?;
        Ok(armed)
    }

    fn disarm(&self) -> Result<(), SchedulerError> {
        self.kv.delete(&self.key)?;
        Ok(())
    }
}

impl std::fmt::Debug for PersistentScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentScheduler")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
