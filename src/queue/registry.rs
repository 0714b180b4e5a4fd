//! Submitter registry: who currently holds an admitted, unreleased job.
//!
//! The registry's mutex is also the admission gateway's critical section,
//! so "is this submitter already queued?" and "register them" can never
//! interleave with another admission. Entries are removed by dropping the
//! [`Reservation`] that the admitted job carries.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::model::SubmitterId;

#[derive(Clone, Default)]
pub struct SubmitterRegistry {
    inner: Arc<Mutex<HashSet<SubmitterId>>>,
}

impl SubmitterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the critical section.
    ///
    /// A poisoned lock is recovered: every mutation is a single set
    /// insert or remove, so the set is never left half-updated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, HashSet<SubmitterId>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `submitter` while holding the critical section.
    ///
    /// Returns `None` if the submitter already holds a reservation.
    pub(crate) fn reserve(
        &self,
        held: &mut HashSet<SubmitterId>,
        submitter: &SubmitterId,
    ) -> Option<Reservation> {
        if !held.insert(submitter.clone()) {
            return None;
        }
        Some(Reservation {
            registry: Arc::clone(&self.inner),
            submitter: submitter.clone(),
        })
    }

    pub fn contains(&self, submitter: &SubmitterId) -> bool {
        self.lock().contains(submitter)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Proof that a submitter is registered. Dropping it releases the entry.
///
/// Travels inside the [`Job`](crate::model::Job), so release happens on
/// every path the job can leave by: normal completion, an early return,
/// a panic unwinding the worker task, or the queue being dropped.
pub struct Reservation {
    registry: Arc<Mutex<HashSet<SubmitterId>>>,
    submitter: SubmitterId,
}

impl Reservation {
    pub fn submitter(&self) -> &SubmitterId {
        &self.submitter
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let mut held = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.submitter);
        debug!(submitter = %self.submitter, "reservation released");
    }
}
