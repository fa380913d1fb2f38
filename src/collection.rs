//! Shared collection machinery: identity, locking, serial numbers, change
//! events and bulk-load batching.
//!
//! A concrete collection keeps its storage in a state type implementing
//! [`Storage`]; that state embeds a [`ChangeTracker`] and lives behind the
//! mutex owned by [`CollectionCore`]. Every structural mutation of the state
//! goes through [`ChangeTracker::record`], which bumps the serial number and
//! publishes a [`ChangeEvent`] (or, inside a bulk scope, defers both to
//! [`ChangeTracker::end_bulk`]).

use crate::config::CollectionConfig;
use crate::error::{CollectionError, Result};
use crate::lock::{acquire, LockPolicy, ScopedLock};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use parking_lot::lock_api::Mutex;
use std::time::Duration;

static NEXT_COLLECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a collection instance.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CollectionId(u64);

impl CollectionId {
    pub(crate) fn next() -> Self {
        CollectionId(NEXT_COLLECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChangeKind {
    Added,
    Removed,
    /// An element was swapped for another with an equal key.
    Replaced,
    Cleared,
    Reordered,
    Swapped,
    BlockAdded { start: usize, count: usize },
    BlockRemoved { start: usize, count: usize },
    Reloaded,
}

/// A published structural change. `serial` is the serial number after the
/// change was applied.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeEvent {
    pub collection: CollectionId,
    pub serial: u64,
    pub kind: ChangeKind,
}

/// Subscriber callback. Runs synchronously while the collection is locked,
/// so it must not call back into the same collection.
pub type EventSink = Box<dyn Fn(&ChangeEvent) + Send + Sync>;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct SubscriptionId(u64);

struct Topic {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, EventSink)>,
}

impl Topic {
    fn publish(&self, event: &ChangeEvent) {
        for (_, sink) in &self.subscribers {
            sink(event);
        }
    }
}

#[derive(Debug)]
struct BulkScope {
    suppressed: usize,
}

/// Per-collection change bookkeeping, embedded in every collection state.
pub struct ChangeTracker {
    id: CollectionId,
    name: String,
    // Starts at 1 so a cursor that never synchronized (snapshot 0) is stale.
    serial: u64,
    bulk: Option<BulkScope>,
    // Only allocated once somebody subscribes.
    topic: Option<Topic>,
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("serial", &self.serial)
            .field("bulk", &self.bulk)
            .field(
                "subscribers",
                &self.topic.as_ref().map_or(0, |t| t.subscribers.len()),
            )
            .finish()
    }
}

impl ChangeTracker {
    pub(crate) fn new(id: CollectionId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            serial: 1,
            bulk: None,
            topic: None,
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn in_bulk(&self) -> bool {
        self.bulk.is_some()
    }

    /// Record one logical structural change.
    pub(crate) fn record(&mut self, kind: ChangeKind) {
        if let Some(scope) = self.bulk.as_mut() {
            scope.suppressed += 1;
            return;
        }
        self.bump(kind);
    }

    fn bump(&mut self, kind: ChangeKind) {
        self.serial += 1;
        log::trace!("`{}` serial -> {} ({:?})", self.name, self.serial, kind);
        if let Some(topic) = self.topic.as_ref() {
            topic.publish(&ChangeEvent {
                collection: self.id,
                serial: self.serial,
                kind,
            });
        }
    }

    /// Start suppressing per-element events until [`end_bulk`](Self::end_bulk).
    pub fn begin_bulk(&mut self) -> Result<()> {
        if self.bulk.is_some() {
            return Err(self.bulk_error("begin_bulk called inside an active bulk scope"));
        }
        self.bulk = Some(BulkScope { suppressed: 0 });
        Ok(())
    }

    /// Close the bulk scope: one serial bump and one aggregate event.
    pub fn end_bulk(&mut self, is_add: bool, start: usize, count: usize) -> Result<()> {
        let scope = self
            .bulk
            .take()
            .ok_or_else(|| self.bulk_error("end_bulk called without an active bulk scope"))?;
        log::trace!(
            "`{}` bulk scope closed after {} suppressed changes",
            self.name,
            scope.suppressed
        );
        let kind = if is_add {
            ChangeKind::BlockAdded { start, count }
        } else {
            ChangeKind::BlockRemoved { start, count }
        };
        self.bump(kind);
        Ok(())
    }

    pub fn subscribe<F>(&mut self, sink: F) -> SubscriptionId
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        let topic = self.topic.get_or_insert_with(|| Topic {
            next_id: 1,
            subscribers: Vec::new(),
        });
        let id = SubscriptionId(topic.next_id);
        topic.next_id += 1;
        topic.subscribers.push((id, Box::new(sink)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(topic) = self.topic.as_mut() else {
            return false;
        };
        let before = topic.subscribers.len();
        topic.subscribers.retain(|(sid, _)| *sid != id);
        before != topic.subscribers.len()
    }

    fn bulk_error(&self, detail: &str) -> CollectionError {
        CollectionError::BulkState {
            collection: self.name.clone(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn not_found(&self, what: impl Into<String>) -> CollectionError {
        CollectionError::NotFound {
            collection: self.name.clone(),
            what: what.into(),
        }
    }

    pub(crate) fn empty(&self) -> CollectionError {
        CollectionError::EmptyCollection {
            collection: self.name.clone(),
        }
    }

    pub(crate) fn adoption_mismatch(&self, detail: impl Into<String>) -> CollectionError {
        CollectionError::AdoptionMismatch {
            collection: self.name.clone(),
            detail: detail.into(),
        }
    }

    pub(crate) fn invalid_cursor(&self) -> CollectionError {
        CollectionError::InvalidCursor {
            collection: self.name.clone(),
        }
    }

    pub(crate) fn not_my_cursor(&self) -> CollectionError {
        CollectionError::NotMyCursor {
            collection: self.name.clone(),
        }
    }

    pub(crate) fn stale(&self, snapshot: u64) -> CollectionError {
        CollectionError::StaleCursor {
            collection: self.name.clone(),
            snapshot,
            current: self.serial,
        }
    }
}

/// Storage contract every concrete collection state fulfils.
pub trait Storage {
    fn tracker(&self) -> &ChangeTracker;
    fn tracker_mut(&mut self) -> &mut ChangeTracker;
    fn element_count(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.element_count() == 0
    }
    /// Remove every element, dropping owned ones.
    fn clear(&mut self);
}

/// Operations every collection answers, each under its own lock.
pub trait Collection {
    fn is_empty(&self) -> Result<bool>;
    fn element_count(&self) -> Result<usize>;
    fn clear(&self) -> Result<()>;
}

/// A collection state behind its lock, plus the identity and settings the
/// state itself does not need.
pub struct CollectionCore<S, R: LockPolicy> {
    id: CollectionId,
    name: String,
    lock_timeout: Option<Duration>,
    state: Mutex<R, S>,
}

impl<S: Storage, R: LockPolicy> CollectionCore<S, R> {
    pub(crate) fn new<F>(config: &CollectionConfig, build: F) -> Self
    where
        F: FnOnce(ChangeTracker) -> S,
    {
        let id = CollectionId::next();
        let tracker = ChangeTracker::new(id, &config.name);
        Self {
            id,
            name: config.name.clone(),
            lock_timeout: config.lock_timeout,
            state: Mutex::new(build(tracker)),
        }
    }

    pub fn id(&self) -> CollectionId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_thread_safe(&self) -> bool {
        R::THREAD_SAFE
    }

    /// Lock with the configured timeout (blocking when none is configured).
    pub fn lock(&self) -> Result<ScopedLock<'_, R, S>> {
        acquire(&self.state, &self.name, self.lock_timeout)
    }

    /// Lock, waiting at most `timeout`.
    pub fn lock_for(&self, timeout: Duration) -> Result<ScopedLock<'_, R, S>> {
        acquire(&self.state, &self.name, Some(timeout))
    }

    pub fn try_lock(&self) -> Option<ScopedLock<'_, R, S>> {
        self.state.try_lock()
    }

    /// Lock `self`, then `other`. Callers must rule out `self == other`.
    pub(crate) fn lock_pair<'a>(
        &'a self,
        other: &'a Self,
    ) -> Result<(ScopedLock<'a, R, S>, ScopedLock<'a, R, S>)> {
        debug_assert_ne!(self.id, other.id);
        let mine = self.lock()?;
        let theirs = other.lock()?;
        Ok((mine, theirs))
    }

    pub fn serial_number(&self) -> Result<u64> {
        Ok(self.lock()?.tracker().serial())
    }

    pub fn begin_bulk(&self) -> Result<()> {
        self.lock()?.tracker_mut().begin_bulk()
    }

    pub fn end_bulk(&self, is_add: bool, start: usize, count: usize) -> Result<()> {
        self.lock()?.tracker_mut().end_bulk(is_add, start, count)
    }

    pub fn subscribe<F>(&self, sink: F) -> Result<SubscriptionId>
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        Ok(self.lock()?.tracker_mut().subscribe(sink))
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool> {
        Ok(self.lock()?.tracker_mut().unsubscribe(id))
    }
}

impl<S: Storage, R: LockPolicy> Collection for CollectionCore<S, R> {
    fn is_empty(&self) -> Result<bool> {
        Ok(self.lock()?.is_empty())
    }

    fn element_count(&self) -> Result<usize> {
        Ok(self.lock()?.element_count())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

impl<S, R: LockPolicy> fmt::Debug for CollectionCore<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionCore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("thread_safe", &R::THREAD_SAFE)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(CollectionId::next(), "t")
    }

    /// Invariant: serial starts at 1 and strictly increases per recorded change.
    #[test]
    fn serial_starts_at_one_and_increases() {
        let mut t = tracker();
        assert_eq!(t.serial(), 1);
        t.record(ChangeKind::Added);
        t.record(ChangeKind::Removed);
        assert_eq!(t.serial(), 3);
    }

    /// Invariant: no topic is allocated and nothing is published until
    /// somebody subscribes.
    #[test]
    fn events_only_after_subscribe() {
        let mut t = tracker();
        t.record(ChangeKind::Added);
        assert!(t.topic.is_none());

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = t.subscribe(move |e| sink.lock().unwrap().push(e.kind));
        t.record(ChangeKind::Cleared);
        assert_eq!(*seen.lock().unwrap(), vec![ChangeKind::Cleared]);

        assert!(t.unsubscribe(sub));
        assert!(!t.unsubscribe(sub));
        t.record(ChangeKind::Added);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    /// Invariant: a bulk scope suppresses per-element events and bumps the
    /// serial exactly once when it closes.
    #[test]
    fn bulk_scope_batches_serial_and_events() {
        let mut t = tracker();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        t.subscribe(move |e| sink.lock().unwrap().push(e.kind));

        t.begin_bulk().unwrap();
        for _ in 0..5 {
            t.record(ChangeKind::Added);
        }
        assert_eq!(t.serial(), 1);
        t.end_bulk(true, 0, 5).unwrap();
        assert_eq!(t.serial(), 2);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeKind::BlockAdded { start: 0, count: 5 }]
        );
    }

    #[test]
    fn bulk_scope_misuse_is_an_error() {
        let mut t = tracker();
        assert!(matches!(
            t.end_bulk(true, 0, 0),
            Err(CollectionError::BulkState { .. })
        ));
        t.begin_bulk().unwrap();
        assert!(matches!(
            t.begin_bulk(),
            Err(CollectionError::BulkState { .. })
        ));
    }

    #[test]
    fn collection_ids_are_unique() {
        assert_ne!(CollectionId::next(), CollectionId::next());
    }
}
