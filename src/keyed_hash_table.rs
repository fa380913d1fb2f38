//! KeyedHashTable: chained hash table keyed by a field extracted from each
//! element.
//!
//! Keys are never stored; every lookup re-derives them through the
//! extractor, and bucket placement goes through a [`KeyOps`] so any key
//! type can be used as long as equal keys hash to the same bucket.
//!
//! Entries live in a generational arena and chain to each other by key;
//! each entry remembers its bucket so removals by handle or identity do not
//! need to re-hash. New entries are prepended to their bucket's chain.
//!
//! Cursor order is bucket index order, then chain order. Stepping
//! backward inside a bucket rescans the chain from its head (singly linked
//! chains keep no back links), so `previous` costs O(chain length).
//!
//! Resizing does not rehash: [`TableState::resize`] empties the table
//! (dropping owned elements) before reallocating the buckets.

use crate::collection::{ChangeKind, ChangeTracker, Collection, CollectionCore, Storage};
use crate::config::{Adoption, CollectionConfig};
use crate::cursor::{Cursor, Traverse};
use crate::element::Element;
use crate::error::{CollectionError, Result};
use crate::lock::{LocalLock, LockPolicy, SyncLock};
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::marker::PhantomData;
use core::ops::Deref;
use slotmap::{DefaultKey, SlotMap};

/// Hashing and equality for a key type.
///
/// `hash` must return an index in `[0, modulus)` and equal keys must land
/// in the same bucket.
pub trait KeyOps<K: ?Sized> {
    fn hash(&self, key: &K, modulus: usize) -> usize;
    fn equal(&self, a: &K, b: &K) -> bool;
}

pub type DefaultHashBuilder = hashbrown::hash_map::DefaultHashBuilder;

/// [`KeyOps`] over `Hash + Eq` keys using a `BuildHasher`.
#[derive(Clone, Debug, Default)]
pub struct StdKeyOps<S = DefaultHashBuilder> {
    hasher: S,
}

impl StdKeyOps<DefaultHashBuilder> {
    pub fn new() -> Self {
        Self::with_hasher(DefaultHashBuilder::default())
    }
}

impl<S> StdKeyOps<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self { hasher }
    }
}

impl<K, S> KeyOps<K> for StdKeyOps<S>
where
    K: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    fn hash(&self, key: &K, modulus: usize) -> usize {
        (self.hasher.hash_one(key) % modulus as u64) as usize
    }

    fn equal(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Stable handle to a table entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryHandle(DefaultKey);

/// Cursor position: bucket index plus the entry inside that bucket's chain.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TablePos {
    bucket: usize,
    entry: DefaultKey,
}

impl TablePos {
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    pub fn handle(&self) -> EntryHandle {
        EntryHandle(self.entry)
    }
}

#[derive(Debug)]
struct Entry<'e, T> {
    next: Option<DefaultKey>,
    bucket: usize,
    element: Element<'e, T>,
}

pub struct TableState<'e, T, K: ?Sized, F, O> {
    tracker: ChangeTracker,
    adoption: Adoption,
    buckets: Vec<Option<DefaultKey>>,
    entries: SlotMap<DefaultKey, Entry<'e, T>>, // storage using generational keys
    extract: F,
    ops: O,
    _key: PhantomData<fn(&K)>,
}

/// Cursor over a [`KeyedHashTable`].
pub type TableCursor<'c, 'e, T, K, F, O = StdKeyOps, R = SyncLock> =
    Cursor<'c, TableState<'e, T, K, F, O>, R>;

impl<'e, T, K: ?Sized, F, O> TableState<'e, T, K, F, O> {
    fn new(tracker: ChangeTracker, adoption: Adoption, modulus: usize, extract: F, ops: O) -> Self {
        Self {
            tracker,
            adoption,
            buckets: vec![None; modulus.max(1)],
            entries: SlotMap::with_key(),
            extract,
            ops,
            _key: PhantomData,
        }
    }

    pub fn adoption(&self) -> Adoption {
        self.adoption
    }

    pub fn modulus(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Chain length of every bucket, in bucket order.
    pub fn bucket_lengths(&self) -> Vec<usize> {
        (0..self.buckets.len())
            .map(|b| self.chain(b).count())
            .collect()
    }

    fn chain(&self, bucket: usize) -> Chain<'_, 'e, T> {
        Chain {
            entries: &self.entries,
            cur: self.buckets.get(bucket).copied().flatten(),
        }
    }

    fn chain_tail(&self, bucket: usize) -> Option<DefaultKey> {
        self.chain(bucket).last()
    }

    /// Remove `key` from its bucket chain and the arena.
    fn unlink(&mut self, key: DefaultKey) -> Option<Element<'e, T>> {
        let bucket = self.entries.get(key)?.bucket;
        let prev = self
            .chain(bucket)
            .find(|&k| self.entries.get(k).and_then(|e| e.next) == Some(key));
        let entry = self.entries.remove(key)?;
        match prev.and_then(|p| self.entries.get_mut(p)) {
            Some(p) => p.next = entry.next,
            None => {
                if let Some(head) = self.buckets.get_mut(bucket) {
                    *head = entry.next;
                }
            }
        }
        Some(entry.element)
    }

    fn detach(&mut self, key: DefaultKey) -> Result<Element<'e, T>> {
        let element = self
            .unlink(key)
            .ok_or_else(|| self.tracker.not_found("entry handle"))?;
        self.tracker.record(ChangeKind::Removed);
        Ok(element)
    }

    /// `ptr` is compared, never dereferenced, so its key cannot be
    /// extracted to pick a bucket; this scans every live entry.
    fn key_of_ptr(&self, ptr: *const T) -> Option<DefaultKey> {
        self.entries
            .iter()
            .find(|(_, e)| core::ptr::eq(e.element.as_ptr(), ptr))
            .map(|(k, _)| k)
    }

    pub fn get(&self, handle: EntryHandle) -> Option<&T> {
        self.entries.get(handle.0).map(|e| &*e.element)
    }

    /// Mutable access; `None` for dead handles and borrowed elements.
    ///
    /// Mutating the key field through this reference leaves the entry in
    /// the bucket of its old key.
    pub fn get_mut(&mut self, handle: EntryHandle) -> Option<&mut T> {
        self.entries
            .get_mut(handle.0)
            .and_then(|e| e.element.get_mut())
    }

    /// Elements in cursor order.
    pub fn iter(&self) -> Iter<'_, 'e, T, K, F, O> {
        Iter {
            state: self,
            pos: self.first_pos(),
        }
    }

    /// Detach the element at `ptr` without destroying it. Matching is by
    /// address only; a dangling or foreign `ptr` yields `NotFound`. Cost is
    /// O(len), not O(chain).
    pub fn orphan_element(&mut self, ptr: *const T) -> Result<Element<'e, T>> {
        let key = self
            .key_of_ptr(ptr)
            .ok_or_else(|| self.tracker.not_found(format!("element at {:p}", ptr)))?;
        self.detach(key)
    }

    pub fn remove_element(&mut self, ptr: *const T) -> Result<()> {
        self.orphan_element(ptr).map(drop)
    }

    pub fn extract(&mut self, handle: EntryHandle) -> Result<Element<'e, T>> {
        self.detach(handle.0)
    }

    pub fn remove(&mut self, handle: EntryHandle) -> Result<()> {
        self.detach(handle.0).map(drop)
    }

    pub fn extract_at<R: LockPolicy>(
        &mut self,
        cursor: &Cursor<'_, Self, R>,
    ) -> Result<Element<'e, T>> {
        let at = cursor.target_in(self)?;
        self.detach(at.entry)
    }

    pub fn remove_at<R: LockPolicy>(&mut self, cursor: &Cursor<'_, Self, R>) -> Result<()> {
        self.extract_at(cursor).map(drop)
    }

    /// Empty the table and reallocate `modulus` buckets. Entries are not
    /// rehashed; returns how many were discarded.
    pub fn resize(&mut self, modulus: usize) -> usize {
        let discarded = self.entries.len();
        if discarded > 0 {
            log::warn!(
                "resizing `{}` discards {} live entries",
                self.tracker.name(),
                discarded
            );
        }
        self.entries.clear();
        self.buckets = vec![None; modulus.max(1)];
        log::debug!(
            "`{}` resized to {} buckets",
            self.tracker.name(),
            self.buckets.len()
        );
        self.tracker.record(ChangeKind::Reloaded);
        discarded
    }
}

impl<'e, T, K, F, O> TableState<'e, T, K, F, O>
where
    K: ?Sized + fmt::Debug,
    F: Fn(&T) -> &K,
    O: KeyOps<K>,
{
    fn bucket_for(&self, key: &K) -> usize {
        let modulus = self.buckets.len();
        let b = self.ops.hash(key, modulus);
        debug_assert!(b < modulus, "KeyOps::hash returned {} for modulus {}", b, modulus);
        b % modulus
    }

    /// Bucket for `key` and, when present, the entry holding it.
    fn locate(&self, key: &K) -> (usize, Option<DefaultKey>) {
        let bucket = self.bucket_for(key);
        let found = self.chain(bucket).find(|&k| {
            self.entries
                .get(k)
                .is_some_and(|e| self.ops.equal((self.extract)(&*e.element), key))
        });
        (bucket, found)
    }

    fn missing_key(&self, key: &K) -> CollectionError {
        self.tracker.not_found(format!("key {:?}", key))
    }

    fn admit(&self, element: &Element<'e, T>) -> Result<()> {
        if element.adoption() != self.adoption {
            return Err(self.tracker.adoption_mismatch(format!(
                "{:?} element offered to a {:?} table",
                element.adoption(),
                self.adoption
            )));
        }
        Ok(())
    }

    /// Insert a new element. A duplicate key is rejected and the rejected
    /// element dropped (freed when owned).
    pub fn add(&mut self, element: Element<'e, T>) -> Result<EntryHandle> {
        self.admit(&element)?;
        let (bucket, found) = self.locate((self.extract)(&*element));
        if found.is_some() {
            let key = format!("{:?}", (self.extract)(&*element));
            if element.adoption().owns() {
                log::warn!(
                    "`{}` rejected duplicate key {}; dropping the adopted element",
                    self.tracker.name(),
                    key
                );
            }
            return Err(CollectionError::DuplicateKey {
                collection: self.tracker.name().to_string(),
                key,
            });
        }
        let next = self.buckets[bucket];
        let k = self.entries.insert(Entry {
            next,
            bucket,
            element,
        });
        self.buckets[bucket] = Some(k);
        self.tracker.record(ChangeKind::Added);
        Ok(EntryHandle(k))
    }

    /// Insert, or replace the element holding an equal key. Returns `true`
    /// when a new entry was added.
    pub fn add_or_update(&mut self, element: Element<'e, T>) -> Result<bool> {
        self.admit(&element)?;
        let (_, found) = self.locate((self.extract)(&*element));
        if let Some(entry) = found.and_then(|k| self.entries.get_mut(k)) {
            entry.element = element;
            self.tracker.record(ChangeKind::Replaced);
            return Ok(false);
        }
        self.add(element).map(|_| true)
    }

    /// Add every element inside one bulk scope, stopping at the first
    /// rejection.
    pub fn bulk_load<I>(&mut self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = Element<'e, T>>,
    {
        let start = self.entries.len();
        self.tracker.begin_bulk()?;
        let mut added = 0;
        let mut outcome = Ok(());
        for element in elements {
            if let Err(e) = self.add(element) {
                outcome = Err(e);
                break;
            }
            added += 1;
        }
        self.tracker.end_bulk(true, start, added)?;
        outcome.map(|()| added)
    }

    pub fn find_handle(&self, key: &K) -> Option<EntryHandle> {
        self.locate(key).1.map(EntryHandle)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.locate(key).1.is_some()
    }

    pub fn try_find_by_key(&self, key: &K) -> Option<&T> {
        self.find_handle(key).and_then(|h| self.get(h))
    }

    pub fn find_by_key(&self, key: &K) -> Result<&T> {
        self.try_find_by_key(key)
            .ok_or_else(|| self.missing_key(key))
    }

    /// Detach the element with `key` without destroying it.
    pub fn extract_by_key(&mut self, key: &K) -> Result<Element<'e, T>> {
        match self.locate(key).1 {
            Some(k) => self.detach(k),
            None => Err(self.missing_key(key)),
        }
    }

    pub fn remove_by_key(&mut self, key: &K) -> Result<()> {
        self.extract_by_key(key).map(drop)
    }

    pub fn try_remove_by_key(&mut self, key: &K) -> bool {
        match self.locate(key).1 {
            Some(k) => self.detach(k).is_ok(),
            None => false,
        }
    }
}

impl<'e, T, K: ?Sized, F, O> Storage for TableState<'e, T, K, F, O> {
    fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    fn element_count(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.tracker.record(ChangeKind::Cleared);
    }
}

impl<'e, T, K: ?Sized, F, O> Traverse for TableState<'e, T, K, F, O> {
    type Pos = TablePos;
    type Item = Element<'e, T>;

    fn first_pos(&self) -> Option<TablePos> {
        self.first_from(0)
    }

    fn last_pos(&self) -> Option<TablePos> {
        self.last_before(self.buckets.len())
    }

    fn next_pos(&self, at: TablePos) -> Option<TablePos> {
        match self.entries.get(at.entry)?.next {
            Some(entry) => Some(TablePos {
                bucket: at.bucket,
                entry,
            }),
            None => self.first_from(at.bucket + 1),
        }
    }

    fn prev_pos(&self, at: TablePos) -> Option<TablePos> {
        // O(chain length): rescan from the bucket head.
        let prev = self
            .chain(at.bucket)
            .find(|&k| self.entries.get(k).and_then(|e| e.next) == Some(at.entry));
        match prev {
            Some(entry) => Some(TablePos {
                bucket: at.bucket,
                entry,
            }),
            None => self.last_before(at.bucket),
        }
    }

    fn item(&self, at: TablePos) -> Option<&Element<'e, T>> {
        self.entries.get(at.entry).map(|e| &e.element)
    }

    fn item_mut(&mut self, at: TablePos) -> Option<&mut Element<'e, T>> {
        self.entries.get_mut(at.entry).map(|e| &mut e.element)
    }
}

impl<'e, T, K: ?Sized, F, O> TableState<'e, T, K, F, O> {
    /// Head of the first non-empty bucket at or after `from`.
    fn first_from(&self, from: usize) -> Option<TablePos> {
        self.buckets
            .iter()
            .enumerate()
            .skip(from)
            .find_map(|(bucket, head)| head.map(|entry| TablePos { bucket, entry }))
    }

    /// Tail of the last non-empty bucket strictly before `before`.
    fn last_before(&self, before: usize) -> Option<TablePos> {
        (0..before.min(self.buckets.len())).rev().find_map(|bucket| {
            self.chain_tail(bucket)
                .map(|entry| TablePos { bucket, entry })
        })
    }
}

struct Chain<'a, 'e, T> {
    entries: &'a SlotMap<DefaultKey, Entry<'e, T>>,
    cur: Option<DefaultKey>,
}

impl<'a, 'e, T> Iterator for Chain<'a, 'e, T> {
    type Item = DefaultKey;

    fn next(&mut self) -> Option<DefaultKey> {
        let k = self.cur?;
        self.cur = self.entries.get(k).and_then(|e| e.next);
        Some(k)
    }
}

/// Iterator over a locked table in cursor order.
pub struct Iter<'a, 'e, T, K: ?Sized, F, O> {
    state: &'a TableState<'e, T, K, F, O>,
    pos: Option<TablePos>,
}

impl<'a, 'e, T, K: ?Sized, F, O> Iterator for Iter<'a, 'e, T, K, F, O> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let at = self.pos?;
        self.pos = self.state.next_pos(at);
        self.state.item(at).map(|e| &**e)
    }
}

/// Thread-safe by default; see [`KeyedHashTable::new_local`].
pub struct KeyedHashTable<'e, T, K: ?Sized, F, O = StdKeyOps, R: LockPolicy = SyncLock> {
    core: CollectionCore<TableState<'e, T, K, F, O>, R>,
    adoption: Adoption,
}

impl<'e, T, K, F> KeyedHashTable<'e, T, K, F, StdKeyOps, SyncLock>
where
    K: ?Sized + Hash + Eq + fmt::Debug,
    F: Fn(&T) -> &K,
{
    pub fn new(config: CollectionConfig, modulus: usize, extract: F) -> Self {
        Self::with_lock_policy(config, modulus, extract, StdKeyOps::new())
    }
}

impl<'e, T, K, F, O> KeyedHashTable<'e, T, K, F, O, SyncLock>
where
    K: ?Sized + fmt::Debug,
    F: Fn(&T) -> &K,
    O: KeyOps<K>,
{
    pub fn with_key_ops(config: CollectionConfig, modulus: usize, extract: F, ops: O) -> Self {
        Self::with_lock_policy(config, modulus, extract, ops)
    }
}

impl<'e, T, K, F> KeyedHashTable<'e, T, K, F, StdKeyOps, LocalLock>
where
    K: ?Sized + Hash + Eq + fmt::Debug,
    F: Fn(&T) -> &K,
{
    pub fn new_local(config: CollectionConfig, modulus: usize, extract: F) -> Self {
        Self::with_lock_policy(config, modulus, extract, StdKeyOps::new())
    }
}

impl<'e, T, K, F, O, R> KeyedHashTable<'e, T, K, F, O, R>
where
    K: ?Sized + fmt::Debug,
    F: Fn(&T) -> &K,
    O: KeyOps<K>,
    R: LockPolicy,
{
    pub fn with_lock_policy(config: CollectionConfig, modulus: usize, extract: F, ops: O) -> Self {
        let adoption = config.adoption;
        Self {
            core: CollectionCore::new(&config, |tracker| {
                TableState::new(tracker, adoption, modulus, extract, ops)
            }),
            adoption,
        }
    }

    pub fn adoption(&self) -> Adoption {
        self.adoption
    }

    pub fn modulus(&self) -> Result<usize> {
        Ok(self.core.lock()?.modulus())
    }

    pub fn bucket_lengths(&self) -> Result<Vec<usize>> {
        Ok(self.core.lock()?.bucket_lengths())
    }

    /// Cursor positioned on the first element in bucket order.
    pub fn cursor(&self) -> Result<TableCursor<'_, 'e, T, K, F, O, R>> {
        let mut c = Cursor::uninit(&self.core);
        c.reset()?;
        Ok(c)
    }

    pub fn cursor_uninit(&self) -> TableCursor<'_, 'e, T, K, F, O, R> {
        Cursor::uninit(&self.core)
    }

    pub fn add(&self, element: impl Into<Element<'e, T>>) -> Result<EntryHandle> {
        self.core.lock()?.add(element.into())
    }

    pub fn add_or_update(&self, element: impl Into<Element<'e, T>>) -> Result<bool> {
        self.core.lock()?.add_or_update(element.into())
    }

    pub fn bulk_load<I>(&self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = Element<'e, T>>,
    {
        self.core.lock()?.bulk_load(elements)
    }

    pub fn contains_key(&self, key: &K) -> Result<bool> {
        Ok(self.core.lock()?.contains_key(key))
    }

    /// Run `f` on the element with `key`; `NotFound` if there is none.
    pub fn find_by_key<U>(&self, key: &K, f: impl FnOnce(&T) -> U) -> Result<U> {
        self.core.lock()?.find_by_key(key).map(f)
    }

    /// Run `f` on the element with `key`, if present.
    pub fn try_find_by_key<U>(&self, key: &K, f: impl FnOnce(&T) -> U) -> Result<Option<U>> {
        Ok(self.core.lock()?.try_find_by_key(key).map(f))
    }

    pub fn extract_by_key(&self, key: &K) -> Result<Element<'e, T>> {
        self.core.lock()?.extract_by_key(key)
    }

    pub fn remove_by_key(&self, key: &K) -> Result<()> {
        self.core.lock()?.remove_by_key(key)
    }

    pub fn try_remove_by_key(&self, key: &K) -> Result<bool> {
        Ok(self.core.lock()?.try_remove_by_key(key))
    }

    pub fn orphan_element(&self, ptr: *const T) -> Result<Element<'e, T>> {
        self.core.lock()?.orphan_element(ptr)
    }

    pub fn remove_element(&self, ptr: *const T) -> Result<()> {
        self.core.lock()?.remove_element(ptr)
    }

    pub fn extract_at(&self, cursor: &TableCursor<'_, 'e, T, K, F, O, R>) -> Result<Element<'e, T>> {
        self.core.lock()?.extract_at(cursor)
    }

    pub fn remove_at(&self, cursor: &TableCursor<'_, 'e, T, K, F, O, R>) -> Result<()> {
        self.core.lock()?.remove_at(cursor)
    }

    /// Empty the table and reallocate its buckets. Returns the number of
    /// discarded entries; callers wanting to keep them must extract first.
    pub fn resize(&self, modulus: usize) -> Result<usize> {
        Ok(self.core.lock()?.resize(modulus))
    }

    pub fn to_vec(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        Ok(self.core.lock()?.iter().cloned().collect())
    }
}

impl<'e, T, K: ?Sized, F, O, R: LockPolicy> Deref for KeyedHashTable<'e, T, K, F, O, R> {
    type Target = CollectionCore<TableState<'e, T, K, F, O>, R>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<'e, T, K: ?Sized, F, O, R: LockPolicy> Collection for KeyedHashTable<'e, T, K, F, O, R> {
    fn is_empty(&self) -> Result<bool> {
        self.core.is_empty()
    }

    fn element_count(&self) -> Result<usize> {
        self.core.element_count()
    }

    fn clear(&self) -> Result<()> {
        self.core.clear()
    }
}
