//! ObjectPool: a bounded pool of reusable, size-ranked elements.
//!
//! Internal Design
//! - Free elements sit in a `Vec` kept sorted by the factory's size metric,
//!   so best-fit selection is a `partition_point`. Checked-out elements are
//!   owned by their callers; the pool only tracks their checkout ids in a
//!   sorted used list.
//! - `free.len() + used.len()` never exceeds `max_size`. Checkouts dropped
//!   from the books by [`ObjectPool::release_all`] are "forgotten" and no
//!   longer count toward the bound.
//! - Handle flavors layer on [`Checkout`]: [`SharedHandle`] (ref-counted,
//!   the last clone returns the element) and [`ExclusiveHandle`] (returns
//!   the element on drop unless orphaned or released early).

use crate::collection::CollectionId;
use crate::config::PoolConfig;
use crate::error::{CollectionError, Result};
use crate::lock::{acquire, LocalLock, LockPolicy, ScopedLock, SyncLock};
use core::fmt;
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use parking_lot::lock_api::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Element lifecycle callbacks supplied by the pool's owner.
pub trait PoolFactory<T> {
    /// Ordering metric used for best-fit selection.
    type Size: Ord + Copy + fmt::Debug;

    fn element_size(&self, element: &T) -> Self::Size;

    /// Build a fresh element for `size_hint`. `None` is rejected with
    /// `NullElementRejected`.
    fn create_new(&self, size_hint: Self::Size) -> Option<T>;

    /// Make `element` ready for a caller asking for `size_hint`. Runs on
    /// fresh and reused elements alike, so it must be idempotent.
    fn prepare(&self, element: &mut T, size_hint: Self::Size);
}

/// An element checked out of a pool. Hand it back with
/// [`ObjectPool::release`] or keep it with [`ObjectPool::orphan`]; dropping
/// it frees the element but leaves its slot counted as used.
#[must_use = "a dropped checkout keeps its pool slot; release or orphan it"]
pub struct Checkout<T> {
    pool: CollectionId,
    id: u64,
    element: T,
}

impl<T> Checkout<T> {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl<T> Deref for Checkout<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.element
    }
}

impl<T> DerefMut for Checkout<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.element
    }
}

impl<T: fmt::Debug> fmt::Debug for Checkout<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checkout")
            .field("id", &self.id)
            .field("element", &self.element)
            .finish()
    }
}

struct PoolState<T, Z> {
    free: Vec<(Z, T)>, // ascending by size
    used: Vec<u64>,    // ascending checkout ids
    forgotten: Vec<u64>,
    next_id: u64,
}

impl<T, Z: Ord + Copy> PoolState<T, Z> {
    fn allocated(&self) -> usize {
        self.free.len() + self.used.len()
    }

    fn push_free(&mut self, size: Z, element: T) {
        let at = self.free.partition_point(|(s, _)| *s < size);
        self.free.insert(at, (size, element));
    }

    fn check_in(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        // Ids are monotonic, so appending keeps `used` sorted.
        self.used.push(id);
        id
    }

    fn take_used(&mut self, id: u64) -> bool {
        match self.used.binary_search(&id) {
            Ok(at) => {
                self.used.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    fn take_forgotten(&mut self, id: u64) -> bool {
        match self.forgotten.binary_search(&id) {
            Ok(at) => {
                self.forgotten.remove(at);
                true
            }
            Err(_) => false,
        }
    }
}

pub struct ObjectPool<T, F: PoolFactory<T>, R: LockPolicy = SyncLock> {
    id: CollectionId,
    name: String,
    max_size: usize,
    grow_on_miss: bool,
    lock_timeout: Option<Duration>,
    factory: F,
    state: Mutex<R, PoolState<T, F::Size>>,
}

impl<T, F: PoolFactory<T>> ObjectPool<T, F, SyncLock> {
    /// Thread-safe pool.
    pub fn new(config: PoolConfig, factory: F) -> Self {
        Self::with_lock_policy(config, factory)
    }
}

impl<T, F: PoolFactory<T>> ObjectPool<T, F, LocalLock> {
    /// Single-threaded pool.
    pub fn new_local(config: PoolConfig, factory: F) -> Self {
        Self::with_lock_policy(config, factory)
    }
}

impl<T, F: PoolFactory<T>, R: LockPolicy> ObjectPool<T, F, R> {
    pub fn with_lock_policy(config: PoolConfig, factory: F) -> Self {
        Self {
            id: CollectionId::next(),
            name: config.name,
            max_size: config.max_size,
            grow_on_miss: config.grow_on_miss,
            lock_timeout: config.lock_timeout,
            factory,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                used: Vec::new(),
                forgotten: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn is_thread_safe(&self) -> bool {
        R::THREAD_SAFE
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    fn lock(&self) -> Result<ScopedLock<'_, R, PoolState<T, F::Size>>> {
        acquire(&self.state, &self.name, self.lock_timeout)
    }

    pub fn used_count(&self) -> Result<usize> {
        Ok(self.lock()?.used.len())
    }

    pub fn free_count(&self) -> Result<usize> {
        Ok(self.lock()?.free.len())
    }

    /// Elements the pool is accountable for: free plus checked out.
    pub fn allocated_count(&self) -> Result<usize> {
        Ok(self.lock()?.allocated())
    }

    /// Check out the best-fitting element for `size_hint`.
    ///
    /// Picks the smallest free element at least `size_hint` large. Without
    /// one, grows the largest free element when `grow_on_miss` is set, and
    /// otherwise creates a new element if the pool is below `max_size`.
    pub fn reserve(&self, size_hint: F::Size) -> Result<Checkout<T>> {
        let mut state = self.lock()?;
        if state.used.len() >= self.max_size {
            return Err(CollectionError::PoolExhausted {
                pool: self.name.clone(),
                used: state.used.len(),
                max: self.max_size,
            });
        }

        let mut element = self.pick(&mut state, size_hint)?;
        self.factory.prepare(&mut element, size_hint);
        let id = state.check_in();
        Ok(Checkout {
            pool: self.id,
            id,
            element,
        })
    }

    fn pick(&self, state: &mut PoolState<T, F::Size>, size_hint: F::Size) -> Result<T> {
        let fit = state.free.partition_point(|(s, _)| *s < size_hint);
        if fit < state.free.len() {
            return Ok(state.free.remove(fit).1);
        }
        if self.grow_on_miss {
            if let Some((_, largest)) = state.free.pop() {
                return Ok(largest);
            }
        }
        if state.allocated() < self.max_size {
            log::debug!("pool `{}` creating element for {:?}", self.name, size_hint);
            return self
                .factory
                .create_new(size_hint)
                .ok_or_else(|| CollectionError::NullElementRejected {
                    collection: self.name.clone(),
                });
        }
        Err(CollectionError::NoCandidateElement {
            pool: self.name.clone(),
            size_hint: format!("{:?}", size_hint),
        })
    }

    /// Check out an element behind a ref-counted handle.
    pub fn reserve_shared(&self, size_hint: F::Size) -> Result<SharedHandle<'_, T, F, R>> {
        let checkout = self.reserve(size_hint)?;
        Ok(SharedHandle {
            inner: Arc::new(Shared {
                pool: self,
                checkout: ManuallyDrop::new(checkout),
            }),
        })
    }

    /// Check out an element that returns to the pool when the handle drops.
    pub fn reserve_exclusive(&self, size_hint: F::Size) -> Result<ExclusiveHandle<'_, T, F, R>> {
        let checkout = self.reserve(size_hint)?;
        Ok(ExclusiveHandle {
            pool: self,
            checkout: ManuallyDrop::new(checkout),
        })
    }

    fn foreign(&self, checkout: &Checkout<T>) -> CollectionError {
        CollectionError::NotFound {
            collection: self.name.clone(),
            what: format!("checkout {}", checkout.id),
        }
    }

    fn check_back(
        &self,
        state: &mut PoolState<T, F::Size>,
        checkout: Checkout<T>,
    ) -> Result<()> {
        if checkout.pool != self.id {
            return Err(self.foreign(&checkout));
        }
        let size = self.factory.element_size(&checkout.element);
        if state.take_used(checkout.id) {
            state.push_free(size, checkout.element);
            return Ok(());
        }
        if state.take_forgotten(checkout.id) {
            if state.allocated() < self.max_size {
                state.push_free(size, checkout.element);
                return Ok(());
            }
            log::debug!(
                "pool `{}` is full; dropping late checkout {}",
                self.name,
                checkout.id
            );
            return Ok(());
        }
        Err(self.foreign(&checkout))
    }

    /// Return a checkout to the free list.
    ///
    /// A checkout forgotten by [`release_all`](Self::release_all) is
    /// recycled if the pool has room and dropped otherwise.
    pub fn release(&self, checkout: Checkout<T>) -> Result<()> {
        let mut state = self.lock()?;
        self.check_back(&mut state, checkout)
    }

    /// Take the element out of the pool for good, freeing its slot.
    pub fn orphan(&self, checkout: Checkout<T>) -> T {
        match self.lock() {
            Ok(mut state) => {
                if !state.take_used(checkout.id) {
                    state.take_forgotten(checkout.id);
                }
            }
            Err(e) => log::warn!(
                "pool `{}` could not orphan checkout {}: {}",
                self.name,
                checkout.id,
                e
            ),
        }
        checkout.element
    }

    /// Return every given checkout in one locked pass and resort the free
    /// list once. Checkouts still outstanding afterwards are forgotten:
    /// they stop counting toward `max_size`.
    pub fn release_all<I>(&self, checkouts: I) -> Result<usize>
    where
        I: IntoIterator<Item = Checkout<T>>,
    {
        let mut state = self.lock()?;
        let mut returned = 0;
        for checkout in checkouts {
            if checkout.pool != self.id {
                log::warn!(
                    "pool `{}` dropping foreign checkout {} in release_all",
                    self.name,
                    checkout.id
                );
                continue;
            }
            let size = self.factory.element_size(&checkout.element);
            if state.take_used(checkout.id) {
                state.free.push((size, checkout.element));
                returned += 1;
            } else if state.take_forgotten(checkout.id) {
                if state.allocated() < self.max_size {
                    state.free.push((size, checkout.element));
                    returned += 1;
                } else {
                    log::debug!(
                        "pool `{}` is full; dropping late checkout {}",
                        self.name,
                        checkout.id
                    );
                }
            }
        }
        state.free.sort_by_key(|(s, _)| *s);

        let outstanding = std::mem::take(&mut state.used);
        if !outstanding.is_empty() {
            log::warn!(
                "pool `{}` forgetting {} outstanding checkouts",
                self.name,
                outstanding.len()
            );
            state.forgotten.extend(outstanding);
            state.forgotten.sort_unstable();
        }
        log::debug!(
            "pool `{}` release_all returned {} elements ({} free)",
            self.name,
            returned,
            state.free.len()
        );
        Ok(returned)
    }

    /// Release from a handle drop, where errors cannot propagate.
    fn release_quietly(&self, checkout: Checkout<T>, from: &str) {
        let id = checkout.id;
        if let Err(e) = self.release(checkout) {
            log::warn!(
                "{} could not return checkout {} to pool `{}`: {}",
                from,
                id,
                self.name,
                e
            );
        }
    }
}

impl<T, F: PoolFactory<T>, R: LockPolicy> fmt::Debug for ObjectPool<T, F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("name", &self.name)
            .field("max_size", &self.max_size)
            .field("grow_on_miss", &self.grow_on_miss)
            .field("thread_safe", &R::THREAD_SAFE)
            .finish()
    }
}

struct Shared<'p, T, F: PoolFactory<T>, R: LockPolicy> {
    pool: &'p ObjectPool<T, F, R>,
    checkout: ManuallyDrop<Checkout<T>>,
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> Drop for Shared<'p, T, F, R> {
    fn drop(&mut self) {
        // SAFETY: `checkout` is taken exactly once, here, and never touched again.
        let checkout = unsafe { ManuallyDrop::take(&mut self.checkout) };
        self.pool.release_quietly(checkout, "shared handle");
    }
}

/// Ref-counted checkout. Cloning bumps the count; the last drop returns the
/// element to its pool.
pub struct SharedHandle<'p, T, F: PoolFactory<T>, R: LockPolicy = SyncLock> {
    inner: Arc<Shared<'p, T, F, R>>,
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> SharedHandle<'p, T, F, R> {
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn id(&self) -> u64 {
        self.inner.checkout.id
    }

    /// Mutable access while this is the only handle.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        Arc::get_mut(&mut self.inner).map(|s| &mut s.checkout.element)
    }
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> Clone for SharedHandle<'p, T, F, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> Deref for SharedHandle<'p, T, F, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.checkout.element
    }
}

impl<'p, T: fmt::Debug, F: PoolFactory<T>, R: LockPolicy> fmt::Debug for SharedHandle<'p, T, F, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHandle")
            .field("id", &self.id())
            .field("refs", &self.ref_count())
            .field("element", &**self)
            .finish()
    }
}

/// Scope-guarded checkout: returns its element to the pool on drop.
pub struct ExclusiveHandle<'p, T, F: PoolFactory<T>, R: LockPolicy = SyncLock> {
    pool: &'p ObjectPool<T, F, R>,
    checkout: ManuallyDrop<Checkout<T>>,
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> ExclusiveHandle<'p, T, F, R> {
    pub fn id(&self) -> u64 {
        self.checkout.id
    }

    fn into_parts(self) -> (&'p ObjectPool<T, F, R>, Checkout<T>) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `this` is never dropped, so the checkout is taken once.
        let checkout = unsafe { ManuallyDrop::take(&mut this.checkout) };
        (this.pool, checkout)
    }

    /// Keep the element; it leaves the pool and its slot is freed.
    pub fn orphan(self) -> T {
        let (pool, checkout) = self.into_parts();
        pool.orphan(checkout)
    }

    /// Return the element now, surfacing any error the drop would swallow.
    pub fn release(self) -> Result<()> {
        let (pool, checkout) = self.into_parts();
        pool.release(checkout)
    }
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> Deref for ExclusiveHandle<'p, T, F, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.checkout.element
    }
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> DerefMut for ExclusiveHandle<'p, T, F, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.checkout.element
    }
}

impl<'p, T, F: PoolFactory<T>, R: LockPolicy> Drop for ExclusiveHandle<'p, T, F, R> {
    fn drop(&mut self) {
        // SAFETY: `checkout` is taken exactly once, here, and never touched again.
        let checkout = unsafe { ManuallyDrop::take(&mut self.checkout) };
        self.pool.release_quietly(checkout, "exclusive handle");
    }
}

impl<'p, T: fmt::Debug, F: PoolFactory<T>, R: LockPolicy> fmt::Debug
    for ExclusiveHandle<'p, T, F, R>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveHandle")
            .field("id", &self.id())
            .field("element", &**self)
            .finish()
    }
}

/// Pool factory for byte buffers, sized by capacity.
///
/// `prepare` clears the buffer, grows it to the hint, and shrinks it back
/// to the hint once its capacity exceeds `hint * shrink_factor`
/// (`shrink_factor == 0` never shrinks).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BufferFactory {
    pub shrink_factor: usize,
}

impl Default for BufferFactory {
    fn default() -> Self {
        Self { shrink_factor: 4 }
    }
}

impl PoolFactory<Vec<u8>> for BufferFactory {
    type Size = usize;

    fn element_size(&self, element: &Vec<u8>) -> usize {
        element.capacity()
    }

    fn create_new(&self, size_hint: usize) -> Option<Vec<u8>> {
        Some(Vec::with_capacity(size_hint))
    }

    fn prepare(&self, element: &mut Vec<u8>, size_hint: usize) {
        element.clear();
        if element.capacity() < size_hint {
            element.reserve(size_hint);
        } else if self.shrink_factor > 0
            && element.capacity() > size_hint.saturating_mul(self.shrink_factor)
        {
            element.shrink_to(size_hint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    /// Fixed-size blocks; counts creations so tests can tell reuse from
    /// allocation.
    #[derive(Debug, PartialEq)]
    struct Block {
        size: usize,
        serial: usize,
    }

    #[derive(Default)]
    struct BlockFactory {
        created: Cell<usize>,
        refuse: bool,
    }

    impl PoolFactory<Block> for BlockFactory {
        type Size = usize;

        fn element_size(&self, b: &Block) -> usize {
            b.size
        }

        fn create_new(&self, size_hint: usize) -> Option<Block> {
            if self.refuse {
                return None;
            }
            self.created.set(self.created.get() + 1);
            Some(Block {
                size: size_hint,
                serial: self.created.get(),
            })
        }

        fn prepare(&self, b: &mut Block, size_hint: usize) {
            b.size = b.size.max(size_hint);
        }
    }

    fn pool(max: usize) -> ObjectPool<Block, BlockFactory, LocalLock> {
        ObjectPool::new_local(PoolConfig::named("blocks", max), BlockFactory::default())
    }

    /// Invariant: a released element is reused for the next request it fits.
    #[test]
    fn best_fit_reuses_released_element() {
        let p = pool(4);
        let mut out: Vec<_> = [10, 20, 5, 8].iter().map(|&s| p.reserve(s).unwrap()).collect();
        assert!(matches!(
            p.reserve(1),
            Err(CollectionError::PoolExhausted { used: 4, max: 4, .. })
        ));

        let twenty = out.remove(1);
        let serial = twenty.serial;
        p.release(twenty).unwrap();
        let again = p.reserve(15).unwrap();
        assert_eq!(again.serial, serial);
        assert_eq!(p.factory().created.get(), 4);
        assert_eq!(p.allocated_count().unwrap(), 4);
    }

    /// Invariant: the smallest sufficient free element wins.
    #[test]
    fn picks_smallest_sufficient() {
        let p = pool(8);
        let a = p.reserve(30).unwrap();
        let b = p.reserve(12).unwrap();
        let c = p.reserve(50).unwrap();
        for co in [a, b, c] {
            p.release(co).unwrap();
        }
        assert_eq!(p.reserve(11).unwrap().size, 12);
        assert_eq!(p.reserve(13).unwrap().size, 30);
    }

    #[test]
    fn full_pool_without_fit_has_no_candidate() {
        let p = pool(2);
        let a = p.reserve(1).unwrap();
        let b = p.reserve(2).unwrap();
        p.release(a).unwrap();
        p.release(b).unwrap();
        assert!(matches!(
            p.reserve(100),
            Err(CollectionError::NoCandidateElement { .. })
        ));
    }

    #[test]
    fn grow_on_miss_takes_the_largest() {
        let p: ObjectPool<Block, _, LocalLock> = ObjectPool::new_local(
            PoolConfig::named("blocks", 2).grow_on_miss(true),
            BlockFactory::default(),
        );
        let a = p.reserve(1).unwrap();
        let b = p.reserve(2).unwrap();
        let big = b.serial;
        p.release(a).unwrap();
        p.release(b).unwrap();
        let grown = p.reserve(100).unwrap();
        assert_eq!(grown.serial, big);
        assert_eq!(grown.size, 100);
    }

    #[test]
    fn refusing_factory_is_rejected() {
        let p: ObjectPool<Block, _, LocalLock> = ObjectPool::new_local(
            PoolConfig::named("blocks", 2),
            BlockFactory {
                refuse: true,
                ..BlockFactory::default()
            },
        );
        assert!(matches!(
            p.reserve(1),
            Err(CollectionError::NullElementRejected { .. })
        ));
        assert_eq!(p.used_count().unwrap(), 0);
    }

    /// Invariant: the last shared handle returns the element.
    #[test]
    fn shared_handle_returns_on_last_drop() {
        let p = pool(2);
        let mut h = p.reserve_shared(4).unwrap();
        assert!(h.get_mut().is_some());
        let h2 = h.clone();
        assert_eq!(h.ref_count(), 2);
        assert!(h.get_mut().is_none());
        drop(h);
        assert_eq!(p.used_count().unwrap(), 1);
        assert_eq!(h2.size, 4);
        drop(h2);
        assert_eq!(p.used_count().unwrap(), 0);
        assert_eq!(p.free_count().unwrap(), 1);
    }

    #[test]
    fn exclusive_handle_scope() {
        let p = pool(2);
        {
            let mut h = p.reserve_exclusive(3).unwrap();
            h.size = 9;
            assert_eq!(p.used_count().unwrap(), 1);
        }
        assert_eq!(p.free_count().unwrap(), 1);
        let co = p.reserve(9).unwrap();
        assert_eq!(co.size, 9);
        p.release(co).unwrap();

        let h = p.reserve_exclusive(1).unwrap();
        let kept = h.orphan();
        assert_eq!(kept.size, 9);
        assert_eq!(p.allocated_count().unwrap(), 0);

        p.reserve_exclusive(2).unwrap().release().unwrap();
        assert_eq!(p.free_count().unwrap(), 1);
    }

    /// Invariant: release_all forgets outstanding checkouts so they stop
    /// counting against the bound, and a late return respects the bound.
    #[test]
    fn release_all_forgets_outstanding() {
        let p = pool(2);
        let a = p.reserve(1).unwrap();
        let late = p.reserve(2).unwrap();
        assert_eq!(p.release_all(vec![a]).unwrap(), 1);
        assert_eq!(p.used_count().unwrap(), 0);
        assert_eq!(p.free_count().unwrap(), 1);

        let _b = p.reserve(3).unwrap();
        p.release(late).unwrap();
        assert_eq!(p.allocated_count().unwrap(), 2);
        assert_eq!(p.free_count().unwrap(), 1);
    }

    /// Invariant: a late return handed to release_all while the pool is
    /// full is dropped, and the forgotten slot can be returned later.
    #[test]
    fn release_all_drops_late_return_when_full() {
        let p = pool(2);
        let a = p.reserve(1).unwrap();
        let late = p.reserve(2).unwrap();
        p.release_all(vec![a]).unwrap();
        let b = p.reserve(3).unwrap();
        assert_eq!(p.allocated_count().unwrap(), 2);

        assert_eq!(p.release_all(vec![late]).unwrap(), 0);
        assert_eq!(p.free_count().unwrap(), 1);
        assert_eq!(p.used_count().unwrap(), 0);

        p.release(b).unwrap();
        assert_eq!(p.free_count().unwrap(), 2);
    }

    /// Invariant: a checkout dropped without release or orphan still
    /// counts as used; only release_all frees its slot.
    #[test]
    fn dropped_checkout_keeps_its_slot() {
        let p = pool(2);
        drop(p.reserve(1).unwrap());
        drop(p.reserve(2).unwrap());
        assert_eq!(p.used_count().unwrap(), 2);
        assert!(matches!(
            p.reserve(1),
            Err(CollectionError::PoolExhausted { used: 2, max: 2, .. })
        ));
        assert_eq!(p.release_all(Vec::new()).unwrap(), 0);
        assert_eq!(p.used_count().unwrap(), 0);
        assert!(p.reserve(1).is_ok_and(|co| p.release(co).is_ok()));
    }

    #[test]
    fn foreign_checkout_is_rejected() {
        let p = pool(2);
        let q = pool(2);
        let co = q.reserve(1).unwrap();
        assert!(matches!(
            p.release(co),
            Err(CollectionError::NotFound { .. })
        ));
    }

    #[test]
    fn buffer_factory_grows_and_shrinks() {
        let f = BufferFactory::default();
        let mut v = f.create_new(8).unwrap_or_default();
        v.extend_from_slice(b"junk");
        f.prepare(&mut v, 64);
        assert!(v.is_empty());
        assert!(v.capacity() >= 64);
        f.prepare(&mut v, 2);
        assert!(v.capacity() < 64);
        assert!(v.capacity() >= 2);
    }
}
