//! RefList: doubly linked list of owned or borrowed elements.
//!
//! Nodes live in a generational arena (`SlotMap`) and link to each other by
//! key, so a [`NodeHandle`] stays valid for exactly as long as its node and
//! never aliases a later node that reuses the slot. The adoption mode is
//! fixed at construction; an element whose variant disagrees with it is
//! rejected with `AdoptionMismatch` rather than silently changing who frees
//! it.
//!
//! [`RefListState`] is the locked view: every operation is available on it
//! so several can be composed under one `lock()`. The methods on
//! [`RefList`] each take the lock for a single call.

use crate::collection::{ChangeKind, ChangeTracker, Collection, CollectionCore, Storage};
use crate::config::{Adoption, CollectionConfig};
use crate::cursor::{Anchor, Cursor, Traverse};
use crate::element::Element;
use crate::error::Result;
use crate::lock::{LocalLock, LockPolicy, SyncLock};
use core::cmp::Ordering;
use core::ops::Deref;
use slotmap::{DefaultKey, SlotMap};

/// Stable handle to a list node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeHandle(DefaultKey);

struct Node<'e, T> {
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
    element: Element<'e, T>,
}

pub struct RefListState<'e, T> {
    tracker: ChangeTracker,
    adoption: Adoption,
    nodes: SlotMap<DefaultKey, Node<'e, T>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

/// Cursor over a [`RefList`].
pub type ListCursor<'c, 'e, T, R = SyncLock> = Cursor<'c, RefListState<'e, T>, R>;

impl<'e, T> RefListState<'e, T> {
    fn new(tracker: ChangeTracker, adoption: Adoption) -> Self {
        Self {
            tracker,
            adoption,
            nodes: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    pub fn adoption(&self) -> Adoption {
        self.adoption
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn admit(&self, element: &Element<'e, T>) -> Result<()> {
        if element.adoption() != self.adoption {
            return Err(self.tracker.adoption_mismatch(format!(
                "{:?} element offered to a {:?} list",
                element.adoption(),
                self.adoption
            )));
        }
        Ok(())
    }

    fn link(&mut self, element: Element<'e, T>, anchor: Anchor<NodeHandle>) -> DefaultKey {
        let (prev, next) = match anchor {
            Anchor::Head => (None, self.head),
            Anchor::Tail => (self.tail, None),
            Anchor::After(NodeHandle(k)) => (Some(k), self.nodes.get(k).and_then(|n| n.next)),
        };
        let key = self.nodes.insert(Node {
            prev,
            next,
            element,
        });
        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.next = Some(key),
            None => self.head = Some(key),
        }
        match next.and_then(|n| self.nodes.get_mut(n)) {
            Some(n) => n.prev = Some(key),
            None => self.tail = Some(key),
        }
        key
    }

    fn unlink(&mut self, key: DefaultKey) -> Option<Element<'e, T>> {
        let node = self.nodes.remove(key)?;
        match node.prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(p) => p.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.nodes.get_mut(n)) {
            Some(n) => n.prev = node.prev,
            None => self.tail = node.prev,
        }
        Some(node.element)
    }

    /// Rebuild every link from `order`, which must hold each live key once.
    fn relink(&mut self, order: &[DefaultKey]) {
        for (i, &k) in order.iter().enumerate() {
            if let Some(n) = self.nodes.get_mut(k) {
                n.prev = i.checked_sub(1).map(|p| order[p]);
                n.next = order.get(i + 1).copied();
            }
        }
        self.head = order.first().copied();
        self.tail = order.last().copied();
    }

    fn keys(&self) -> Vec<DefaultKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cur = self.head;
        while let Some(k) = cur {
            out.push(k);
            cur = self.nodes.get(k).and_then(|n| n.next);
        }
        out
    }

    fn key_of(&self, ptr: *const T) -> Option<DefaultKey> {
        self.keys()
            .into_iter()
            .find(|&k| self.nodes.get(k).is_some_and(|n| core::ptr::eq(n.element.as_ptr(), ptr)))
    }

    pub fn add_at_top(&mut self, element: Element<'e, T>) -> Result<NodeHandle> {
        self.admit(&element)?;
        let key = self.link(element, Anchor::Head);
        self.tracker.record(ChangeKind::Added);
        Ok(NodeHandle(key))
    }

    pub fn add_at_bottom(&mut self, element: Element<'e, T>) -> Result<NodeHandle> {
        self.admit(&element)?;
        let key = self.link(element, Anchor::Tail);
        self.tracker.record(ChangeKind::Added);
        Ok(NodeHandle(key))
    }

    /// Splice after the cursor's element. A cursor that is stale or not on
    /// an element appends at the tail; one that stepped off the front
    /// prepends.
    pub fn insert_after<R: LockPolicy>(
        &mut self,
        element: Element<'e, T>,
        cursor: &Cursor<'_, Self, R>,
    ) -> Result<NodeHandle> {
        let anchor = cursor.anchor_in(self)?;
        self.admit(&element)?;
        let key = self.link(element, anchor);
        self.tracker.record(ChangeKind::Added);
        Ok(NodeHandle(key))
    }

    /// Append every element inside one bulk scope. Stops at the first
    /// rejected element; the ones before it stay.
    pub fn bulk_load<I>(&mut self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = Element<'e, T>>,
    {
        let start = self.nodes.len();
        self.tracker.begin_bulk()?;
        let mut added = 0;
        let mut outcome = Ok(());
        for element in elements {
            if let Err(e) = self.admit(&element) {
                outcome = Err(e);
                break;
            }
            self.link(element, Anchor::Tail);
            self.tracker.record(ChangeKind::Added);
            added += 1;
        }
        self.tracker.end_bulk(true, start, added)?;
        outcome.map(|()| added)
    }

    /// Detach the element at `ptr` without destroying it, whatever the
    /// adoption mode.
    pub fn orphan_element(&mut self, ptr: *const T) -> Result<Element<'e, T>> {
        let key = self
            .key_of(ptr)
            .ok_or_else(|| self.tracker.not_found(format!("element at {:p}", ptr)))?;
        self.detach(key)
    }

    /// Detach the element at `ptr` and drop it (freeing it if owned).
    pub fn remove_element(&mut self, ptr: *const T) -> Result<()> {
        self.orphan_element(ptr).map(drop)
    }

    pub fn orphan(&mut self, handle: NodeHandle) -> Result<Element<'e, T>> {
        self.detach(handle.0)
    }

    pub fn remove(&mut self, handle: NodeHandle) -> Result<()> {
        self.detach(handle.0).map(drop)
    }

    pub fn orphan_at<R: LockPolicy>(&mut self, cursor: &Cursor<'_, Self, R>) -> Result<Element<'e, T>> {
        let at = cursor.target_in(self)?;
        self.detach(at.0)
    }

    pub fn remove_at<R: LockPolicy>(&mut self, cursor: &Cursor<'_, Self, R>) -> Result<()> {
        self.orphan_at(cursor).map(drop)
    }

    fn detach(&mut self, key: DefaultKey) -> Result<Element<'e, T>> {
        let element = self
            .unlink(key)
            .ok_or_else(|| self.tracker.not_found("node handle"))?;
        self.tracker.record(ChangeKind::Removed);
        Ok(element)
    }

    /// Detach the first element; the caller owns whatever comes back.
    pub fn pop_from_top(&mut self) -> Result<Element<'e, T>> {
        self.try_pop_from_top().ok_or_else(|| self.tracker.empty())
    }

    pub fn try_pop_from_top(&mut self) -> Option<Element<'e, T>> {
        let key = self.head?;
        self.detach(key).ok()
    }

    pub fn pop_from_bottom(&mut self) -> Result<Element<'e, T>> {
        self.try_pop_from_bottom().ok_or_else(|| self.tracker.empty())
    }

    pub fn try_pop_from_bottom(&mut self) -> Option<Element<'e, T>> {
        let key = self.tail?;
        self.detach(key).ok()
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        self.nodes.get(handle.0).map(|n| &*n.element)
    }

    /// Mutable access; `None` for dead handles and borrowed elements.
    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        self.nodes.get_mut(handle.0).and_then(|n| n.element.get_mut())
    }

    pub fn top(&self) -> Option<&T> {
        self.head.and_then(|k| self.get(NodeHandle(k)))
    }

    pub fn bottom(&self) -> Option<&T> {
        self.tail.and_then(|k| self.get(NodeHandle(k)))
    }

    pub fn iter(&self) -> Iter<'_, 'e, T> {
        Iter {
            nodes: &self.nodes,
            cur: self.head,
        }
    }

    pub fn find(&self, value: &T) -> Option<NodeHandle>
    where
        T: PartialEq,
    {
        self.keys()
            .into_iter()
            .find(|&k| self.nodes.get(k).is_some_and(|n| *n.element == *value))
            .map(NodeHandle)
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.find(value).is_some()
    }

    pub fn reverse(&mut self) {
        let mut order = self.keys();
        order.reverse();
        self.relink(&order);
        self.tracker.record(ChangeKind::Reordered);
    }

    /// Stable sort; handles keep following their elements.
    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        let mut order = self.keys();
        let nodes = &self.nodes;
        order.sort_by(|&a, &b| match (nodes.get(a), nodes.get(b)) {
            (Some(x), Some(y)) => compare(&*x.element, &*y.element),
            _ => Ordering::Equal,
        });
        self.relink(&order);
        self.tracker.record(ChangeKind::Reordered);
    }

    /// Exchange the positions of two nodes.
    pub fn swap(&mut self, a: NodeHandle, b: NodeHandle) -> Result<()> {
        let mut order = self.keys();
        let ia = order.iter().position(|&k| k == a.0);
        let ib = order.iter().position(|&k| k == b.0);
        let (Some(ia), Some(ib)) = (ia, ib) else {
            return Err(self.tracker.not_found("node handle"));
        };
        order.swap(ia, ib);
        self.relink(&order);
        self.tracker.record(ChangeKind::Swapped);
        Ok(())
    }

    /// Move-assign `source` into `self`. Both must share an adoption mode;
    /// otherwise neither side is touched.
    pub fn move_from(&mut self, source: &mut Self) -> Result<()> {
        if self.adoption != source.adoption {
            return Err(self.tracker.adoption_mismatch(format!(
                "cannot move {:?} contents from `{}` into a {:?} list",
                source.adoption,
                source.tracker.name(),
                self.adoption
            )));
        }
        self.nodes = core::mem::take(&mut source.nodes);
        self.head = source.head.take();
        self.tail = source.tail.take();
        self.tracker.record(ChangeKind::Reloaded);
        source.tracker.record(ChangeKind::Cleared);
        Ok(())
    }

    pub fn equals(&self, other: &Self) -> bool
    where
        T: PartialEq,
    {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<'e, T> Storage for RefListState<'e, T> {
    fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    fn element_count(&self) -> usize {
        self.nodes.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        self.tracker.record(ChangeKind::Cleared);
    }
}

impl<'e, T> Traverse for RefListState<'e, T> {
    type Pos = NodeHandle;
    type Item = Element<'e, T>;

    fn first_pos(&self) -> Option<NodeHandle> {
        self.head.map(NodeHandle)
    }

    fn last_pos(&self) -> Option<NodeHandle> {
        self.tail.map(NodeHandle)
    }

    fn next_pos(&self, at: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(at.0)?.next.map(NodeHandle)
    }

    fn prev_pos(&self, at: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(at.0)?.prev.map(NodeHandle)
    }

    fn item(&self, at: NodeHandle) -> Option<&Element<'e, T>> {
        self.nodes.get(at.0).map(|n| &n.element)
    }

    fn item_mut(&mut self, at: NodeHandle) -> Option<&mut Element<'e, T>> {
        self.nodes.get_mut(at.0).map(|n| &mut n.element)
    }
}

/// In-order iterator over a locked list.
pub struct Iter<'a, 'e, T> {
    nodes: &'a SlotMap<DefaultKey, Node<'e, T>>,
    cur: Option<DefaultKey>,
}

impl<'a, 'e, T> Iterator for Iter<'a, 'e, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let node = self.nodes.get(self.cur?)?;
        self.cur = node.next;
        Some(&*node.element)
    }
}

/// Thread-safe by default; see [`RefList::new_local`] for the
/// single-threaded flavor.
pub struct RefList<'e, T, R: LockPolicy = SyncLock> {
    core: CollectionCore<RefListState<'e, T>, R>,
    adoption: Adoption,
}

impl<'e, T> RefList<'e, T, SyncLock> {
    pub fn new(config: CollectionConfig) -> Self {
        Self::with_lock_policy(config)
    }
}

impl<'e, T> RefList<'e, T, LocalLock> {
    pub fn new_local(config: CollectionConfig) -> Self {
        Self::with_lock_policy(config)
    }
}

impl<'e, T, R: LockPolicy> RefList<'e, T, R> {
    pub fn with_lock_policy(config: CollectionConfig) -> Self {
        let adoption = config.adoption;
        Self {
            core: CollectionCore::new(&config, |tracker| RefListState::new(tracker, adoption)),
            adoption,
        }
    }

    pub fn adoption(&self) -> Adoption {
        self.adoption
    }

    /// Cursor positioned on the first element (or past the end if empty).
    pub fn cursor(&self) -> Result<ListCursor<'_, 'e, T, R>> {
        let mut c = Cursor::uninit(&self.core);
        c.reset()?;
        Ok(c)
    }

    /// Cursor that stays stale until reset.
    pub fn cursor_uninit(&self) -> ListCursor<'_, 'e, T, R> {
        Cursor::uninit(&self.core)
    }

    pub fn add_at_top(&self, element: impl Into<Element<'e, T>>) -> Result<NodeHandle> {
        self.core.lock()?.add_at_top(element.into())
    }

    pub fn add_at_bottom(&self, element: impl Into<Element<'e, T>>) -> Result<NodeHandle> {
        self.core.lock()?.add_at_bottom(element.into())
    }

    pub fn insert_after(
        &self,
        element: impl Into<Element<'e, T>>,
        cursor: &ListCursor<'_, 'e, T, R>,
    ) -> Result<NodeHandle> {
        self.core.lock()?.insert_after(element.into(), cursor)
    }

    pub fn bulk_load<I>(&self, elements: I) -> Result<usize>
    where
        I: IntoIterator<Item = Element<'e, T>>,
    {
        self.core.lock()?.bulk_load(elements)
    }

    pub fn orphan_element(&self, ptr: *const T) -> Result<Element<'e, T>> {
        self.core.lock()?.orphan_element(ptr)
    }

    pub fn remove_element(&self, ptr: *const T) -> Result<()> {
        self.core.lock()?.remove_element(ptr)
    }

    pub fn orphan(&self, handle: NodeHandle) -> Result<Element<'e, T>> {
        self.core.lock()?.orphan(handle)
    }

    pub fn remove(&self, handle: NodeHandle) -> Result<()> {
        self.core.lock()?.remove(handle)
    }

    pub fn orphan_at(&self, cursor: &ListCursor<'_, 'e, T, R>) -> Result<Element<'e, T>> {
        self.core.lock()?.orphan_at(cursor)
    }

    pub fn remove_at(&self, cursor: &ListCursor<'_, 'e, T, R>) -> Result<()> {
        self.core.lock()?.remove_at(cursor)
    }

    pub fn pop_from_top(&self) -> Result<Element<'e, T>> {
        self.core.lock()?.pop_from_top()
    }

    pub fn try_pop_from_top(&self) -> Result<Option<Element<'e, T>>> {
        Ok(self.core.lock()?.try_pop_from_top())
    }

    pub fn pop_from_bottom(&self) -> Result<Element<'e, T>> {
        self.core.lock()?.pop_from_bottom()
    }

    pub fn try_pop_from_bottom(&self) -> Result<Option<Element<'e, T>>> {
        Ok(self.core.lock()?.try_pop_from_bottom())
    }

    /// Run `f` on the element behind `handle`.
    pub fn with<U>(&self, handle: NodeHandle, f: impl FnOnce(&T) -> U) -> Result<U> {
        let state = self.core.lock()?;
        match state.get(handle) {
            Some(v) => Ok(f(v)),
            None => Err(state.tracker().not_found("node handle")),
        }
    }

    pub fn find(&self, value: &T) -> Result<Option<NodeHandle>>
    where
        T: PartialEq,
    {
        Ok(self.core.lock()?.find(value))
    }

    pub fn contains(&self, value: &T) -> Result<bool>
    where
        T: PartialEq,
    {
        Ok(self.core.lock()?.contains(value))
    }

    pub fn to_vec(&self) -> Result<Vec<T>>
    where
        T: Clone,
    {
        Ok(self.core.lock()?.iter().cloned().collect())
    }

    pub fn reverse(&self) -> Result<()> {
        self.core.lock()?.reverse();
        Ok(())
    }

    pub fn sort_by<F>(&self, compare: F) -> Result<()>
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.core.lock()?.sort_by(compare);
        Ok(())
    }

    pub fn swap(&self, a: NodeHandle, b: NodeHandle) -> Result<()> {
        self.core.lock()?.swap(a, b)
    }

    /// Move-assign `source`'s contents into this list (locks `self` first).
    pub fn move_from(&self, source: &Self) -> Result<()> {
        if self.core.id() == source.core.id() {
            return Ok(());
        }
        let (mut mine, mut theirs) = self.core.lock_pair(&source.core)?;
        mine.move_from(&mut *theirs)
    }

    /// Element-wise equality (locks `self` first).
    pub fn equals(&self, other: &Self) -> Result<bool>
    where
        T: PartialEq,
    {
        if self.core.id() == other.core.id() {
            return Ok(true);
        }
        let (mine, theirs) = self.core.lock_pair(&other.core)?;
        Ok(mine.equals(&theirs))
    }
}

impl<'e, T, R: LockPolicy> Deref for RefList<'e, T, R> {
    type Target = CollectionCore<RefListState<'e, T>, R>;

    fn deref(&self) -> &Self::Target {
        &self.core
    }
}

impl<'e, T, R: LockPolicy> Collection for RefList<'e, T, R> {
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
