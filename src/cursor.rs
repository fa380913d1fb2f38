//! External cursors with serial-number staleness detection.
//!
//! A cursor is `(owner, snapshot, position)`. It never holds its
//! collection locked between calls; every call locks, compares the
//! snapshot with the collection's current serial number and only then
//! touches the position. A cursor created before a structural change
//! therefore fails with `StaleCursor` until it is `reset` or moved with
//! `seek_to_end`, both of which resynchronize the snapshot.
//!
//! Positions are arena handles, never raw addresses; a position that went
//! dead without a serial bump (removals inside a bulk scope) is reported
//! as `InvalidCursor` instead of being dereferenced.

use crate::collection::{CollectionCore, CollectionId, Storage};
use crate::element::Element;
use crate::error::Result;
use crate::lock::LockPolicy;
use core::fmt;
use core::ops::Deref;

/// Positional navigation a collection state offers to cursors.
pub trait Traverse: Storage {
    type Pos: Copy + Eq + fmt::Debug;
    type Item;

    fn first_pos(&self) -> Option<Self::Pos>;
    fn last_pos(&self) -> Option<Self::Pos>;
    fn next_pos(&self, at: Self::Pos) -> Option<Self::Pos>;
    fn prev_pos(&self, at: Self::Pos) -> Option<Self::Pos>;
    fn item(&self, at: Self::Pos) -> Option<&Self::Item>;
    fn item_mut(&mut self, at: Self::Pos) -> Option<&mut Self::Item>;

    fn is_live(&self, at: Self::Pos) -> bool {
        self.item(at).is_some()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum End {
    Front,
    Back,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CursorState {
    /// Never synchronized; always stale.
    Uninitialized,
    Positioned,
    /// Stepped past one end of the collection.
    AtEnd(End),
}

/// Where an insertion relative to a cursor lands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Anchor<P> {
    Head,
    After(P),
    Tail,
}

pub struct Cursor<'c, S: Traverse, R: LockPolicy> {
    owner: &'c CollectionCore<S, R>,
    snapshot: u64,
    pos: Option<S::Pos>,
    state: CursorState,
}

impl<'c, S: Traverse, R: LockPolicy> Cursor<'c, S, R> {
    pub(crate) fn uninit(owner: &'c CollectionCore<S, R>) -> Self {
        Self {
            owner,
            snapshot: 0,
            pos: None,
            state: CursorState::Uninitialized,
        }
    }

    pub fn owner_id(&self) -> CollectionId {
        self.owner.id()
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    pub fn belongs_to(&self, core: &CollectionCore<S, R>) -> bool {
        self.owner.id() == core.id()
    }

    /// Move to the first element and resynchronize. Returns whether the
    /// collection has any element.
    pub fn reset(&mut self) -> Result<bool> {
        let owner = self.owner;
        let state = owner.lock()?;
        Ok(self.rewind(&state))
    }

    pub(crate) fn rewind(&mut self, state: &S) -> bool {
        self.snapshot = state.tracker().serial();
        let first = state.first_pos();
        log::trace!(
            "cursor on `{}` reset at serial {}",
            state.tracker().name(),
            self.snapshot
        );
        self.land(first, End::Back)
    }

    /// Jump to the last element and resynchronize. Exempt from the
    /// staleness check for that reason.
    pub fn seek_to_end(&mut self) -> Result<bool> {
        let owner = self.owner;
        let state = owner.lock()?;
        self.snapshot = state.tracker().serial();
        let last = state.last_pos();
        Ok(self.land(last, End::Front))
    }

    /// Step forward. `Ok(false)` once the cursor walks off the back end.
    pub fn next(&mut self) -> Result<bool> {
        let owner = self.owner;
        let state = owner.lock()?;
        self.check_fresh(&state)?;
        let target = match self.state {
            CursorState::Positioned => {
                let at = self.live_pos(&state)?;
                state.next_pos(at)
            }
            CursorState::AtEnd(End::Front) => state.first_pos(),
            CursorState::AtEnd(End::Back) => return Ok(false),
            CursorState::Uninitialized => return Err(state.tracker().invalid_cursor()),
        };
        Ok(self.land(target, End::Back))
    }

    /// Step backward. `Ok(false)` once the cursor walks off the front end.
    pub fn previous(&mut self) -> Result<bool> {
        let owner = self.owner;
        let state = owner.lock()?;
        self.check_fresh(&state)?;
        let target = match self.state {
            CursorState::Positioned => {
                let at = self.live_pos(&state)?;
                state.prev_pos(at)
            }
            CursorState::AtEnd(End::Back) => state.last_pos(),
            CursorState::AtEnd(End::Front) => return Ok(false),
            CursorState::Uninitialized => return Err(state.tracker().invalid_cursor()),
        };
        Ok(self.land(target, End::Front))
    }

    /// Run `f` on the element under the cursor. The collection is locked
    /// for the duration of this call only.
    pub fn current<U>(&self, f: impl FnOnce(&<S::Item as Deref>::Target) -> U) -> Result<U>
    where
        S::Item: Deref,
    {
        let state = self.owner.lock()?;
        let at = self.checked_pos(&state)?;
        match state.item(at) {
            Some(item) => Ok(f(&**item)),
            None => Err(state.tracker().invalid_cursor()),
        }
    }

    /// Run `f` on the element under the cursor, mutably. Only owned
    /// elements can be mutated; a borrowed one yields `AdoptionMismatch`.
    pub fn current_mut<'e, T, U>(&self, f: impl FnOnce(&mut T) -> U) -> Result<U>
    where
        S: Traverse<Item = Element<'e, T>>,
        T: 'e,
    {
        let mut state = self.owner.lock()?;
        let at = self.checked_pos(&state)?;
        match state.item_mut(at) {
            Some(Element::Owned(b)) => return Ok(f(&mut **b)),
            Some(Element::Borrowed(_)) => {}
            None => return Err(state.tracker().invalid_cursor()),
        }
        Err(state
            .tracker()
            .adoption_mismatch("borrowed elements are read-only"))
    }

    pub fn is_stale(&self) -> Result<bool> {
        let state = self.owner.lock()?;
        Ok(self.snapshot != state.tracker().serial())
    }

    /// Fresh, positioned and on a live element.
    pub fn is_valid(&self) -> Result<bool> {
        let state = self.owner.lock()?;
        Ok(self.checked_pos(&state).is_ok())
    }

    fn land(&mut self, target: Option<S::Pos>, past: End) -> bool {
        match target {
            Some(p) => {
                self.pos = Some(p);
                self.state = CursorState::Positioned;
                true
            }
            None => {
                self.pos = None;
                self.state = CursorState::AtEnd(past);
                false
            }
        }
    }

    fn check_fresh(&self, state: &S) -> Result<()> {
        if self.snapshot != state.tracker().serial() {
            return Err(state.tracker().stale(self.snapshot));
        }
        Ok(())
    }

    fn live_pos(&self, state: &S) -> Result<S::Pos> {
        match self.pos {
            Some(p) if state.is_live(p) => Ok(p),
            _ => Err(state.tracker().invalid_cursor()),
        }
    }

    fn checked_pos(&self, state: &S) -> Result<S::Pos> {
        self.check_fresh(state)?;
        if self.state != CursorState::Positioned {
            return Err(state.tracker().invalid_cursor());
        }
        self.live_pos(state)
    }

    /// Position this cursor denotes inside `state`, for cursor-addressed
    /// mutations. Foreign cursors are rejected before anything else.
    pub(crate) fn target_in(&self, state: &S) -> Result<S::Pos> {
        if self.owner.id() != state.tracker().id() {
            return Err(state.tracker().not_my_cursor());
        }
        self.checked_pos(state)
    }

    /// Lenient variant of [`target_in`](Self::target_in) for insertions: a
    /// stale or unpositioned cursor anchors at the tail, a cursor that
    /// stepped off the front anchors at the head.
    pub(crate) fn anchor_in(&self, state: &S) -> Result<Anchor<S::Pos>> {
        if self.owner.id() != state.tracker().id() {
            return Err(state.tracker().not_my_cursor());
        }
        if self.check_fresh(state).is_err() {
            return Ok(Anchor::Tail);
        }
        Ok(match (self.state, self.pos) {
            (CursorState::Positioned, Some(p)) if state.is_live(p) => Anchor::After(p),
            (CursorState::AtEnd(End::Front), _) => Anchor::Head,
            _ => Anchor::Tail,
        })
    }
}

impl<'c, S: Traverse, R: LockPolicy> Clone for Cursor<'c, S, R> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner,
            snapshot: self.snapshot,
            pos: self.pos,
            state: self.state,
        }
    }
}

/// Same owner and same position.
impl<'c, S: Traverse, R: LockPolicy> PartialEq for Cursor<'c, S, R> {
    fn eq(&self, other: &Self) -> bool {
        self.owner.id() == other.owner.id() && self.state == other.state && self.pos == other.pos
    }
}

impl<'c, S: Traverse, R: LockPolicy> Eq for Cursor<'c, S, R> {}

impl<'c, S: Traverse, R: LockPolicy> fmt::Debug for Cursor<'c, S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("owner", &self.owner.id())
            .field("snapshot", &self.snapshot)
            .field("state", &self.state)
            .field("pos", &self.pos)
            .finish()
    }
}
