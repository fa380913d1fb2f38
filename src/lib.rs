//! adopt-collections: owning-or-borrowing containers with change tracking,
//! staleness-checked cursors, and a bounded object pool.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: containers that either adopt (own and drop) or merely reference
//!   their elements, decided once per instance, with a cursor protocol that
//!   reports concurrent modification instead of walking freed memory.
//! - Layers:
//!   - `CollectionCore<S, R>`: identity, name, lock and lock timeout around
//!     a storage state `S`. The state embeds a `ChangeTracker` (serial
//!     number, bulk scope, lazily created event topic).
//!   - `Cursor<'c, S, R>`: `(owner, snapshot, position)` over any state
//!     implementing `Traverse`. Never holds the lock between calls.
//!   - `RefList` / `KeyedHashTable`: concrete states (`RefListState`,
//!     `TableState`) plus thin wrappers that lock once per call.
//!   - `ObjectPool<T, F, R>`: independent of the collections; free list
//!     sorted by size, used list of checkout ids, shared and exclusive
//!     handles layered on raw `Checkout`s.
//!
//! Constraints
//! - Elements are `Element::Owned(Box<T>)` or `Element::Borrowed(&T)`;
//!   the variant must match the collection's `Adoption` or the insert
//!   fails with `AdoptionMismatch`.
//! - Positions are generational arena keys (`slotmap`), so a cursor or
//!   handle to a removed element resolves to nothing rather than to
//!   freed memory.
//! - Every structural change bumps the serial number exactly once, or
//!   once per bulk scope.
//! - Thread-safety is a type parameter: `SyncLock` instances are
//!   `Send + Sync`, `LocalLock` instances are neither and panic on nested
//!   locking.
//!
//! Locking
//! - Wrapper methods lock for the duration of one call. `lock()` returns
//!   the state itself, whose methods are the same operations, so
//!   check-then-insert sequences compose under one guard.
//! - Element access on wrappers and cursors (`current`, `with`,
//!   `find_by_key`) takes a closure; no reference outlives the call.
//! - Two-instance operations (`equals`, `move_from`) lock `self` before
//!   `other`.
//! - Event sinks run while the collection is locked and must not call
//!   back into it.
//!
//! Notes and non-goals
//! - No streaming/serialization of collections.
//! - Hash table resize is lossy: it empties the table before
//!   reallocating buckets.

mod collection;
mod config;
mod cursor;
mod element;
mod error;
pub mod keyed_hash_table;
mod keyed_hash_table_proptest;
mod lock;
pub mod pool;
pub mod ref_list;

// Public surface
pub use collection::{
    ChangeEvent, ChangeKind, ChangeTracker, Collection, CollectionCore, CollectionId, EventSink,
    Storage, SubscriptionId,
};
pub use config::{Adoption, CollectionConfig, PoolConfig};
pub use cursor::{Cursor, CursorState, End, Traverse};
pub use element::Element;
pub use error::{CollectionError, Result};
pub use keyed_hash_table::{
    EntryHandle, KeyOps, KeyedHashTable, StdKeyOps, TableCursor, TablePos, TableState,
};
pub use lock::{LocalLock, LockPolicy, ScopedLock, SyncLock};
pub use pool::{
    BufferFactory, Checkout, ExclusiveHandle, ObjectPool, PoolFactory, SharedHandle,
};
pub use ref_list::{ListCursor, NodeHandle, RefList, RefListState};
