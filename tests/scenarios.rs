// End-to-end scenarios across the collection types and the pool.
//
// Each test names the behavior being verified and the invariants it
// relies on or asserts.
use adopt_collections::{
    Adoption, BufferFactory, Collection, CollectionConfig, CollectionError, CursorState, End,
    KeyOps, KeyedHashTable, ObjectPool, PoolConfig, RefList,
};

#[derive(Clone, Debug, PartialEq)]
struct Rec {
    key: String,
    value: i32,
}

fn rec(key: &str, value: i32) -> Box<Rec> {
    Box::new(Rec {
        key: key.to_string(),
        value,
    })
}

// Letters hash by alphabet position, so "a" and "e" share bucket 0 of 4.
struct Alphabet;
impl KeyOps<str> for Alphabet {
    fn hash(&self, key: &str, modulus: usize) -> usize {
        key.bytes()
            .next()
            .map_or(0, |b| b.wrapping_sub(b'a') as usize % modulus)
    }
    fn equal(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

// Test: best-fit reuse in a bounded pool.
// Assumes: buffers are sized by capacity.
// Verifies: the fifth concurrent checkout fails with PoolExhausted and a
// released 20-byte buffer serves a later 15-byte request without a new
// allocation.
#[test]
fn scenario_a_pool_best_fit() {
    let pool: ObjectPool<Vec<u8>, _> =
        ObjectPool::new(PoolConfig::named("buffers", 4), BufferFactory::default());
    let mut out = Vec::new();
    for size in [10, 20, 5, 8] {
        out.push(pool.reserve(size).unwrap());
    }
    assert!(matches!(
        pool.reserve(1),
        Err(CollectionError::PoolExhausted { used: 4, max: 4, .. })
    ));

    let twenty = out.remove(1);
    let addr = twenty.as_ptr();
    pool.release(twenty).unwrap();

    let again = pool.reserve(15).unwrap();
    assert_eq!(again.as_ptr(), addr);
    assert!(again.capacity() >= 20);
    assert_eq!(pool.allocated_count().unwrap(), 4);
    assert!(pool.used_count().unwrap() + pool.free_count().unwrap() <= pool.max_size());
}

// Test: bucket-order traversal with a collision chain.
// Verifies: forward traversal visits all three keys once; walking back from
// the end visits them in exactly the reverse order.
#[test]
fn scenario_b_table_traversal_both_ways() {
    let table = KeyedHashTable::with_key_ops(
        CollectionConfig::named("letters"),
        4,
        |r: &Rec| r.key.as_str(),
        Alphabet,
    );
    for (i, k) in ["a", "b", "e"].into_iter().enumerate() {
        table.add(rec(k, i as i32)).unwrap();
    }
    assert_eq!(table.bucket_lengths().unwrap(), vec![2, 1, 0, 0]);

    let mut c = table.cursor().unwrap();
    let mut forward = Vec::new();
    loop {
        forward.push(c.current(|r| r.key.clone()).unwrap());
        if !c.next().unwrap() {
            break;
        }
    }
    assert_eq!(c.state(), CursorState::AtEnd(End::Back));
    let mut sorted = forward.clone();
    sorted.sort();
    assert_eq!(sorted, vec!["a", "b", "e"]);

    let mut backward = Vec::new();
    assert!(c.seek_to_end().unwrap());
    loop {
        backward.push(c.current(|r| r.key.clone()).unwrap());
        if !c.previous().unwrap() {
            break;
        }
    }
    backward.reverse();
    assert_eq!(backward, forward);
}

// Test: insert_after anchoring rules.
// Verifies: a never-reset cursor appends at the tail; a cursor stepped off
// the front with previous() prepends at the head.
#[test]
fn scenario_c_insert_after_anchors() {
    let list: RefList<'_, i32> = RefList::new(CollectionConfig::named("anchors"));
    list.add_at_bottom(Box::new(1)).unwrap();
    list.add_at_bottom(Box::new(2)).unwrap();

    let never_reset = list.cursor_uninit();
    list.insert_after(Box::new(3), &never_reset).unwrap();
    assert_eq!(list.to_vec().unwrap(), vec![1, 2, 3]);

    let mut c = list.cursor().unwrap();
    assert_eq!(c.current(|v| *v).unwrap(), 1);
    assert!(!c.previous().unwrap());
    assert_eq!(c.state(), CursorState::AtEnd(End::Front));
    list.insert_after(Box::new(0), &c).unwrap();
    assert_eq!(list.to_vec().unwrap(), vec![0, 1, 2, 3]);
}

// Test: move-assignment between lists of different adoption modes.
// Verifies: AdoptionMismatch, and neither list changes.
#[test]
fn scenario_d_move_across_adoption_modes_fails() {
    let backing = [7, 8];
    let owning: RefList<'_, i32> = RefList::new(CollectionConfig::named("owning"));
    owning.add_at_bottom(Box::new(1)).unwrap();
    owning.add_at_bottom(Box::new(2)).unwrap();
    let borrowing: RefList<'_, i32> =
        RefList::new(CollectionConfig::named("borrowing").adoption(Adoption::NoAdopt));
    for v in &backing {
        borrowing.add_at_bottom(v).unwrap();
    }
    let serials = (
        owning.serial_number().unwrap(),
        borrowing.serial_number().unwrap(),
    );

    assert!(matches!(
        borrowing.move_from(&owning),
        Err(CollectionError::AdoptionMismatch { .. })
    ));
    assert_eq!(owning.to_vec().unwrap(), vec![1, 2]);
    assert_eq!(borrowing.to_vec().unwrap(), vec![7, 8]);
    assert_eq!(
        serials,
        (
            owning.serial_number().unwrap(),
            borrowing.serial_number().unwrap()
        )
    );
}

// Test: move-assignment between lists sharing an adoption mode.
// Verifies: target is replaced, source ends empty.
#[test]
fn move_from_same_mode_transfers_everything() {
    let a: RefList<'_, i32> = RefList::new(CollectionConfig::named("a"));
    let b: RefList<'_, i32> = RefList::new(CollectionConfig::named("b"));
    a.add_at_bottom(Box::new(1)).unwrap();
    b.add_at_bottom(Box::new(5)).unwrap();
    b.add_at_bottom(Box::new(6)).unwrap();

    a.move_from(&b).unwrap();
    assert_eq!(a.to_vec().unwrap(), vec![5, 6]);
    assert!(b.is_empty().unwrap());
    a.move_from(&a).unwrap();
    assert_eq!(a.element_count().unwrap(), 2);
}

// Test: hash table round trip.
// Verifies: every added key is found with its value; after removal the
// Result form fails with NotFound and the Option form returns None.
#[test]
fn table_round_trip() {
    let table = KeyedHashTable::new(CollectionConfig::named("round"), 16, |r: &Rec| {
        r.key.as_str()
    });
    let keys: Vec<String> = (0..50).map(|i| format!("key-{i}")).collect();
    for (i, k) in keys.iter().enumerate() {
        table.add(rec(k, i as i32)).unwrap();
    }
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(table.find_by_key(k, |r| r.value).unwrap(), i as i32);
    }
    for k in keys.iter().step_by(2) {
        table.remove_by_key(k).unwrap();
    }
    for (i, k) in keys.iter().enumerate() {
        if i % 2 == 0 {
            assert!(matches!(
                table.find_by_key(k, |r| r.value),
                Err(CollectionError::NotFound { .. })
            ));
            assert!(table.try_find_by_key(k, |r| r.value).unwrap().is_none());
        } else {
            assert_eq!(table.try_find_by_key(k, |r| r.value).unwrap(), Some(i as i32));
        }
    }
    assert_eq!(table.element_count().unwrap(), 25);
}
