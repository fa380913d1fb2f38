#![cfg(test)]

// Property tests for KeyedHashTable kept inside the crate so they can drive
// the locked table state and inspect bucket chains directly.

use crate::collection::Storage;
use crate::config::CollectionConfig;
use crate::cursor::Traverse;
use crate::error::CollectionError;
use crate::keyed_hash_table::{EntryHandle, KeyOps, KeyedHashTable, StdKeyOps};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::collections::{BTreeSet, HashMap};

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

// Pool-indexed operations shrink toward earlier keys and shorter scripts.
#[derive(Clone, Debug)]
enum OpI {
    Add(usize, i32),
    AddOrUpdate(usize, i32),
    Remove(usize),
    Extract(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    Walk,
    Resize(usize),
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Add(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::AddOrUpdate(i, v)),
            2 => idx.clone().prop_map(OpI::Remove),
            1 => idx.clone().prop_map(OpI::Extract),
            2 => idx.clone().prop_map(OpI::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(OpI::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Mutate(i, d)),
            1 => Just(OpI::Walk),
            1 => (1usize..6).prop_map(OpI::Resize),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Every key hashes to bucket 0.
struct Colliding;
impl KeyOps<str> for Colliding {
    fn hash(&self, _key: &str, _modulus: usize) -> usize {
        0
    }
    fn equal(&self, a: &str, b: &str) -> bool {
        a == b
    }
}

fn run<O: KeyOps<str>>(ops_impl: O, pool: &[String], ops: Vec<OpI>) -> Result<(), TestCaseError> {
    let table = KeyedHashTable::with_key_ops(
        CollectionConfig::named("prop"),
        3,
        |r: &Rec| r.key.as_str(),
        ops_impl,
    );
    let mut model: HashMap<String, i32> = HashMap::new();
    let mut live: HashMap<String, EntryHandle> = HashMap::new();
    let mut stale: Vec<EntryHandle> = Vec::new();

    for op in ops {
        let mut t = table.lock().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let serial_before = t.tracker().serial();
        let mut structural = false;
        match op {
            OpI::Add(i, v) => {
                let k = &pool[i];
                let already = model.contains_key(k);
                match t.add(rec(k, v).into()) {
                    Ok(h) => {
                        prop_assert!(!already, "add must fail on duplicate");
                        prop_assert!(live.insert(k.clone(), h).is_none());
                        model.insert(k.clone(), v);
                        structural = true;
                    }
                    Err(CollectionError::DuplicateKey { .. }) => {
                        prop_assert!(already, "duplicate error only when key exists");
                    }
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
            }
            OpI::AddOrUpdate(i, v) => {
                let k = &pool[i];
                let added = t.add_or_update(rec(k, v).into()).map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(added, !model.contains_key(k));
                model.insert(k.clone(), v);
                if added {
                    let h = t.find_handle(k).ok_or_else(|| TestCaseError::fail("added key not found"))?;
                    live.insert(k.clone(), h);
                }
                structural = true;
            }
            OpI::Remove(i) => {
                let k = &pool[i];
                let removed = t.try_remove_by_key(k);
                prop_assert_eq!(removed, model.remove(k).is_some());
                if let Some(h) = live.remove(k) {
                    stale.push(h);
                }
                structural = removed;
            }
            OpI::Extract(i) => {
                let k = &pool[i];
                match t.extract_by_key(k) {
                    Ok(e) => {
                        let expected = model.remove(k);
                        prop_assert_eq!(Some(e.value), expected);
                        prop_assert_eq!(&e.key, k);
                        if let Some(h) = live.remove(k) {
                            stale.push(h);
                        }
                        structural = true;
                    }
                    Err(CollectionError::NotFound { .. }) => prop_assert!(!model.contains_key(k)),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
            }
            OpI::Find(i) => {
                let k = &pool[i];
                let found = t.try_find_by_key(k).map(|r| r.value);
                prop_assert_eq!(found, model.get(k).copied());
                prop_assert_eq!(t.find_by_key(k).is_ok(), found.is_some());
                prop_assert_eq!(t.find_handle(k), live.get(k).copied());
            }
            OpI::Contains(s) => {
                prop_assert_eq!(t.contains_key(&s), model.contains_key(&s));
            }
            OpI::Mutate(i, d) => {
                if let Some(&h) = live.get(&pool[i]) {
                    let v = t.get_mut(h).ok_or_else(|| TestCaseError::fail("live handle must resolve"))?;
                    v.value = v.value.saturating_add(d);
                    if let Some(mv) = model.get_mut(&pool[i]) {
                        *mv = mv.saturating_add(d);
                    }
                }
            }
            OpI::Walk => {
                // Forward and backward positional walks agree and cover every key once.
                let mut fwd = Vec::new();
                let mut at = t.first_pos();
                while let Some(p) = at {
                    fwd.push(p);
                    at = t.next_pos(p);
                }
                let mut back = Vec::new();
                let mut at = t.last_pos();
                while let Some(p) = at {
                    back.push(p);
                    at = t.prev_pos(p);
                }
                back.reverse();
                prop_assert_eq!(&fwd, &back);
                prop_assert!(fwd.windows(2).all(|w| w[0].bucket() <= w[1].bucket()));
                let keys: BTreeSet<String> = t.iter().map(|r| r.key.clone()).collect();
                prop_assert_eq!(keys.len(), fwd.len());
                prop_assert_eq!(keys, model.keys().cloned().collect::<BTreeSet<_>>());
            }
            OpI::Resize(m) => {
                let discarded = t.resize(m);
                prop_assert_eq!(discarded, model.len());
                prop_assert_eq!(t.modulus(), m);
                model.clear();
                stale.extend(live.drain().map(|(_, h)| h));
                structural = true;
            }
        }

        // Post-conditions after each op.
        for &h in &stale {
            prop_assert!(t.get(h).is_none());
        }
        prop_assert_eq!(t.len(), model.len());
        prop_assert_eq!(t.element_count(), model.len());
        prop_assert_eq!(t.bucket_lengths().iter().sum::<usize>(), model.len());
        if structural {
            prop_assert_eq!(t.tracker().serial(), serial_before + 1);
        } else {
            prop_assert_eq!(t.tracker().serial(), serial_before);
        }
    }
    Ok(())
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - Duplicate keys are rejected; `add_or_update` adds exactly when absent.
// - `find_by_key` fails exactly when `try_find_by_key` returns None.
// - Extracted elements carry the model's value; their handles go dead.
// - Forward and backward walks visit every live element once, in bucket order.
// - Structural changes bump the serial number; lookups never do.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run(StdKeyOps::new(), &pool, ops)?;
    }

    // Same invariants with every key in one chain, stressing unlink at the
    // head, middle and tail of a bucket.
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run(Colliding, &pool, ops)?;
    }
}
