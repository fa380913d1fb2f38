use adopt_collections::{
    Collection, CollectionConfig, CollectionError, Element, LocalLock, ObjectPool, PoolConfig,
    PoolFactory, RefList,
};
use proptest::prelude::*;
use std::collections::VecDeque;

#[derive(Clone, Debug)]
enum ListOp {
    AddTop(i16),
    AddBottom(i16),
    PopTop,
    PopBottom,
    RemoveValue(i16),
    InsertAfterNth(usize, i16),
    Reverse,
    Sort,
    Bulk(Vec<i16>),
    Clear,
}

fn arb_list_ops() -> impl Strategy<Value = Vec<ListOp>> {
    let v = -8i16..8;
    let op = prop_oneof![
        3 => v.clone().prop_map(ListOp::AddTop),
        3 => v.clone().prop_map(ListOp::AddBottom),
        1 => Just(ListOp::PopTop),
        1 => Just(ListOp::PopBottom),
        2 => v.clone().prop_map(ListOp::RemoveValue),
        2 => (0usize..10, v.clone()).prop_map(|(n, x)| ListOp::InsertAfterNth(n, x)),
        1 => Just(ListOp::Reverse),
        1 => Just(ListOp::Sort),
        1 => proptest::collection::vec(v, 0..5).prop_map(ListOp::Bulk),
        1 => Just(ListOp::Clear),
    ];
    proptest::collection::vec(op, 1..80)
}

// Property: RefList mirrors a VecDeque model.
// Invariants exercised across random operation sequences:
// - Order: top/bottom insertion, cursor-anchored insertion, reverse and sort
//   produce the same sequence as the model.
// - Count: `element_count` equals adds minus removes after every op.
// - Staleness: a cursor taken before an op is stale afterwards exactly when
//   the op changed the list's structure.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_list_matches_model(ops in arb_list_ops()) {
        let list: RefList<'_, i16, LocalLock> = RefList::new_local(CollectionConfig::named("prop"));
        let mut model: VecDeque<i16> = VecDeque::new();

        for op in ops {
            let watcher = list.cursor().unwrap();
            let structural = match op {
                ListOp::AddTop(x) => {
                    list.add_at_top(Box::new(x)).unwrap();
                    model.push_front(x);
                    true
                }
                ListOp::AddBottom(x) => {
                    list.add_at_bottom(Box::new(x)).unwrap();
                    model.push_back(x);
                    true
                }
                ListOp::PopTop => {
                    let got = list.try_pop_from_top().unwrap().map(|e| *e);
                    prop_assert_eq!(got, model.pop_front());
                    got.is_some()
                }
                ListOp::PopBottom => {
                    match list.pop_from_bottom() {
                        Ok(e) => {
                            prop_assert_eq!(Some(*e), model.pop_back());
                            true
                        }
                        Err(CollectionError::EmptyCollection { .. }) => {
                            prop_assert!(model.is_empty());
                            false
                        }
                        Err(e) => return Err(TestCaseError::fail(e.to_string())),
                    }
                }
                ListOp::RemoveValue(x) => match list.find(&x).unwrap() {
                    Some(h) => {
                        list.remove(h).unwrap();
                        let at = model.iter().position(|v| *v == x);
                        prop_assert!(at.is_some());
                        if let Some(at) = at {
                            model.remove(at);
                        }
                        true
                    }
                    None => {
                        prop_assert!(!model.contains(&x));
                        false
                    }
                },
                ListOp::InsertAfterNth(n, x) => {
                    let mut c = list.cursor().unwrap();
                    let mut steps = 0;
                    while steps < n && c.next().unwrap() {
                        steps += 1;
                    }
                    list.insert_after(Box::new(x), &c).unwrap();
                    // An exhausted cursor anchors at the tail.
                    let at = if n < model.len() { n + 1 } else { model.len() };
                    model.insert(at, x);
                    true
                }
                ListOp::Reverse => {
                    list.reverse().unwrap();
                    model.make_contiguous().reverse();
                    true
                }
                ListOp::Sort => {
                    list.sort_by(|a, b| a.cmp(b)).unwrap();
                    model.make_contiguous().sort();
                    true
                }
                ListOp::Bulk(xs) => {
                    let n = list.bulk_load(xs.iter().map(|&x| Element::owned(x))).unwrap();
                    prop_assert_eq!(n, xs.len());
                    model.extend(xs);
                    true
                }
                ListOp::Clear => {
                    list.clear().unwrap();
                    model.clear();
                    true
                }
            };

            prop_assert_eq!(list.to_vec().unwrap(), model.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(list.element_count().unwrap(), model.len());
            prop_assert_eq!(watcher.is_stale().unwrap(), structural);
        }
    }
}

#[derive(Default)]
struct Units;
impl PoolFactory<usize> for Units {
    type Size = usize;
    fn element_size(&self, e: &usize) -> usize {
        *e
    }
    fn create_new(&self, size_hint: usize) -> Option<usize> {
        Some(size_hint)
    }
    fn prepare(&self, e: &mut usize, size_hint: usize) {
        *e = (*e).max(size_hint);
    }
}

#[derive(Clone, Debug)]
enum PoolOp {
    Reserve(usize),
    Release(usize),
    ReleaseAll,
}

fn arb_pool_case() -> impl Strategy<Value = (usize, bool, Vec<PoolOp>)> {
    let op = prop_oneof![
        3 => (1usize..64).prop_map(PoolOp::Reserve),
        2 => any::<usize>().prop_map(PoolOp::Release),
        1 => Just(PoolOp::ReleaseAll),
    ];
    (1usize..6, any::<bool>(), proptest::collection::vec(op, 1..60))
}

// Property: the pool never holds more than `max_size` elements.
// Invariants exercised:
// - `used + free <= max` after every reserve/release.
// - Reserving with `max` checkouts outstanding fails with PoolExhausted.
// - A granted element is at least as large as requested.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_pool_bound((max, grow, ops) in arb_pool_case()) {
        let pool: ObjectPool<usize, Units, LocalLock> =
            ObjectPool::new_local(PoolConfig::named("prop", max).grow_on_miss(grow), Units);
        let mut out = Vec::new();

        for op in ops {
            match op {
                PoolOp::Reserve(size) => match pool.reserve(size) {
                    Ok(co) => {
                        prop_assert!(*co >= size);
                        out.push(co);
                    }
                    Err(CollectionError::PoolExhausted { .. }) => {
                        prop_assert_eq!(out.len(), max);
                    }
                    Err(CollectionError::NoCandidateElement { .. }) => {
                        prop_assert!(!grow);
                        prop_assert_eq!(pool.allocated_count().unwrap(), max);
                    }
                    Err(e) => return Err(TestCaseError::fail(e.to_string())),
                },
                PoolOp::Release(i) => {
                    if !out.is_empty() {
                        let co = out.swap_remove(i % out.len());
                        pool.release(co).unwrap();
                    }
                }
                PoolOp::ReleaseAll => {
                    let n = out.len();
                    prop_assert_eq!(pool.release_all(out.drain(..)).unwrap(), n);
                }
            }
            let used = pool.used_count().unwrap();
            prop_assert_eq!(used, out.len());
            prop_assert!(used + pool.free_count().unwrap() <= max);
        }
    }
}
