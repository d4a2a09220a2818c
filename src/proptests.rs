use super::*;

use proptest::prelude::*;
use proptest_derive::Arbitrary;
use std::collections::BTreeMap;

pub(crate) fn init_test_logging() {
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}

fn check_subtree(t: &RbTree, x: Link, reached: &mut usize) -> usize {
    if x.is_nil() {
        return 0;
    }
    let node = &t.arena[x];
    assert!(node.live, "reachable slot {} is released", x.0);
    *reached += 1;

    let mut heights = [0usize; 2];
    for side in [Side::Left, Side::Right] {
        let child = node.children[side as usize];
        if !child.is_nil() {
            assert_eq!(t.parent(child), x, "parent link of slot {} is broken", child.0);
            if node.color == Color::Red {
                assert_eq!(t.color(child), Color::Black, "red slot {} has a red child", x.0);
            }
        }
        heights[side as usize] = check_subtree(t, child, reached);
    }
    assert_eq!(
        heights[0], heights[1],
        "black height differs below slot {}",
        x.0
    );
    heights[0] + usize::from(node.color == Color::Black)
}

/// Checks the red-black invariants and arena bookkeeping; returns the black height.
pub(crate) fn validate_tree(t: &RbTree) -> usize {
    let nil = &t.arena[Link::NIL];
    assert_eq!(nil.color, Color::Black, "sentinel must be black");
    assert!(nil.children.iter().all(|c| c.is_nil()), "sentinel must be childless");
    assert!(!nil.live, "sentinel must not be a live node");

    if t.root.is_nil() {
        assert_eq!(t.len(), 0, "empty tree must report len 0");
    } else {
        assert_eq!(t.color(t.root), Color::Black, "root must be black");
        assert!(t.parent(t.root).is_nil(), "root must have no parent");
    }

    let mut reached = 0usize;
    let black_height = check_subtree(t, t.root, &mut reached);
    assert_eq!(reached, t.len(), "reachable node count must match len");

    let live = t.arena.nodes.iter().filter(|n| n.live).count();
    assert_eq!(live, t.len(), "live slots must match len");
    assert_eq!(
        t.arena.free.len() + t.arena.retired + live + 1,
        t.arena.nodes.len(),
        "every slot is live, free, retired, or the sentinel"
    );

    let keys: Vec<Key> = t.iter().collect();
    assert_eq!(keys.len(), t.len());
    assert!(
        keys.windows(2).all(|w| w[0] <= w[1]),
        "in-order walk must be non-decreasing"
    );

    black_height
}

fn model_keys(m: &BTreeMap<Key, usize>) -> impl Iterator<Item = Key> + '_ {
    m.iter().flat_map(|(&k, &n)| std::iter::repeat(k).take(n))
}

#[allow(non_local_definitions)]
#[derive(Clone, Debug, Arbitrary)]
enum Op {
    #[proptest(weight = 60)]
    Insert(#[proptest(strategy = "-40i32..40")] Key),
    #[proptest(weight = 40)]
    Erase(prop::sample::Index),
    #[proptest(weight = 5)]
    EraseDead(prop::sample::Index),
    #[proptest(weight = 20)]
    Find(#[proptest(strategy = "-40i32..40")] Key),
    #[proptest(weight = 10)]
    Export(#[proptest(strategy = "0usize..64")] usize),
    #[proptest(weight = 1)]
    Clear,
}

fn keys_and_erase_order() -> impl Strategy<Value = (Vec<Key>, Vec<usize>)> {
    prop::collection::vec(-100i32..100, 0..200).prop_flat_map(|keys| {
        let order: Vec<usize> = (0..keys.len()).collect();
        (Just(keys), Just(order).prop_shuffle())
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 20_000,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_matches_multiset_model(ops in prop::collection::vec(any::<Op>(), 0..=400)) {
        let mut t = RbTree::new();
        let mut m: BTreeMap<Key, usize> = BTreeMap::new();
        let mut live: Vec<(NodeRef, Key)> = Vec::new();
        let mut dead: Vec<(NodeRef, EraseError)> = Vec::new();

        for op in ops {
            match op {
                Op::Insert(key) => {
                    let h = t.insert(key);
                    prop_assert_eq!(t.key(h), Some(key));
                    live.push((h, key));
                    *m.entry(key).or_default() += 1;
                }
                Op::Erase(idx) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (h, key) = live.swap_remove(idx.index(live.len()));
                    prop_assert_eq!(t.erase(h), Ok(key));
                    let count = m.get_mut(&key).unwrap();
                    *count -= 1;
                    if *count == 0 {
                        m.remove(&key);
                    }
                    dead.push((h, EraseError::StaleHandle));
                }
                Op::EraseDead(idx) => {
                    if dead.is_empty() {
                        continue;
                    }
                    let (h, err) = dead[idx.index(dead.len())];
                    prop_assert_eq!(t.erase(h), Err(err));
                }
                Op::Find(key) => {
                    let found = t.find(key).and_then(|h| t.key(h));
                    prop_assert_eq!(found, m.contains_key(&key).then_some(key));
                }
                Op::Export(capacity) => {
                    let expected: Vec<Key> = model_keys(&m).take(capacity).collect();
                    prop_assert_eq!(t.to_sorted_vec(capacity), expected.clone());
                    let mut buf = vec![0; capacity];
                    let written = t.write_sorted(&mut buf);
                    prop_assert_eq!(&buf[..written], &expected[..]);
                }
                Op::Clear => {
                    t.clear();
                    m.clear();
                    for entry in dead.iter_mut() {
                        entry.1 = EraseError::ForeignHandle;
                    }
                    dead.extend(live.drain(..).map(|(h, _)| (h, EraseError::ForeignHandle)));
                }
            }

            prop_assert_eq!(t.len(), live.len());
            prop_assert_eq!(t.min().and_then(|h| t.key(h)), m.keys().next().copied());
            prop_assert_eq!(t.max().and_then(|h| t.key(h)), m.keys().next_back().copied());
            validate_tree(&t);
        }

        let expected: Vec<Key> = model_keys(&m).collect();
        prop_assert_eq!(t.iter().collect::<Vec<_>>(), expected);
    }

    #[test]
    fn prop_erase_all_in_any_order((keys, order) in keys_and_erase_order()) {
        let mut t = RbTree::new();
        let handles: Vec<NodeRef> = keys.iter().map(|&k| t.insert(k)).collect();
        validate_tree(&t);

        for (erased, &i) in order.iter().enumerate() {
            prop_assert_eq!(t.erase(handles[i]), Ok(keys[i]));
            prop_assert_eq!(t.len(), keys.len() - erased - 1);
            validate_tree(&t);
        }

        prop_assert!(t.is_empty());
        prop_assert!(t.root.is_nil());
        prop_assert_eq!(t.min(), None);
        prop_assert_eq!(t.max(), None);
    }

    #[test]
    fn prop_truncated_export(keys in prop::collection::vec(any::<Key>(), 1..300), cut in any::<prop::sample::Index>()) {
        let t: RbTree = keys.iter().copied().collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();

        let capacity = cut.index(keys.len());
        let mut buf = vec![0; capacity];
        prop_assert_eq!(t.write_sorted(&mut buf), capacity);
        prop_assert_eq!(&buf[..], &sorted[..capacity]);
    }
}

fn for_each_permutation(items: &[Key], mut f: impl FnMut(&[Key])) {
    fn permute(items: &mut Vec<Key>, k: usize, f: &mut impl FnMut(&[Key])) {
        if k == items.len() {
            f(items);
            return;
        }
        for i in k..items.len() {
            items.swap(k, i);
            permute(items, k + 1, f);
            items.swap(k, i);
        }
    }

    let mut items = items.to_vec();
    permute(&mut items, 0, &mut f);
}

#[test]
fn exhaustive_insert_order_with_duplicates() {
    let keys = [4, 1, 3, 1, 5, 2];
    let mut sorted = keys.to_vec();
    sorted.sort_unstable();

    for_each_permutation(&keys, |perm| {
        let mut t = RbTree::new();
        for &k in perm {
            t.insert(k);
            validate_tree(&t);
        }
        assert_eq!(t.to_sorted_vec(keys.len()), sorted);
    });
}

#[test]
fn exhaustive_erase_order_small_set() {
    let keys = [1, 2, 3, 4, 5, 6, 7];
    let base: RbTree = keys.iter().copied().collect();
    validate_tree(&base);

    for_each_permutation(&keys, |perm| {
        let mut t = base.clone();
        for &k in perm {
            let h = t.find(k).expect("key still present");
            assert_eq!(t.erase(h), Ok(k));
            validate_tree(&t);
        }
        assert!(t.is_empty());
        assert!(t.root.is_nil());
    });
}
