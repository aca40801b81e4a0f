use std::{cell::Cell, cmp::Ordering, error::Error as _, io, ops::ControlFlow};

use serde_json::{json, Value};
use treedb::{
    BatchOp, Comparator, Cursor, Error, ErrorCode, MemoryStore, Natural, Node, NodeId, NodeStore,
    RedBlackTree, Result,
};

// Here are the tree level APIs tests, run against the in-memory store.
// Some `mod`s also have their own tests inside.

type IntCursor<'a> = Cursor<i32, i32, &'a MemoryStore<i32, i32>, Natural>;

#[test]
fn test_insert() -> Result<()> {
    let store = MemoryStore::<i32, bool>::new();
    let mut u = RedBlackTree::new(&store);
    let mut arr = Vec::new();

    for x in (0..=20).rev() {
        let next = u.insert(x, true)?;
        check_tree(&u)?;
        check_tree(&next)?;
        assert_eq!(u.len()?, arr.len());
        arr.push(x);
        u = next;
    }
    for x in -20..0 {
        let next = u.insert(x, true)?;
        check_tree(&u)?;
        check_tree(&next)?;
        arr.sort();
        assert_eq!(u.keys()?, arr);
        arr.push(x);
        u = next;
    }

    let mut start = u.begin()?;
    for (j, i) in (-20..=20).enumerate() {
        assert_eq!(u.at(j)?.key(), Some(&i), "checking at()");
        assert_eq!(start.key(), Some(&i), "checking iter");
        assert_eq!(start.index()?, j, "checking index");
        assert!(start.is_valid());
        assert_eq!(start.has_next(), j < 40);
        start.next()?;
    }
    assert!(!start.is_valid());
    assert!(!start.has_next());
    assert_eq!(start.index()?, 41);
    Ok(())
}

#[test]
fn test_for_each() -> Result<()> {
    let store = MemoryStore::new();
    let u = build(&store, 0..31)?;
    let entries = u.entries()?;

    // Full traversal.
    let mut visited = Vec::new();
    let found = u.for_each(|k, v| {
        visited.push((*k, *v));
        ControlFlow::<()>::Continue(())
    })?;
    assert_eq!(found, None);
    assert_eq!(visited, entries);
    assert_eq!(u.keys()?, entries.iter().map(|e| e.0).collect::<Vec<_>>());
    assert_eq!(u.values()?, entries.iter().map(|e| e.1).collect::<Vec<_>>());

    // Full traversal with termination.
    let mut visited = Vec::new();
    let found = u.for_each(|k, v| {
        if *k == 5 {
            return ControlFlow::Break(1000);
        }
        visited.push((*k, *v));
        ControlFlow::Continue(())
    })?;
    assert_eq!(found, Some(1000));
    assert_eq!(visited, &entries[..5]);

    // Half interval.
    let mut visited = Vec::new();
    u.for_each_from(&3, |k, v| {
        visited.push((*k, *v));
        ControlFlow::<()>::Continue(())
    })?;
    assert_eq!(visited, &entries[3..]);

    // Half interval with termination.
    let mut visited = Vec::new();
    let found = u.for_each_from(&3, |k, v| {
        if *k == 12 {
            return ControlFlow::Break(1000);
        }
        visited.push((*k, *v));
        ControlFlow::Continue(())
    })?;
    assert_eq!(found, Some(1000));
    assert_eq!(visited, &entries[3..12]);

    // Interval.
    let mut visited = Vec::new();
    u.for_each_range(&3, &15, |k, v| {
        visited.push((*k, *v));
        ControlFlow::<()>::Continue(())
    })?;
    assert_eq!(visited, &entries[3..15]);

    // Interval with termination.
    let mut visited = Vec::new();
    let found = u.for_each_range(&3, &15, |k, v| {
        if *k == 12 {
            return ControlFlow::Break(1000);
        }
        visited.push((*k, *v));
        ControlFlow::Continue(())
    })?;
    assert_eq!(found, Some(1000));
    assert_eq!(visited, &entries[3..12]);

    // Empty and inverted intervals.
    for (lo, hi) in [(7, 7), (15, 3)] {
        let mut visited = 0;
        u.for_each_range(&lo, &hi, |_, _| {
            visited += 1;
            ControlFlow::<()>::Continue(())
        })?;
        assert_eq!(visited, 0);
    }
    Ok(())
}

#[test]
fn test_iterators() -> Result<()> {
    let store = MemoryStore::new();
    let u = build(&store, 0..20)?;

    // Walk forward.
    let mut iter = u.begin()?;
    let start = iter.clone();
    assert!(iter.has_next(), "must have next at beginning");
    assert!(!iter.has_prev(), "must not have predecessor");
    for i in 0..20 {
        assert_same_position(&iter, &u.at(i)?)?;
        assert_eq!(iter.index()?, i);
        iter.next()?;
    }
    assert!(!iter.is_valid(), "must be eof iterator");

    // The clone did not move.
    assert_same_position(&start, &u.begin()?)?;

    // Walk backward.
    let mut iter = u.end()?;
    assert!(!iter.has_next(), "must not have next");
    assert!(iter.has_prev(), "must have predecessor");
    let mut keys = Vec::new();
    for i in (0..20).rev() {
        assert_same_position(&iter, &u.at(i)?)?;
        assert_eq!(iter.index()?, i);
        keys.push(*iter.key().unwrap());
        iter.prev()?;
    }
    assert!(!iter.is_valid(), "must be eof iterator");
    assert_eq!(keys, (0..20).rev().collect::<Vec<_>>());

    // Moving an invalid cursor is a no-op.
    iter.next()?;
    iter.prev()?;
    assert!(!iter.is_valid());
    assert_eq!(iter.index()?, 20);
    Ok(())
}

#[test]
fn test_remove() -> Result<()> {
    for size in [1, 2, 10, 20, 23, 31, 32, 33] {
        let store = MemoryStore::new();
        let u = build(&store, 0..size)?;
        for i in 0..size {
            let removed = u.remove(&i)?;
            check_tree(&removed)?;
            assert_eq!(removed.len()?, size as usize - 1);
            assert_eq!(removed.get(&i)?, None);
            assert_eq!(u.get(&i)?, Some(i));
        }

        // Removing a missing key changes nothing.
        assert_eq!(u.remove(&size)?.root_id(), u.root_id());
    }
    Ok(())
}

#[test]
fn test_remove_all() -> Result<()> {
    let store = MemoryStore::new();
    let mut u = build(&store, 0..64)?;
    for i in (0..64).map(|i| (i * 37) % 64) {
        u = u.remove(&i)?;
        check_tree(&u)?;
    }
    assert!(u.is_empty());
    assert_eq!(u.len()?, 0);
    assert!(!u.begin()?.is_valid());
    Ok(())
}

#[test]
fn test_remove_by_position() -> Result<()> {
    let store = MemoryStore::new();
    let mut u = RedBlackTree::new(&store);
    let keys = [5, 1, 5, 3, 5, 1, 8, 0, 3, 9, 5, 2, 7, 1, 5, 6, 4, 5];
    for (i, key) in keys.into_iter().enumerate() {
        u = u.insert(key, i as i32)?;
    }
    let entries = u.entries()?;
    let len = entries.len();

    for i in 0..len {
        let mut expected = entries.clone();
        expected.remove(i);

        // By rank.
        let removed = u.at(i)?.remove()?;
        check_tree(&removed)?;
        assert_eq!(removed.entries()?, expected, "remove at {i}");

        // Walking forward.
        let mut cursor = u.begin()?;
        for _ in 0..i {
            cursor.next()?;
        }
        let removed = cursor.remove()?;
        check_tree(&removed)?;
        assert_eq!(removed.entries()?, expected, "remove after {i} steps forward");

        // Walking backward.
        let mut cursor = u.end()?;
        for _ in i + 1..len {
            cursor.prev()?;
        }
        assert_eq!(cursor.index()?, i);
        let removed = cursor.remove()?;
        check_tree(&removed)?;
        assert_eq!(removed.entries()?, expected, "remove after {i} steps backward");

        // Updating keeps every other entry in place.
        let mut expected = entries.clone();
        expected[i].1 = -1;
        let updated = u.at(i)?.update(-1)?;
        check_tree(&updated)?;
        assert_eq!(updated.entries()?, expected, "update at {i}");
    }

    // A bound cursor removes the first entry of a run of equal keys.
    let first = u.ge(&5)?.index()?;
    let mut expected = entries.clone();
    expected.remove(first);
    assert_eq!(u.ge(&5)?.remove()?.entries()?, expected);

    assert_eq!(u.entries()?, entries);
    Ok(())
}

#[test]
fn test_store_failure() -> Result<()> {
    let store = FlakyStore::new(10);
    let mut u = RedBlackTree::new(&store);
    for key in 0..10 {
        u = u.insert(key, key)?;
    }
    let records = store.inner.len();

    let failures = [
        u.insert(100, 1).unwrap_err(),
        u.remove(&3).unwrap_err(),
        u.find(&5)?.update(0).unwrap_err(),
        u.at(0)?.remove().unwrap_err(),
    ];
    for err in failures {
        assert_eq!(err.code(), ErrorCode::IO);
        let source = err.source().and_then(|e| e.downcast_ref::<io::Error>());
        assert_eq!(source.map(|e| e.to_string()), Some("disk is full".to_string()));
    }

    // Nothing was written, the tree is intact.
    assert_eq!(store.inner.len(), records);
    check_tree(&u)?;
    assert_eq!(u.keys()?, (0..10).collect::<Vec<_>>());
    Ok(())
}

#[test]
fn test_update() -> Result<()> {
    let store = MemoryStore::new();
    let u = build(&store, 0..7)?;

    let mut iter = u.begin()?;
    while iter.has_next() {
        let key = *iter.key().unwrap();
        let updated = iter.update(1000)?;
        assert_eq!(iter.value(), iter.key(), "ensure no mutation");
        assert_eq!(updated.find(&key)?.value(), Some(&1000), "ensure update applied");
        assert_eq!(u.get(&key)?, Some(key));
        check_tree(&updated)?;
        check_tree(&u)?;
        iter.next()?;
    }
    Ok(())
}

#[test]
fn test_invalid_cursor() -> Result<()> {
    let store = MemoryStore::new();
    let u = build(&store, 0..3)?;

    let missing = u.find(&100)?;
    assert!(!missing.is_valid());
    assert_eq!(missing.key(), None);
    assert_eq!(
        missing.update(1).unwrap_err().code(),
        ErrorCode::InvalidOperation
    );
    assert_eq!(
        missing.remove().unwrap_err().code(),
        ErrorCode::InvalidOperation
    );
    Ok(())
}

#[test]
fn test_keys_and_values() -> Result<()> {
    let store = MemoryStore::<String, Value>::new();
    let original = [
        ("potato", json!(42)),
        ("sock", json!(10)),
        ("foot", json!(false)),
        ("apple", json!("!!!")),
        ("newspaper", json!({})),
        ("gameboy", json!(null)),
    ];

    let mut u = RedBlackTree::new(&store);
    for (key, value) in &original {
        u = u.insert(key.to_string(), value.clone())?;
    }

    let mut sorted = original.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    assert_eq!(
        u.keys()?,
        sorted.iter().map(|e| e.0.to_string()).collect::<Vec<_>>()
    );
    assert_eq!(
        u.values()?,
        sorted.into_iter().map(|e| e.1).collect::<Vec<_>>()
    );
    Ok(())
}

#[test]
fn test_searching() -> Result<()> {
    let arr = [0.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 6.0];
    let store = MemoryStore::<f64, usize>::new();
    let mut u = RedBlackTree::with_comparator(&store, total_order);
    for (i, key) in arr.iter().enumerate() {
        u = u.insert(*key, i)?;
    }
    check_tree(&u)?;

    for (i, key) in arr.iter().enumerate() {
        let unique = (i == 0 || arr[i - 1] != *key) && arr.get(i + 1) != Some(key);
        if unique {
            assert_eq!(u.get(key)?, Some(i), "get {key}");
        }
    }
    assert_eq!(u.get(&-1.0)?, None, "get missing");

    assert_eq!(u.ge(&3.0)?.index()?, 6, "ge simple");
    assert_eq!(u.ge(&0.9)?.index()?, 1, "ge run start");
    assert_eq!(u.ge(&1.0)?.index()?, 1, "ge run mid");
    assert_eq!(u.ge(&1.1)?.index()?, 5, "ge run end");
    assert_eq!(u.ge(&0.0)?.index()?, 0, "ge first");
    assert_eq!(u.ge(&6.0)?.index()?, 9, "ge last");
    assert!(!u.ge(&100.0)?.is_valid(), "ge big");
    assert_eq!(u.ge(&-1.0)?.index()?, 0, "ge small");

    assert_eq!(u.gt(&3.0)?.index()?, 7, "gt simple");
    assert_eq!(u.gt(&0.9)?.index()?, 1, "gt run start");
    assert_eq!(u.gt(&1.0)?.index()?, 5, "gt run mid");
    assert_eq!(u.gt(&1.1)?.index()?, 5, "gt run end");
    assert_eq!(u.gt(&0.0)?.index()?, 1, "gt first");
    assert!(!u.gt(&6.0)?.is_valid(), "gt last");
    assert!(!u.gt(&100.0)?.is_valid(), "gt big");
    assert_eq!(u.gt(&-1.0)?.index()?, 0, "gt small");

    assert_eq!(u.le(&3.0)?.index()?, 6, "le simple");
    assert_eq!(u.le(&0.9)?.index()?, 0, "le run start");
    assert_eq!(u.le(&1.0)?.index()?, 4, "le run mid");
    assert_eq!(u.le(&1.1)?.index()?, 4, "le run end");
    assert_eq!(u.le(&0.0)?.index()?, 0, "le first");
    assert_eq!(u.le(&6.0)?.index()?, 10, "le last");
    assert_eq!(u.le(&100.0)?.index()?, 10, "le big");
    assert!(!u.le(&-1.0)?.is_valid(), "le small");

    assert_eq!(u.lt(&3.0)?.index()?, 5, "lt simple");
    assert_eq!(u.lt(&0.9)?.index()?, 0, "lt run start");
    assert_eq!(u.lt(&1.0)?.index()?, 0, "lt run mid");
    assert_eq!(u.lt(&1.1)?.index()?, 4, "lt run end");
    assert!(!u.lt(&0.0)?.is_valid(), "lt first");
    assert_eq!(u.lt(&6.0)?.index()?, 8, "lt last");
    assert_eq!(u.lt(&100.0)?.index()?, 10, "lt big");
    assert!(!u.lt(&-1.0)?.is_valid(), "lt small");

    assert!(!u.find(&-1.0)?.is_valid(), "find missing small");
    assert!(!u.find(&10000.0)?.is_valid(), "find missing big");
    assert_eq!(u.find(&3.0)?.index()?, 6, "find simple");
    let repeat = u.find(&1.0)?.index()?;
    assert!(repeat > 0 && repeat < 5, "find repeat");

    for (i, key) in arr.iter().enumerate() {
        assert_eq!(u.find(key)?.key(), Some(key), "find {i}");
        assert_eq!(u.at(i)?.key(), Some(key), "at {i}");
    }
    assert!(!u.at(1000)?.is_valid(), "at missing big");
    Ok(())
}

#[test]
fn test_slab_sequence() -> Result<()> {
    let store = MemoryStore::<f64, i32>::new();
    let mut tree = RedBlackTree::with_comparator(&store, total_order);

    let steps: [(Step, &[i32]); 10] = [
        (Step::Insert(0.0, 0), &[0]),
        (Step::Insert(1.0, 1), &[0, 1]),
        (Step::Insert(0.5, 2), &[0, 2, 1]),
        (Step::Insert(0.25, 3), &[0, 3, 2, 1]),
        (Step::Remove(0.0), &[3, 2, 1]),
        (Step::Insert(0.375, 4), &[3, 4, 2, 1]),
        (Step::Remove(1.0), &[3, 4, 2]),
        (Step::Remove(0.5), &[3, 4]),
        (Step::Remove(0.375), &[3]),
        (Step::Remove(0.25), &[]),
    ];
    for (step, values) in steps {
        tree = match step {
            Step::Insert(key, value) => tree.insert(key, value)?,
            Step::Remove(key) => tree.remove(&key)?,
        };
        check_tree(&tree)?;
        assert_eq!(tree.values()?, values);
    }
    assert!(tree.is_empty());
    Ok(())
}

#[test]
fn test_slab_sequence_2() -> Result<()> {
    let inserts = [
        (12, 22),
        (11, 3),
        (10, 28),
        (13, 16),
        (9, 9),
        (14, 10),
        (8, 15),
        (15, 29),
        (16, 4),
        (7, 21),
        (17, 23),
        (6, 2),
        (5, 27),
        (18, 17),
        (4, 8),
        (31, 11),
        (30, 30),
        (29, 5),
        (28, 24),
        (27, 18),
        (26, 12),
        (25, 31),
        (24, 6),
        (23, 25),
        (19, 7),
        (20, 13),
        (1, 20),
        (0, 14),
        (22, 0),
        (2, 1),
        (3, 26),
        (21, 19),
    ];
    let removals = [
        18, 17, 16, 15, 14, 13, 12, 6, 7, 8, 11, 4, 9, 10, 5, 31, 0, 30, 29, 1, 28, 2, 3, 27, 19,
        26, 20, 25, 24, 21, 23, 22,
    ];

    let store = MemoryStore::new();
    let mut u = RedBlackTree::new(&store);
    for (key, value) in inserts {
        u = u.insert(key, value)?;
        check_tree(&u)?;
    }
    assert_eq!(u.keys()?, (0..32).collect::<Vec<_>>());

    for (removed, key) in removals.into_iter().enumerate() {
        let value = inserts.iter().find(|e| e.0 == key).unwrap().1;
        assert_eq!(u.get(&key)?, Some(value));
        u = u.remove(&key)?;
        check_tree(&u)?;
        assert_eq!(u.len()?, 31 - removed);
        assert_eq!(u.get(&key)?, None);
    }
    assert!(u.is_empty());
    Ok(())
}

#[test]
fn test_persistence() -> Result<()> {
    let store = MemoryStore::new();
    let t1 = build(&store, 0..10)?;
    let t2 = t1.insert(100, 100)?;
    let t3 = t2.remove(&5)?;

    assert_eq!(t1.keys()?, (0..10).collect::<Vec<_>>());
    assert_eq!(t1.get(&100)?, None);
    assert_eq!(t2.get(&100)?, Some(100));
    assert_eq!(t2.get(&5)?, Some(5));
    assert_eq!(t3.get(&5)?, None);
    assert_eq!(t3.len()?, 10);

    // A tree is nothing but a root id over the store.
    let reopened = RedBlackTree::<i32, i32, _>::new(&store).with_root(t2.root_id());
    assert_eq!(reopened.entries()?, t2.entries()?);

    // Unchanged subtrees are shared, not copied.
    let big = build(&store, 0..1000)?;
    let before = store.len();
    let bigger = big.insert(1000, 1000)?;
    assert!(store.len() - before < 50);
    assert_eq!(bigger.len()?, 1001);
    Ok(())
}

#[test]
fn test_duplicate_keys() -> Result<()> {
    let store = MemoryStore::new();
    let mut u = RedBlackTree::new(&store);
    for value in 0..5 {
        u = u.insert(7, value)?;
        u = u.insert(value, -1)?;
        check_tree(&u)?;
    }
    assert_eq!(u.len()?, 10);
    assert_eq!(u.keys()?, vec![0, 1, 2, 3, 4, 7, 7, 7, 7, 7]);

    let mut sevens = u.values()?[5..].to_vec();
    sevens.sort();
    assert_eq!(sevens, vec![0, 1, 2, 3, 4]);

    let first = u.ge(&7)?.index()?;
    let last = u.le(&7)?.index()?;
    assert_eq!((first, last), (5, 9));

    for left in (0..5).rev() {
        u = u.remove(&7)?;
        check_tree(&u)?;
        assert_eq!(u.keys()?.iter().filter(|k| **k == 7).count(), left);
    }
    Ok(())
}

/// A store that accepts a fixed number of batches, then refuses to write.
struct FlakyStore {
    inner: MemoryStore<i32, i32>,
    batches_left: Cell<usize>,
}

impl FlakyStore {
    fn new(batches: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            batches_left: Cell::new(batches),
        }
    }
}

impl NodeStore<i32, i32> for FlakyStore {
    fn get(&self, id: NodeId) -> Result<Option<Node<i32, i32>>> {
        self.inner.get(id)
    }

    fn batch(&self, ops: Vec<BatchOp<i32, i32>>) -> Result<()> {
        match self.batches_left.get() {
            0 => Err(Error::store(io::Error::new(
                io::ErrorKind::Other,
                "disk is full",
            ))),
            left => {
                self.batches_left.set(left - 1);
                self.inner.batch(ops)
            }
        }
    }
}

enum Step {
    Insert(f64, i32),
    Remove(f64),
}

fn total_order(a: &f64, b: &f64) -> Ordering {
    a.total_cmp(b)
}

fn build(
    store: &MemoryStore<i32, i32>,
    keys: std::ops::Range<i32>,
) -> Result<RedBlackTree<i32, i32, &MemoryStore<i32, i32>>> {
    let mut tree = RedBlackTree::new(store);
    for key in keys {
        tree = tree.insert(key, key)?;
    }
    Ok(tree)
}

/// Checks the red-black rules, and that the length agrees with a full traversal.
fn check_tree<K, V, S, C>(tree: &RedBlackTree<K, V, S, C>) -> Result<()>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    tree.validate()?;
    assert_eq!(tree.len()?, tree.keys()?.len());
    if let Some(root) = tree.root()? {
        assert_eq!(root.count(), tree.len()?);
    }
    Ok(())
}

fn assert_same_position(a: &IntCursor, b: &IntCursor) -> Result<()> {
    assert_eq!(a.is_valid(), b.is_valid(), "iter validity");
    if !b.is_valid() {
        return Ok(());
    }
    assert_eq!(a.node().map(Node::id), b.node().map(Node::id), "iter node");
    assert_eq!(a.key(), b.key(), "iter key");
    assert_eq!(a.value(), b.value(), "iter value");
    assert_eq!(a.index()?, b.index()?, "iter index");
    Ok(())
}
