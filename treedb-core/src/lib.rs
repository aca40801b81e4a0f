//! A persistent red-black tree whose nodes live in a pluggable key-value store, written
//! in Rust.
//!
//! `TreeDB` keeps an ordered multi-map as a red-black tree, but the nodes are not held in
//! memory as pointers. Each node is an immutable record addressed by a [`NodeId`] and
//! fetched from a [`NodeStore`]. Every mutation copies the path from the root down to the
//! changed node and returns a new [`RedBlackTree`]; the old tree still sees its original
//! content, and both trees share all untouched subtrees.
//!
//! The writes of one mutation are staged in a transaction and flushed to the store as a
//! single batch, so with a durable store like [`FileStore`] a crash never leaves a half
//! written tree behind.
//!
//! # Trees
//!
//! ```
//! use treedb::{MemoryStore, RedBlackTree, Result};
//! # fn try_main() -> Result<()> {
//!
//! let store = MemoryStore::<i32, &str>::new();
//!
//! let empty = RedBlackTree::new(&store);
//! let one = empty.insert(1, "one")?;
//! let two = one.insert(2, "two")?;
//!
//! // Older versions are untouched.
//! assert!(empty.is_empty());
//! assert_eq!(one.keys()?, vec![1]);
//! assert_eq!(two.keys()?, vec![1, 2]);
//!
//! assert_eq!(two.get(&2)?, Some("two"));
//! assert_eq!(two.remove(&1)?.values()?, vec!["two"]);
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! Keys are ordered by their `Ord` implementation unless the tree is given a
//! [`Comparator`], which can be any `Fn(&K, &K) -> Ordering`:
//!
//! ```
//! use treedb::{MemoryStore, RedBlackTree, Result};
//! # fn try_main() -> Result<()> {
//!
//! let store = MemoryStore::<f64, ()>::new();
//! let mut tree = RedBlackTree::with_comparator(&store, |a: &f64, b: &f64| b.total_cmp(a));
//! for key in [0.5, 2.5, 1.5] {
//!     tree = tree.insert(key, ())?;
//! }
//! assert_eq!(tree.keys()?, vec![2.5, 1.5, 0.5]);
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! # Cursor
//!
//! Cursors walk the tree in order, find entries by rank, and can update or remove the
//! entry they point at.
//!
//! ```
//! use std::ops::ControlFlow;
//!
//! use treedb::{MemoryStore, RedBlackTree, Result};
//! # fn try_main() -> Result<()> {
//!
//! let store = MemoryStore::<u32, char>::new();
//! let mut tree = RedBlackTree::new(&store);
//! for (key, value) in [(3, 'c'), (1, 'a'), (4, 'd'), (2, 'b')] {
//!     tree = tree.insert(key, value)?;
//! }
//!
//! // Forward traversal.
//! let mut cursor = tree.begin()?;
//! while let Some((key, value)) = cursor.key_value() {
//!     println!("{key} => {value}");
//!     cursor.next()?;
//! }
//!
//! // Range queries and ranks.
//! let cursor = tree.ge(&2)?;
//! assert_eq!(cursor.key(), Some(&2));
//! assert_eq!(cursor.index()?, 1);
//! assert_eq!(tree.at(3)?.value(), Some(&'d'));
//!
//! // Bounded traversal that stops early.
//! let found = tree.for_each_range(&2, &4, |key, value| {
//!     if *key == 3 {
//!         ControlFlow::Break(*value)
//!     } else {
//!         ControlFlow::Continue(())
//!     }
//! })?;
//! assert_eq!(found, Some('c'));
//!
//! // Updating through a cursor returns a new tree.
//! let updated = tree.find(&4)?.update('D')?;
//! assert_eq!(updated.get(&4)?, Some('D'));
//! assert_eq!(tree.get(&4)?, Some('d'));
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```
//!
//! # Database
//!
//! [`TreeDb`] keeps one current tree over a store that can also record the root, and
//! offers a map-like API on top of it. Writers are serialized, readers work on snapshots.
//!
//! ```
//! use treedb::{FileStore, Options, Result, TreeDb};
//! # fn try_main() -> Result<()> {
//!
//! let path = "target/doc_database.treedb";
//!
//! // The simplest way to open with default `Options`:
//! let db: TreeDb<String, u64, FileStore<String, u64>> = TreeDb::open(path)?;
//! # drop(db);
//!
//! // Open with `Options`:
//! let db = Options::new().force_sync(true).open::<String, u64>(path)?;
//!
//! db.put("foo".to_string(), 1)?;
//! assert!(db.contains(&"foo".to_string())?);
//! assert_eq!(db.get(&"foo".to_string())?, Some(1));
//!
//! db.put("foo".to_string(), 2)?;
//! assert_eq!(db.get(&"foo".to_string())?, Some(2));
//!
//! assert!(db.delete(&"foo".to_string())?);
//! assert_eq!(db.get(&"foo".to_string())?, None);
//! # Ok(())
//! # }
//! # fn main() { try_main().unwrap(); }
//! ```

#![deny(rustdoc::private_intra_doc_links)]

mod db;
mod error;
mod node;
mod rbtree;
mod store;
mod tx;

pub use crate::{
    db::{Options, TreeDb},
    error::{Error, ErrorCode, Result},
    node::{Color, Node, NodeId},
    rbtree::{Comparator, Cursor, Natural, RedBlackTree},
    store::{BatchOp, FileStore, MemoryStore, NodeStore, RootStore},
};
