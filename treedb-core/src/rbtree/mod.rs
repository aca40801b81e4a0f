pub use cursor::Cursor;

mod cursor;
mod debug;
mod insert;
mod remove;
mod search;

use std::{cmp::Ordering, marker::PhantomData};

use thiserror::Error;

use crate::{
    node::{Node, NodeId},
    store::NodeStore,
    tx::Transaction,
    Result,
};

/// Determines the order of keys in a tree.
///
/// The comparator is never persisted, it travels with the tree value. It must be a
/// consistent total preorder for every tree derived from the same lineage.
pub trait Comparator<K: ?Sized> {
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

impl<K, F> Comparator<K> for F
where
    K: ?Sized,
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        self(a, b)
    }
}

/// Orders keys by their [`Ord`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Natural;

impl<K: Ord + ?Sized> Comparator<K> for Natural {
    #[inline]
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// A persistent red-black tree whose nodes live in a [`NodeStore`].
///
/// A tree is just a comparator plus the id of a root record, so it is cheap to clone and
/// never changes. Mutations return a new tree sharing every untouched subtree with the old
/// one, which stays queryable with its original content.
///
/// Lookups start at [`get`](Self::get), [`find`](Self::find) and [`at`](Self::at), and
/// mutations at [`insert`](Self::insert) and [`remove`](Self::remove). A [`Cursor`] can
/// also [`update`](Cursor::update) or [`remove`](Cursor::remove) the entry it points at.
/// [`validate`](Self::validate) checks the red-black rules.
pub struct RedBlackTree<K, V, S, C = Natural> {
    compare: C,
    root_id: Option<NodeId>,
    store: S,
    _marker: PhantomData<fn() -> (K, V)>,
}

/// Misuse of the tree API.
#[derive(Error, Debug)]
pub(crate) enum InvalidOperation {
    #[error("the cursor does not point at a node")]
    InvalidCursor,
}

/// The tree structure read from the store is broken.
#[derive(Error, Debug)]
pub(crate) enum InvariantViolation {
    #[error("node {0} is referenced but missing from the store")]
    MissingNode(NodeId),
    #[error("node {0} has no sibling while repairing a double black")]
    MissingSibling(NodeId),
    #[error("node {0} is not staged in the transaction")]
    NotStaged(NodeId),
    #[error("node {child} is not a child of node {parent}")]
    Unlinked { parent: NodeId, child: NodeId },
    #[error("node {0} is the root but is red")]
    RedRoot(NodeId),
    #[error("red node {0} has a red child")]
    RedRed(NodeId),
    #[error("paths below node {0} have different black heights")]
    BlackHeight(NodeId),
    #[error("node {id} has count {found}, but its subtree holds {expected} nodes")]
    Count {
        id: NodeId,
        found: usize,
        expected: usize,
    },
    #[error("keys around node {0} are out of order")]
    Order(NodeId),
}

impl<K, V, S> RedBlackTree<K, V, S, Natural> {
    /// An empty tree over `store`, ordered by `K: Ord`.
    #[inline]
    pub fn new(store: S) -> Self {
        Self::with_comparator(store, Natural)
    }
}

impl<K, V, S, C> RedBlackTree<K, V, S, C> {
    /// An empty tree over `store` ordered by `compare`.
    #[inline]
    pub fn with_comparator(store: S, compare: C) -> Self {
        Self::open(store, compare, None)
    }

    /// A tree whose root record is already in `store`.
    #[inline]
    pub fn open(store: S, compare: C, root_id: Option<NodeId>) -> Self {
        Self {
            compare,
            root_id,
            store,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root_id.is_none()
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[inline]
    pub fn comparator(&self) -> &C {
        &self.compare
    }
}

impl<K, V, S, C> Clone for RedBlackTree<K, V, S, C>
where
    S: Clone,
    C: Clone,
{
    #[inline]
    fn clone(&self) -> Self {
        Self {
            compare: self.compare.clone(),
            root_id: self.root_id,
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V, S, C> std::fmt::Debug for RedBlackTree<K, V, S, C> {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedBlackTree")
            .field("root_id", &self.root_id)
            .finish_non_exhaustive()
    }
}

impl<K, V, S, C> RedBlackTree<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    /// The same lineage rooted somewhere else.
    #[inline]
    pub fn with_root(&self, root_id: Option<NodeId>) -> Self {
        Self::open(self.store.clone(), self.compare.clone(), root_id)
    }

    #[inline]
    pub fn root(&self) -> Result<Option<Node<K, V>>> {
        self.child(self.root_id)
    }

    /// The number of entries in the tree.
    #[inline]
    pub fn len(&self) -> Result<usize> {
        Ok(self.root()?.map_or(0, |root| root.count))
    }

    #[inline]
    pub(crate) fn compare(&self, a: &K, b: &K) -> Ordering {
        self.compare.compare(a, b)
    }

    /// Loads a node some parent refers to.
    #[inline]
    pub(crate) fn load(&self, id: NodeId) -> Result<Node<K, V>> {
        self.store
            .get(id)?
            .ok_or_else(|| InvariantViolation::MissingNode(id).into())
    }

    #[inline]
    pub(crate) fn child(&self, id: Option<NodeId>) -> Result<Option<Node<K, V>>> {
        id.map(|id| self.load(id)).transpose()
    }

    #[inline]
    pub(crate) fn cursor(&self, stack: Vec<Node<K, V>>) -> Cursor<K, V, S, C> {
        Cursor::new(self.clone(), stack)
    }
}

/// Points the link of `parent` that holds `old` at `new` instead.
pub(crate) fn relink<K, V, S>(
    tx: &mut Transaction<'_, K, V, S>,
    parent: NodeId,
    old: NodeId,
    new: Option<NodeId>,
) -> Result<()>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + ?Sized,
{
    let node = tx.written_mut(parent)?;
    let side = node
        .side_of(old)
        .ok_or(InvariantViolation::Unlinked { parent, child: old })?;
    node.set_child(side, new);
    Ok(())
}
