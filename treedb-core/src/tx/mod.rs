use std::collections::HashMap;

use crate::{
    node::{Node, NodeId},
    rbtree::InvariantViolation,
    store::{BatchOp, NodeStore},
    Result,
};

/// Stages the writes of one tree-mutating operation, to be committed all at once.
///
/// Reads go through the staged writes first, then a read cache, then the store. Records
/// written here are fresh copies with ids of their own, so they can be edited in place
/// until `commit` consumes the transaction. Dropping a transaction without committing
/// discards everything staged.
pub(crate) struct Transaction<'a, K, V, S: ?Sized> {
    store: &'a S,
    cache: HashMap<NodeId, Option<Node<K, V>>>,
    dirty: HashMap<NodeId, Dirty<K, V>>,
}

enum Dirty<K, V> {
    Written { node: Node<K, V> },
    Deleted,
}

impl<'a, K, V, S> Transaction<'a, K, V, S>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + ?Sized,
{
    #[inline]
    pub(crate) fn new(store: &'a S) -> Self {
        Self {
            store,
            cache: HashMap::new(),
            dirty: HashMap::new(),
        }
    }

    pub(crate) fn get(&mut self, id: NodeId) -> Result<Option<Node<K, V>>> {
        match self.dirty.get(&id) {
            Some(Dirty::Written { node }) => return Ok(Some(node.clone())),
            Some(Dirty::Deleted) => return Ok(None),
            None => {}
        }

        if let Some(node) = self.cache.get(&id) {
            return Ok(node.clone());
        }

        let node = self.store.get(id)?;
        self.cache.insert(id, node.clone());
        Ok(node)
    }

    /// Reads a node that some parent refers to, so it has to exist.
    #[inline]
    pub(crate) fn node(&mut self, id: NodeId) -> Result<Node<K, V>> {
        self.get(id)?
            .ok_or_else(|| InvariantViolation::MissingNode(id).into())
    }

    #[inline]
    pub(crate) fn child(&mut self, id: Option<NodeId>) -> Result<Option<Node<K, V>>> {
        id.map(|id| self.node(id)).transpose()
    }

    /// Stages a node for writing and returns its id.
    pub(crate) fn set(&mut self, node: Node<K, V>) -> NodeId {
        let id = node.id;
        self.cache.remove(&id);
        self.dirty.insert(id, Dirty::Written { node });
        id
    }

    /// Stages a copy of `node` under a fresh id.
    #[inline]
    pub(crate) fn duplicate(&mut self, node: &Node<K, V>) -> NodeId {
        self.set(node.duplicate())
    }

    /// Stages the removal of a record. A record written by this same transaction is just
    /// dropped, the store never sees it.
    pub(crate) fn delete(&mut self, id: NodeId) {
        self.cache.remove(&id);
        if let Some(Dirty::Written { .. }) = self.dirty.remove(&id) {
            return;
        }
        self.dirty.insert(id, Dirty::Deleted);
    }

    /// A node staged by this transaction.
    #[inline]
    pub(crate) fn written(&self, id: NodeId) -> Result<&Node<K, V>> {
        match self.dirty.get(&id) {
            Some(Dirty::Written { node }) => Ok(node),
            _ => Err(InvariantViolation::NotStaged(id).into()),
        }
    }

    #[inline]
    pub(crate) fn written_mut(&mut self, id: NodeId) -> Result<&mut Node<K, V>> {
        match self.dirty.get_mut(&id) {
            Some(Dirty::Written { node }) => Ok(node),
            _ => Err(InvariantViolation::NotStaged(id).into()),
        }
    }

    /// Recomputes the subtree size of a staged node from its children.
    pub(crate) fn recount(&mut self, id: NodeId) -> Result<()> {
        let (left_id, right_id) = {
            let node = self.written(id)?;
            (node.left_id, node.right_id)
        };
        let left = self.child(left_id)?.map_or(0, |n| n.count);
        let right = self.child(right_id)?.map_or(0, |n| n.count);
        self.written_mut(id)?.count = 1 + left + right;
        Ok(())
    }

    /// Flushes all staged writes to the store as a single batch.
    pub(crate) fn commit(self) -> Result<()> {
        // If there are no dirty nodes, then nothing is required next.
        if self.dirty.is_empty() {
            return Ok(());
        }

        let ops = self
            .dirty
            .into_iter()
            .map(|(id, dirty)| match dirty {
                Dirty::Written { node } => BatchOp::Put(node),
                Dirty::Deleted => BatchOp::Delete { id },
            })
            .collect::<Vec<_>>();

        tracing::trace!(ops = ops.len(), "committing transaction");
        self.store.batch(ops)
    }
}
