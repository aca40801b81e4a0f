use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::RwLock,
};

use crate::{
    node::{Node, NodeId},
    store::{BatchOp, NodeStore, RootStore},
    Result,
};

/// A node store kept entirely in process memory.
///
/// Useful for tests and for trees that don't need to outlive the process. All tree
/// versions created against one `MemoryStore` share their unchanged subtrees.
pub struct MemoryStore<K, V> {
    nodes: RwLock<HashMap<NodeId, Node<K, V>>>,
    root: RwLock<Option<NodeId>>,
}

impl<K, V> MemoryStore<K, V> {
    #[inline]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            root: RwLock::new(None),
        }
    }

    /// The number of node records held, across all tree versions.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.read().unwrap().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for MemoryStore<K, V> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for MemoryStore<K, V> {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("nodes", &self.len())
            .field("root", &*self.root.read().unwrap())
            .finish()
    }
}

impl<K, V> NodeStore<K, V> for MemoryStore<K, V>
where
    K: Clone,
    V: Clone,
{
    #[inline]
    fn get(&self, id: NodeId) -> Result<Option<Node<K, V>>> {
        Ok(self.nodes.read().unwrap().get(&id).cloned())
    }

    fn batch(&self, ops: Vec<BatchOp<K, V>>) -> Result<()> {
        let mut nodes = self.nodes.write().unwrap();
        for op in ops {
            match op {
                BatchOp::Put(node) => {
                    nodes.insert(node.id, node);
                }
                BatchOp::Delete { id } => {
                    nodes.remove(&id);
                }
            }
        }
        Ok(())
    }
}

impl<K, V> RootStore for MemoryStore<K, V> {
    #[inline]
    fn load_root(&self) -> Result<Option<NodeId>> {
        Ok(*self.root.read().unwrap())
    }

    #[inline]
    fn store_root(&self, root: Option<NodeId>) -> Result<()> {
        *self.root.write().unwrap() = root;
        Ok(())
    }
}
