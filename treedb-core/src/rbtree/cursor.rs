use crate::{
    node::Node,
    rbtree::{Comparator, RedBlackTree},
    store::NodeStore,
    Result,
};

/// A position in one tree version: the path of nodes from the root down to the node
/// the cursor points at. An empty path means the cursor is past either end.
///
/// Moving with [`next`](Cursor::next) and [`prev`](Cursor::prev) only rewrites the path.
/// [`update`](Cursor::update) and [`remove`](Cursor::remove) leave the cursor alone and
/// return the new tree; the cursor keeps pointing into the old version.
pub struct Cursor<K, V, S, C> {
    pub(crate) tree: RedBlackTree<K, V, S, C>,
    pub(crate) stack: Vec<Node<K, V>>,
}

impl<K, V, S, C> Cursor<K, V, S, C> {
    #[inline]
    pub(crate) fn new(tree: RedBlackTree<K, V, S, C>, stack: Vec<Node<K, V>>) -> Self {
        Self { tree, stack }
    }

    /// The tree version this cursor walks.
    #[inline]
    pub fn tree(&self) -> &RedBlackTree<K, V, S, C> {
        &self.tree
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        !self.stack.is_empty()
    }

    #[inline]
    pub fn node(&self) -> Option<&Node<K, V>> {
        self.stack.last()
    }

    #[inline]
    pub fn key(&self) -> Option<&K> {
        self.node().map(|node| &node.key)
    }

    #[inline]
    pub fn value(&self) -> Option<&V> {
        self.node().map(|node| &node.value)
    }

    #[inline]
    pub fn key_value(&self) -> Option<(&K, &V)> {
        self.node().map(|node| (&node.key, &node.value))
    }

    /// Checks whether stepping forward would land on another entry.
    pub fn has_next(&self) -> bool {
        let Some(node) = self.stack.last() else {
            return false;
        };
        node.right_id.is_some()
            || self
                .stack
                .windows(2)
                .any(|pair| pair[0].left_id == Some(pair[1].id))
    }

    /// Checks whether stepping backward would land on another entry.
    pub fn has_prev(&self) -> bool {
        let Some(node) = self.stack.last() else {
            return false;
        };
        node.left_id.is_some()
            || self
                .stack
                .windows(2)
                .any(|pair| pair[0].right_id == Some(pair[1].id))
    }
}

impl<K, V, S, C> Cursor<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    /// The rank of the entry under the cursor. An invalid cursor is ranked right after the
    /// last entry.
    pub fn index(&self) -> Result<usize> {
        let Some(node) = self.stack.last() else {
            return self.tree.len();
        };

        let mut idx = self.left_count(node)?;
        for pair in self.stack.windows(2) {
            let (parent, node) = (&pair[0], &pair[1]);
            if parent.right_id == Some(node.id) {
                idx += 1 + self.left_count(parent)?;
            }
        }
        Ok(idx)
    }

    /// Advances the cursor to the next entry in order.
    pub fn next(&mut self) -> Result<()> {
        let Some(node) = self.stack.last() else {
            return Ok(());
        };
        let (mut id, right_id) = (node.id, node.right_id);

        if let Some(mut node) = self.tree.child(right_id)? {
            loop {
                let left_id = node.left_id;
                self.stack.push(node);
                match self.tree.child(left_id)? {
                    Some(left) => node = left,
                    None => break,
                }
            }
        } else {
            self.stack.pop();
            while let Some(parent) = self.stack.last() {
                if parent.right_id != Some(id) {
                    break;
                }
                id = parent.id;
                self.stack.pop();
            }
        }
        Ok(())
    }

    /// Moves the cursor back to the previous entry in order.
    pub fn prev(&mut self) -> Result<()> {
        let Some(node) = self.stack.last() else {
            return Ok(());
        };
        let (mut id, left_id) = (node.id, node.left_id);

        if let Some(mut node) = self.tree.child(left_id)? {
            loop {
                let right_id = node.right_id;
                self.stack.push(node);
                match self.tree.child(right_id)? {
                    Some(right) => node = right,
                    None => break,
                }
            }
        } else {
            self.stack.pop();
            while let Some(parent) = self.stack.last() {
                if parent.left_id != Some(id) {
                    break;
                }
                id = parent.id;
                self.stack.pop();
            }
        }
        Ok(())
    }

    #[inline]
    fn left_count(&self, node: &Node<K, V>) -> Result<usize> {
        Ok(self.tree.child(node.left_id)?.map_or(0, |left| left.count))
    }
}

impl<K, V, S, C> Clone for Cursor<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: Clone,
    C: Clone,
{
    #[inline]
    fn clone(&self) -> Self {
        Self {
            tree: self.tree.clone(),
            stack: self.stack.clone(),
        }
    }
}

impl<K, V, S, C> std::fmt::Debug for Cursor<K, V, S, C>
where
    K: std::fmt::Debug,
{
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("key", &self.key())
            .field("depth", &self.stack.len())
            .finish()
    }
}
