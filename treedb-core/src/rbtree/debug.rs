use std::fmt::Debug;

use crate::{
    node::Node,
    rbtree::{Comparator, InvariantViolation, RedBlackTree},
    store::NodeStore,
    Result,
};

impl<K, V, S, C> RedBlackTree<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    /// Walks the whole tree and checks the red-black rules, the subtree counts and the
    /// key order.
    pub fn validate(&self) -> Result<()> {
        let Some(root) = self.root()? else {
            return Ok(());
        };
        if root.is_red() {
            return Err(InvariantViolation::RedRoot(root.id).into());
        }
        self.validate_node(&root, None, None)?;
        Ok(())
    }

    /// Returns the black height and the size of the subtree under `node`.
    fn validate_node(
        &self,
        node: &Node<K, V>,
        lo: Option<&K>,
        hi: Option<&K>,
    ) -> Result<(usize, usize)> {
        let out_of_order = lo.map_or(false, |lo| self.compare(lo, &node.key).is_gt())
            || hi.map_or(false, |hi| self.compare(&node.key, hi).is_gt());
        if out_of_order {
            return Err(InvariantViolation::Order(node.id).into());
        }

        let left = self.child(node.left_id)?;
        let right = self.child(node.right_id)?;
        if node.is_red() && left.iter().chain(&right).any(Node::is_red) {
            return Err(InvariantViolation::RedRed(node.id).into());
        }

        let (left_height, left_count) = match &left {
            Some(left) => self.validate_node(left, lo, Some(&node.key))?,
            None => (0, 0),
        };
        let (right_height, right_count) = match &right {
            Some(right) => self.validate_node(right, Some(&node.key), hi)?,
            None => (0, 0),
        };

        if left_height != right_height {
            return Err(InvariantViolation::BlackHeight(node.id).into());
        }
        let expected = 1 + left_count + right_count;
        if node.count != expected {
            return Err(InvariantViolation::Count {
                id: node.id,
                found: node.count,
                expected,
            }
            .into());
        }

        let height = left_height + usize::from(!node.is_red());
        Ok((height, expected))
    }

    /// Draws the tree, one node per line, left child before right child.
    pub fn dump(&self) -> Result<String>
    where
        K: Debug,
    {
        let mut out = String::from("┓\n");
        if let Some(root) = self.root()? {
            self.dump_node(&root, String::new(), true, &mut out)?;
        }
        Ok(out)
    }

    fn dump_node(
        &self,
        node: &Node<K, V>,
        prefix: String,
        is_last: bool,
        out: &mut String,
    ) -> Result<()>
    where
        K: Debug,
    {
        let weld = if is_last { "┗" } else { "┣" };
        let color = if node.is_red() { "R" } else { "B" };
        out.push_str(&format!(
            "{}{}━ {} {:?} ({})\n",
            prefix, weld, color, node.key, node.count
        ));

        let next_prefix = prefix + if is_last { "   " } else { "┃  " };
        let children = [node.left_id, node.right_id]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        for (index, id) in children.iter().enumerate() {
            let child = self.load(*id)?;
            let is_last = index == children.len() - 1;
            self.dump_node(&child, next_prefix.clone(), is_last, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        node::{Color, Node},
        rbtree::RedBlackTree,
        store::{BatchOp, MemoryStore, NodeStore},
        ErrorCode,
    };

    #[test]
    fn test_dump() {
        let store = MemoryStore::<i32, ()>::new();
        let tree = RedBlackTree::new(&store)
            .insert(2, ())
            .unwrap()
            .insert(1, ())
            .unwrap()
            .insert(3, ())
            .unwrap();

        assert_eq!(
            tree.dump().unwrap(),
            "┓\n┗━ B 2 (3)\n   ┣━ R 1 (1)\n   ┗━ R 3 (1)\n"
        );
        assert_eq!(RedBlackTree::<i32, (), _>::new(&store).dump().unwrap(), "┓\n");
    }

    #[test]
    fn test_validate_detects_broken_trees() {
        let store = MemoryStore::<i32, ()>::new();
        let open = |root: &Node<i32, ()>| {
            RedBlackTree::<i32, (), _>::new(&store).with_root(Some(root.id))
        };

        let red_root = Node::leaf(1, ());
        store.batch(vec![BatchOp::Put(red_root.clone())]).unwrap();
        let err = open(&red_root).validate().unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvariantViolation);

        let mut child = Node::leaf(5, ());
        child.color = Color::Black;
        let mut root = Node::leaf(3, ());
        root.color = Color::Black;
        root.left_id = Some(child.id);
        root.count = 2;
        store
            .batch(vec![BatchOp::Put(child.clone()), BatchOp::Put(root.clone())])
            .unwrap();
        // A black left child with no right sibling, and a key on the wrong side.
        assert!(open(&root).validate().is_err());

        let mut leaf = Node::leaf(1, ());
        leaf.count = 7;
        let mut root = Node::leaf(3, ());
        root.color = Color::Black;
        root.left_id = Some(leaf.id);
        root.count = 8;
        store
            .batch(vec![BatchOp::Put(leaf.clone()), BatchOp::Put(root.clone())])
            .unwrap();
        assert!(open(&root).validate().is_err());

        let mut leaf = Node::leaf(1, ());
        leaf.color = Color::Red;
        let mut root = Node::leaf(3, ());
        root.color = Color::Black;
        root.left_id = Some(leaf.id);
        root.count = 2;
        store
            .batch(vec![BatchOp::Put(leaf.clone()), BatchOp::Put(root.clone())])
            .unwrap();
        open(&root).validate().unwrap();
    }

    #[test]
    fn test_validate_missing_node() {
        let store = MemoryStore::<i32, ()>::new();
        let mut root = Node::leaf(1, ());
        root.color = Color::Black;
        root.right_id = Some(Node::leaf(2, ()).id());
        root.count = 2;
        store.batch(vec![BatchOp::Put(root.clone())]).unwrap();

        let tree = RedBlackTree::<i32, (), _>::new(&store).with_root(Some(root.id));
        assert_eq!(
            tree.validate().unwrap_err().code(),
            ErrorCode::InvariantViolation
        );
        assert_eq!(tree.get(&3).unwrap_err().code(), ErrorCode::InvariantViolation);
        assert_eq!(tree.get(&0).unwrap(), None);
    }
}
