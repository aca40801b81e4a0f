use crate::{
    node::{Color, Node, NodeId, Side},
    rbtree::{relink, Comparator, Cursor, InvalidOperation, InvariantViolation, RedBlackTree},
    store::NodeStore,
    tx::Transaction,
    Result,
};

impl<K, V, S, C> RedBlackTree<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    /// Removes an entry with the given key, if there is one.
    ///
    /// Returns an equal tree when no key matches.
    pub fn remove(&self, key: &K) -> Result<Self> {
        let cursor = self.find(key)?;
        if cursor.is_valid() {
            cursor.remove()
        } else {
            Ok(self.clone())
        }
    }
}

impl<K, V, S, C> Cursor<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + Clone,
    C: Comparator<K> + Clone,
{
    /// Replaces the value under the cursor, returning the new tree.
    pub fn update(&self, value: V) -> Result<RedBlackTree<K, V, S, C>> {
        if self.stack.is_empty() {
            return Err(InvalidOperation::InvalidCursor.into());
        }

        let mut tx = Transaction::new(self.tree.store());
        let path = copy_path(&mut tx, &self.stack)?;
        if let Some(&target) = path.last() {
            tx.written_mut(target)?.value = value;
        }

        let root = path[0];
        tx.commit()?;
        Ok(self.tree.with_root(Some(root)))
    }

    /// Removes the entry under the cursor, returning the new tree.
    pub fn remove(&self) -> Result<RedBlackTree<K, V, S, C>> {
        if self.stack.is_empty() {
            return Err(InvalidOperation::InvalidCursor.into());
        }

        let mut tx = Transaction::new(self.tree.store());
        let mut stack = copy_path(&mut tx, &self.stack)?;

        // A node with two children takes over its in-order predecessor's entry, and the
        // predecessor's slot is removed instead.
        let target = tx.written(stack[stack.len() - 1])?;
        if let (Some(left_id), Some(_)) = (target.left_id, target.right_id) {
            let split = stack.len();
            let mut pred = tx.node(left_id)?;
            while let Some(right_id) = pred.right_id {
                let right = tx.node(right_id)?;
                stack.push(tx.duplicate(&pred));
                pred = right;
            }
            stack.push(tx.duplicate(&pred));

            let slot = tx.written_mut(stack[split - 1])?;
            slot.key = pred.key;
            slot.value = pred.value;

            for i in (split..stack.len() - 1).rev() {
                let right = stack[i + 1];
                tx.written_mut(stack[i])?.right_id = Some(right);
            }
            let left = stack[split];
            tx.written_mut(stack[split - 1])?.left_id = Some(left);
        }

        let n = stack[stack.len() - 1];
        let (color, child_id) = {
            let node = tx.written(n)?;
            (node.color, node.left_id.or(node.right_id))
        };

        match (color, child_id) {
            (_, None) if stack.len() == 1 => {
                // The last entry is gone, nothing needs to be written.
                return Ok(self.tree.with_root(None));
            }
            (Color::Red, None) => {
                relink(&mut tx, stack[stack.len() - 2], n, None)?;
                stack.pop();
                tx.delete(n);
                for &id in &stack {
                    tx.written_mut(id)?.count -= 1;
                }
            }
            (_, Some(child_id)) => {
                // The only child is a red leaf, it moves up into the slot.
                let child = tx.node(child_id)?;
                let slot = tx.written_mut(n)?;
                slot.key = child.key;
                slot.value = child.value;
                slot.left_id = child.left_id;
                slot.right_id = child.right_id;
                slot.count = child.count;
                slot.color = Color::Black;
                for &id in &stack[..stack.len() - 1] {
                    tx.written_mut(id)?.count -= 1;
                }
            }
            (Color::Black, None) => {
                for &id in &stack {
                    tx.written_mut(id)?.count -= 1;
                }
                let parent = stack[stack.len() - 2];
                fix_double_black(&mut tx, &mut stack)?;
                relink(&mut tx, parent, n, None)?;
                tx.delete(n);
            }
        }

        let root = stack[0];
        tx.commit()?;
        Ok(self.tree.with_root(Some(root)))
    }
}

/// Stages a copy of every node on `stack`, linked to each other along the same path.
fn copy_path<K, V, S>(
    tx: &mut Transaction<'_, K, V, S>,
    stack: &[Node<K, V>],
) -> Result<Vec<NodeId>>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + ?Sized,
{
    let path = stack
        .iter()
        .map(|node| tx.duplicate(node))
        .collect::<Vec<_>>();

    for (i, pair) in stack.windows(2).enumerate() {
        let side = if pair[0].left_id == Some(pair[1].id) {
            Side::Left
        } else {
            Side::Right
        };
        tx.written_mut(path[i])?.set_child(side, Some(path[i + 1]));
    }
    Ok(path)
}

/// Restores the black height after a black leaf at the top of `stack` lost its place.
///
/// Every node on `stack` must be staged in `tx`. Rotations rewrite `stack` so that it
/// keeps describing the path from the root to the leaf.
fn fix_double_black<K, V, S>(
    tx: &mut Transaction<'_, K, V, S>,
    stack: &mut Vec<NodeId>,
) -> Result<()>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + ?Sized,
{
    let mut i = stack.len() - 1;
    loop {
        let n = stack[i];
        if i == 0 {
            tx.written_mut(n)?.color = Color::Black;
            return Ok(());
        }

        let p = stack[i - 1];
        let parent = tx.written(p)?.clone();
        let side = if parent.left_id == Some(n) {
            Side::Left
        } else {
            Side::Right
        };
        let far = side.opposite();
        let sibling = tx
            .child(parent.child(far))?
            .ok_or(InvariantViolation::MissingSibling(n))?;

        if let Some(nephew) = tx.child(sibling.child(far))?.filter(Node::is_red) {
            // Far nephew is red: rotate the sibling up.
            let ss = tx.duplicate(&sibling);
            let z = tx.duplicate(&nephew);
            {
                let node = tx.written_mut(p)?;
                node.set_child(far, sibling.child(side));
                node.color = Color::Black;
            }
            {
                let node = tx.written_mut(ss)?;
                node.set_child(side, Some(p));
                node.set_child(far, Some(z));
                node.color = parent.color;
            }
            tx.written_mut(n)?.color = Color::Black;
            tx.written_mut(z)?.color = Color::Black;
            tx.recount(p)?;
            tx.recount(ss)?;
            if i > 1 {
                relink(tx, stack[i - 2], p, Some(ss))?;
            }
            stack[i - 1] = ss;
            return Ok(());
        }

        if let Some(nephew) = tx.child(sibling.child(side))?.filter(Node::is_red) {
            // Near nephew is red: rotate it up through the sibling and the parent.
            let ss = tx.duplicate(&sibling);
            let z = tx.duplicate(&nephew);
            {
                let node = tx.written_mut(p)?;
                node.set_child(far, nephew.child(side));
                node.color = Color::Black;
            }
            {
                let node = tx.written_mut(ss)?;
                node.set_child(side, nephew.child(far));
                node.color = Color::Black;
            }
            {
                let node = tx.written_mut(z)?;
                node.set_child(side, Some(p));
                node.set_child(far, Some(ss));
                node.color = parent.color;
            }
            tx.written_mut(n)?.color = Color::Black;
            tx.recount(p)?;
            tx.recount(ss)?;
            tx.recount(z)?;
            if i > 1 {
                relink(tx, stack[i - 2], p, Some(z))?;
            }
            stack[i - 1] = z;
            return Ok(());
        }

        if !sibling.is_red() {
            // Black sibling with black children: paint it red, which either settles at a
            // red parent or moves the deficiency one level up.
            let mut ss = sibling.duplicate();
            ss.color = Color::Red;
            let ss = tx.set(ss);
            let node = tx.written_mut(p)?;
            node.set_child(far, Some(ss));
            if parent.is_red() {
                node.color = Color::Black;
                return Ok(());
            }
            i -= 1;
            continue;
        }

        // Red sibling: rotate it up and retry one level deeper.
        let ss = tx.duplicate(&sibling);
        {
            let node = tx.written_mut(p)?;
            node.set_child(far, sibling.child(side));
            node.color = Color::Red;
        }
        {
            let node = tx.written_mut(ss)?;
            node.set_child(side, Some(p));
            node.color = parent.color;
        }
        tx.recount(p)?;
        tx.recount(ss)?;
        if i > 1 {
            relink(tx, stack[i - 2], p, Some(ss))?;
        }
        stack[i - 1] = ss;
        stack[i] = p;
        stack.truncate(i + 1);
        stack.push(n);
        i += 1;
    }
}
