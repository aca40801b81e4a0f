use crate::{
    node::{Color, Node, NodeId, Side},
    rbtree::{relink, Comparator, RedBlackTree},
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
    /// Inserts a new entry and returns the tree that holds it.
    ///
    /// Existing entries with an equal key are kept, the new one lands to their left.
    pub fn insert(&self, key: K, value: V) -> Result<Self> {
        let mut tx = Transaction::new(&self.store);

        // Copy the search path, then hang a red leaf below it.
        let mut stack: Vec<NodeId> = Vec::new();
        let mut sides: Vec<Side> = Vec::new();
        let mut next = self.root_id;
        while let Some(id) = next {
            let node = tx.node(id)?;
            let side = if self.compare(&key, &node.key).is_le() {
                Side::Left
            } else {
                Side::Right
            };
            next = node.child(side);
            stack.push(tx.duplicate(&node));
            sides.push(side);
        }

        stack.push(tx.set(Node::leaf(key, value)));
        for s in (0..stack.len() - 1).rev() {
            let child = stack[s + 1];
            let node = tx.written_mut(stack[s])?;
            node.set_child(sides[s], Some(child));
            node.count += 1;
        }

        self.rebalance_insert(&mut tx, &mut stack)?;

        let root = stack[0];
        tx.written_mut(root)?.color = Color::Black;
        tx.commit()?;
        Ok(self.with_root(Some(root)))
    }

    /// Walks up from the new leaf, repairing red nodes with red parents.
    fn rebalance_insert(
        &self,
        tx: &mut Transaction<'_, K, V, S>,
        stack: &mut [NodeId],
    ) -> Result<()> {
        let mut s = stack.len() - 1;
        while s > 1 {
            let (pp, p, n) = (stack[s - 2], stack[s - 1], stack[s]);
            if !tx.written(p)?.is_red() || !tx.written(n)?.is_red() {
                break;
            }

            let grand = tx.written(pp)?;
            let side = if grand.left_id == Some(p) {
                Side::Left
            } else {
                Side::Right
            };
            let uncle_id = grand.child(side.opposite());
            let uncle = tx.child(uncle_id)?;

            // Red uncle: push the red up two levels.
            if let Some(uncle) = uncle.filter(Node::is_red) {
                tx.written_mut(p)?.color = Color::Black;
                let mut uncle = uncle.duplicate();
                uncle.color = Color::Black;
                let uncle = tx.set(uncle);
                let grand = tx.written_mut(pp)?;
                grand.set_child(side.opposite(), Some(uncle));
                grand.color = Color::Red;
                s -= 2;
                continue;
            }

            let top = if tx.written(p)?.child(side) == Some(n) {
                // LL / RR: a single rotation lifts `p`.
                let inner = tx.written(p)?.child(side.opposite());
                {
                    let grand = tx.written_mut(pp)?;
                    grand.color = Color::Red;
                    grand.set_child(side, inner);
                }
                {
                    let parent = tx.written_mut(p)?;
                    parent.color = Color::Black;
                    parent.set_child(side.opposite(), Some(pp));
                }
                stack[s - 2] = p;
                stack[s - 1] = n;
                tx.recount(pp)?;
                tx.recount(p)?;
                p
            } else {
                // LR / RL: a double rotation lifts `n`.
                let (near, far) = {
                    let node = tx.written(n)?;
                    (node.child(side), node.child(side.opposite()))
                };
                tx.written_mut(p)?.set_child(side.opposite(), near);
                {
                    let grand = tx.written_mut(pp)?;
                    grand.color = Color::Red;
                    grand.set_child(side, far);
                }
                {
                    let node = tx.written_mut(n)?;
                    node.color = Color::Black;
                    node.set_child(side, Some(p));
                    node.set_child(side.opposite(), Some(pp));
                }
                stack[s - 2] = n;
                stack[s - 1] = p;
                tx.recount(pp)?;
                tx.recount(p)?;
                tx.recount(n)?;
                n
            };

            if s >= 3 {
                relink(tx, stack[s - 3], pp, Some(top))?;
            }
            break;
        }
        Ok(())
    }
}
