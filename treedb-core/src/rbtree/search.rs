use std::{cmp::Ordering, ops::ControlFlow};

use crate::{
    node::Node,
    rbtree::{Comparator, Cursor, RedBlackTree},
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
    /// Returns the value of the first node on the search path whose key equals `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        let mut next = self.root()?;
        while let Some(node) = next {
            let order = self.compare(key, &node.key);
            if order == Ordering::Equal {
                return Ok(Some(node.value));
            }
            next = self.child(if order.is_le() {
                node.left_id
            } else {
                node.right_id
            })?;
        }
        Ok(None)
    }

    #[inline]
    pub fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// A cursor at a node whose key equals `key`, or an invalid cursor.
    ///
    /// Among equal keys, it's the one the descent reaches first.
    pub fn find(&self, key: &K) -> Result<Cursor<K, V, S, C>> {
        let mut stack = Vec::new();
        let mut next = self.root()?;
        while let Some(node) = next {
            let order = self.compare(key, &node.key);
            let child_id = if order.is_le() {
                node.left_id
            } else {
                node.right_id
            };
            stack.push(node);
            if order == Ordering::Equal {
                return Ok(self.cursor(stack));
            }
            next = self.child(child_id)?;
        }
        Ok(self.cursor(Vec::new()))
    }

    /// A cursor at the first entry.
    pub fn begin(&self) -> Result<Cursor<K, V, S, C>> {
        let mut stack = Vec::new();
        let mut next = self.root()?;
        while let Some(node) = next {
            next = self.child(node.left_id)?;
            stack.push(node);
        }
        Ok(self.cursor(stack))
    }

    /// A cursor at the last entry.
    pub fn end(&self) -> Result<Cursor<K, V, S, C>> {
        let mut stack = Vec::new();
        let mut next = self.root()?;
        while let Some(node) = next {
            next = self.child(node.right_id)?;
            stack.push(node);
        }
        Ok(self.cursor(stack))
    }

    /// A cursor at the entry with rank `idx`, found through the subtree counts.
    pub fn at(&self, mut idx: usize) -> Result<Cursor<K, V, S, C>> {
        let mut stack = Vec::new();
        let mut next = self.root()?;
        while let Some(node) = next {
            let left = self.child(node.left_id)?;
            let right_id = node.right_id;
            stack.push(node);

            if let Some(left) = left {
                if idx < left.count {
                    next = Some(left);
                    continue;
                }
                idx -= left.count;
            }
            if idx == 0 {
                return Ok(self.cursor(stack));
            }
            idx -= 1;

            next = match self.child(right_id)? {
                Some(right) if idx < right.count => Some(right),
                _ => None,
            };
        }
        Ok(self.cursor(Vec::new()))
    }

    /// A cursor at the first entry whose key is greater than or equal to `key`.
    #[inline]
    pub fn ge(&self, key: &K) -> Result<Cursor<K, V, S, C>> {
        self.bound(key, Ordering::is_le, Ordering::is_le)
    }

    /// A cursor at the first entry whose key is greater than `key`.
    #[inline]
    pub fn gt(&self, key: &K) -> Result<Cursor<K, V, S, C>> {
        self.bound(key, Ordering::is_lt, Ordering::is_lt)
    }

    /// A cursor at the last entry whose key is less than `key`.
    #[inline]
    pub fn lt(&self, key: &K) -> Result<Cursor<K, V, S, C>> {
        self.bound(key, Ordering::is_gt, Ordering::is_le)
    }

    /// A cursor at the last entry whose key is less than or equal to `key`.
    #[inline]
    pub fn le(&self, key: &K) -> Result<Cursor<K, V, S, C>> {
        self.bound(key, Ordering::is_ge, Ordering::is_lt)
    }

    /// Walks down once, remembering the deepest node that satisfies `keep`, then cuts the
    /// path right below it.
    fn bound(
        &self,
        key: &K,
        keep: fn(Ordering) -> bool,
        go_left: fn(Ordering) -> bool,
    ) -> Result<Cursor<K, V, S, C>> {
        let mut stack = Vec::new();
        let mut last = 0;
        let mut next = self.root()?;
        while let Some(node) = next {
            let order = self.compare(key, &node.key);
            let child_id = if go_left(order) {
                node.left_id
            } else {
                node.right_id
            };
            stack.push(node);
            if keep(order) {
                last = stack.len();
            }
            next = self.child(child_id)?;
        }
        stack.truncate(last);
        Ok(self.cursor(stack))
    }

    /// Visits all entries in order.
    ///
    /// Returning `ControlFlow::Break` from `f` stops the traversal, and the break value is
    /// handed back.
    pub fn for_each<T, F>(&self, mut f: F) -> Result<Option<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        let Some(root) = self.root()? else {
            return Ok(None);
        };
        Ok(break_value(self.visit_full(&root, &mut f)?))
    }

    /// Visits, in order, the entries whose keys are not less than `lo`.
    pub fn for_each_from<T, F>(&self, lo: &K, mut f: F) -> Result<Option<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        let Some(root) = self.root()? else {
            return Ok(None);
        };
        Ok(break_value(self.visit_half(lo, &root, &mut f)?))
    }

    /// Visits, in order, the entries with keys in `lo..hi`. Nothing is visited unless
    /// `lo < hi`.
    pub fn for_each_range<T, F>(&self, lo: &K, hi: &K, mut f: F) -> Result<Option<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        let Some(root) = self.root()? else {
            return Ok(None);
        };
        if self.compare(lo, hi).is_ge() {
            return Ok(None);
        }
        Ok(break_value(self.visit_range(lo, hi, &root, &mut f)?))
    }

    pub fn keys(&self) -> Result<Vec<K>> {
        let mut keys = Vec::new();
        self.for_each(|key, _| {
            keys.push(key.clone());
            ControlFlow::<()>::Continue(())
        })?;
        Ok(keys)
    }

    pub fn values(&self) -> Result<Vec<V>> {
        let mut values = Vec::new();
        self.for_each(|_, value| {
            values.push(value.clone());
            ControlFlow::<()>::Continue(())
        })?;
        Ok(values)
    }

    pub fn entries(&self) -> Result<Vec<(K, V)>> {
        let mut entries = Vec::new();
        self.for_each(|key, value| {
            entries.push((key.clone(), value.clone()));
            ControlFlow::<()>::Continue(())
        })?;
        Ok(entries)
    }

    fn visit_full<T, F>(&self, node: &Node<K, V>, f: &mut F) -> Result<ControlFlow<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        if let Some(left) = self.child(node.left_id)? {
            if let ControlFlow::Break(t) = self.visit_full(&left, f)? {
                return Ok(ControlFlow::Break(t));
            }
        }
        if let ControlFlow::Break(t) = f(&node.key, &node.value) {
            return Ok(ControlFlow::Break(t));
        }
        match self.child(node.right_id)? {
            Some(right) => self.visit_full(&right, f),
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn visit_half<T, F>(&self, lo: &K, node: &Node<K, V>, f: &mut F) -> Result<ControlFlow<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        if self.compare(lo, &node.key).is_le() {
            if let Some(left) = self.child(node.left_id)? {
                if let ControlFlow::Break(t) = self.visit_half(lo, &left, f)? {
                    return Ok(ControlFlow::Break(t));
                }
            }
            if let ControlFlow::Break(t) = f(&node.key, &node.value) {
                return Ok(ControlFlow::Break(t));
            }
        }
        match self.child(node.right_id)? {
            Some(right) => self.visit_half(lo, &right, f),
            None => Ok(ControlFlow::Continue(())),
        }
    }

    fn visit_range<T, F>(
        &self,
        lo: &K,
        hi: &K,
        node: &Node<K, V>,
        f: &mut F,
    ) -> Result<ControlFlow<T>>
    where
        F: FnMut(&K, &V) -> ControlFlow<T>,
    {
        let below_hi = self.compare(hi, &node.key).is_gt();
        if self.compare(lo, &node.key).is_le() {
            if let Some(left) = self.child(node.left_id)? {
                if let ControlFlow::Break(t) = self.visit_range(lo, hi, &left, f)? {
                    return Ok(ControlFlow::Break(t));
                }
            }
            if below_hi {
                if let ControlFlow::Break(t) = f(&node.key, &node.value) {
                    return Ok(ControlFlow::Break(t));
                }
            }
        }
        if !below_hi {
            return Ok(ControlFlow::Continue(()));
        }
        match self.child(node.right_id)? {
            Some(right) => self.visit_range(lo, hi, &right, f),
            None => Ok(ControlFlow::Continue(())),
        }
    }
}

#[inline]
fn break_value<T>(flow: ControlFlow<T>) -> Option<T> {
    match flow {
        ControlFlow::Break(t) => Some(t),
        ControlFlow::Continue(()) => None,
    }
}
