use std::{rc::Rc, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    node::{Node, NodeId},
    Result,
};

pub(crate) mod file;
pub(crate) mod log;
pub(crate) mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// A single write of a batch flushed by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BatchOp<K, V> {
    Put(Node<K, V>),
    Delete { id: NodeId },
}

/// Defines how the tree reads and writes node records from the underlying storage.
///
/// Implementations take `&self` so that one store can back any number of tree versions,
/// and are expected to apply a batch atomically if they are durable.
pub trait NodeStore<K, V> {
    /// Fetches the record with the given id, or `None` if the store never saw it.
    fn get(&self, id: NodeId) -> Result<Option<Node<K, V>>>;

    /// Applies all writes of one committed transaction.
    fn batch(&self, ops: Vec<BatchOp<K, V>>) -> Result<()>;
}

/// A durable slot for the id of the current root, used by [`TreeDb`](crate::TreeDb).
pub trait RootStore {
    fn load_root(&self) -> Result<Option<NodeId>>;

    fn store_root(&self, root: Option<NodeId>) -> Result<()>;
}

macro_rules! forward_store {
    ($($ptr:ident),*) => {$(
        impl<K, V, S> NodeStore<K, V> for $ptr<S>
        where
            S: NodeStore<K, V> + ?Sized,
        {
            #[inline]
            fn get(&self, id: NodeId) -> Result<Option<Node<K, V>>> {
                (**self).get(id)
            }

            #[inline]
            fn batch(&self, ops: Vec<BatchOp<K, V>>) -> Result<()> {
                (**self).batch(ops)
            }
        }

        impl<S> RootStore for $ptr<S>
        where
            S: RootStore + ?Sized,
        {
            #[inline]
            fn load_root(&self) -> Result<Option<NodeId>> {
                (**self).load_root()
            }

            #[inline]
            fn store_root(&self, root: Option<NodeId>) -> Result<()> {
                (**self).store_root(root)
            }
        }
    )*};
}

forward_store!(Arc, Rc);

impl<K, V, S> NodeStore<K, V> for &S
where
    S: NodeStore<K, V> + ?Sized,
{
    #[inline]
    fn get(&self, id: NodeId) -> Result<Option<Node<K, V>>> {
        (**self).get(id)
    }

    #[inline]
    fn batch(&self, ops: Vec<BatchOp<K, V>>) -> Result<()> {
        (**self).batch(ops)
    }
}

impl<S> RootStore for &S
where
    S: RootStore + ?Sized,
{
    #[inline]
    fn load_root(&self) -> Result<Option<NodeId>> {
        (**self).load_root()
    }

    #[inline]
    fn store_root(&self, root: Option<NodeId>) -> Result<()> {
        (**self).store_root(root)
    }
}
