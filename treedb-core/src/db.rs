use std::{
    path::Path,
    sync::{Arc, Mutex, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::Result,
    rbtree::{Comparator, Natural, RedBlackTree},
    store::{FileStore, NodeStore, RootStore},
};

/// The options for configuring a file-backed TreeDB instance.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) force_sync: bool,
}

impl Options {
    /// Creates a new Options instance with default values.
    #[inline]
    pub fn new() -> Self {
        Default::default()
    }

    /// Decide whether to force synchronization after every committed batch and root swap.
    ///
    /// If it is true, every append to the log file is immediately followed by a sync
    /// operation. If it is false, syncing is left to the operating system.
    #[inline]
    pub fn force_sync(&mut self, flag: bool) -> &mut Self {
        self.force_sync = flag;
        self
    }

    /// Open a file-backed TreeDB instance with the current options.
    #[inline]
    pub fn open<K, V>(&self, path: impl AsRef<Path>) -> Result<TreeDb<K, V, FileStore<K, V>>>
    where
        K: Ord + Clone + Serialize + DeserializeOwned,
        V: Clone + Serialize + DeserializeOwned,
    {
        TreeDb::open_with_options(path, self)
    }
}

/// A map-like database holding one current tree over a node store.
///
/// Readers take a snapshot of the current tree and never block each other. Writers are
/// serialized: each one derives a new tree from the current one, persists its root through
/// [`RootStore`], and only then makes it current.
pub struct TreeDb<K, V, S, C = Natural> {
    store: Arc<S>,
    tree: RwLock<RedBlackTree<K, V, Arc<S>, C>>,
    writer: Mutex<()>,
}

impl<K, V> TreeDb<K, V, FileStore<K, V>>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Open a TreeDB instance at the given file path with default options.
    #[inline]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, &Options::default())
    }

    /// Open a TreeDB instance at the given file path with the provided options.
    #[inline]
    pub fn open_with_options(path: impl AsRef<Path>, options: &Options) -> Result<Self> {
        Self::with_store(FileStore::open_with_options(path, options)?, Natural)
    }
}

impl<K, V, S, C> TreeDb<K, V, S, C>
where
    K: Clone,
    V: Clone,
    S: NodeStore<K, V> + RootStore,
    C: Comparator<K> + Clone,
{
    /// Builds a database over `store`, resuming from the root it has recorded.
    pub fn with_store(store: S, compare: C) -> Result<Self> {
        let store = Arc::new(store);
        let root = store.load_root()?;
        tracing::debug!(?root, "loaded tree root");

        Ok(Self {
            tree: RwLock::new(RedBlackTree::open(Arc::clone(&store), compare, root)),
            store,
            writer: Mutex::new(()),
        })
    }

    #[inline]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The current tree. It stays valid and unchanged whatever happens to the database
    /// afterwards.
    #[inline]
    pub fn snapshot(&self) -> RedBlackTree<K, V, Arc<S>, C> {
        self.tree.read().unwrap().clone()
    }

    /// Get the value associated with a given key.
    #[inline]
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        self.snapshot().get(key)
    }

    /// Check if the database contains a given key.
    #[inline]
    pub fn contains(&self, key: &K) -> Result<bool> {
        self.snapshot().contains(key)
    }

    #[inline]
    pub fn len(&self) -> Result<usize> {
        self.snapshot().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tree.read().unwrap().is_empty()
    }

    /// Runs read-only queries against one snapshot.
    #[inline]
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&RedBlackTree<K, V, Arc<S>, C>) -> Result<T>,
    {
        f(&self.snapshot())
    }

    /// Derives a new tree from the current one and makes it current.
    ///
    /// Writers are serialized. If `f` fails, the current tree stays as it was.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(RedBlackTree<K, V, Arc<S>, C>) -> Result<RedBlackTree<K, V, Arc<S>, C>>,
    {
        let _writer = self.writer.lock().unwrap();
        let current = self.snapshot();
        let root = current.root_id();

        let tree = f(current)?;
        if tree.root_id() == root {
            return Ok(());
        }

        self.store.store_root(tree.root_id())?;
        tracing::debug!(from = ?root, to = ?tree.root_id(), "swapped tree root");
        *self.tree.write().unwrap() = tree;
        Ok(())
    }

    /// Sets the value of a key, replacing the value of an existing entry.
    pub fn put(&self, key: K, value: V) -> Result<()> {
        self.update(|tree| {
            let cursor = tree.find(&key)?;
            if cursor.is_valid() {
                cursor.update(value)
            } else {
                tree.insert(key, value)
            }
        })
    }

    /// Deletes the entry of a key, returns whether there was one.
    pub fn delete(&self, key: &K) -> Result<bool> {
        let mut found = false;
        self.update(|tree| {
            let cursor = tree.find(key)?;
            if !cursor.is_valid() {
                return Ok(tree);
            }
            found = true;
            cursor.remove()
        })?;
        Ok(found)
    }
}
