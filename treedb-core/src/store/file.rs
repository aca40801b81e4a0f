use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    fs,
    io::{self, Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    os::unix::fs::FileExt,
    path::Path,
    result,
    sync::{Mutex, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{
    db::Options,
    node::{Node, NodeId},
    store::{
        log::{Frame, FrameError, Header, OpHead, Record, RecordHead},
        BatchOp, NodeStore, RootStore,
    },
};

pub(crate) type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub(crate) enum Error {
    #[error(transparent)]
    IO(#[from] io::Error),
    #[error("the record at offset {offset} is corrupted: {source}")]
    Corrupted { offset: u64, source: FrameError },
    #[error("the record at offset {offset} is not a node")]
    NotNode { offset: u64 },
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A durable node store backed by an append-only log file.
///
/// Every committed batch is appended as a run of frames closed by a commit frame, in a
/// single write. Node records are looked up through an in-memory index of frame offsets
/// which is rebuilt from the log on open. A batch whose commit frame never made it to
/// disk is discarded on the next open, together with anything after it.
///
/// Appends are serialized. Reads only share the index lock and fetch frames with
/// positional reads, so they run concurrently with each other and with appends.
pub struct FileStore<K, V> {
    reader: fs::File,
    index: RwLock<Index>,
    log: Mutex<Log>,
    force_sync: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

/// Where the committed records are. Only frames already on disk are indexed.
#[derive(Default)]
struct Index {
    offsets: HashMap<NodeId, u64>,
    root: Option<NodeId>,
}

/// The append end of the log file.
struct Log {
    file: fs::File,
    len: u64,
}

impl<K, V> FileStore<K, V> {
    /// Opens the log at the given path with default options, creating it if needed.
    #[inline]
    pub fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
        Self::open_with_options(path, &Options::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: &Options) -> crate::Result<Self> {
        let path = path.as_ref();

        // Create all necessary intermediate directories.
        if let Some(parent_dir) = path.parent() {
            fs::create_dir_all(parent_dir).map_err(Error::from)?;
        }

        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(Error::from)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(Error::from)?;

        let (log, index) = if bytes.is_empty() {
            (Log::init(file)?, Index::default())
        } else {
            Header::from_bytes(&bytes)?;
            Log::replay(file, &bytes)?
        };
        let reader = log.file.try_clone().map_err(Error::from)?;

        tracing::debug!(
            path = %path.display(),
            nodes = index.offsets.len(),
            bytes = log.len,
            "opened file store"
        );

        Ok(Self {
            reader,
            index: RwLock::new(index),
            log: Mutex::new(log),
            force_sync: options.force_sync,
            _marker: PhantomData,
        })
    }

    /// The number of node records reachable through the offset index.
    #[inline]
    pub fn len(&self) -> usize {
        self.index.read().unwrap().offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads and checks the frame starting at `offset`.
    fn read_frame(&self, offset: u64) -> Result<Vec<u8>> {
        let mut header = [0; Frame::HEADER_SIZE];
        self.reader.read_exact_at(&mut header, offset)?;

        let len = Frame::payload_len(&header).map_err(|source| Error::Corrupted { offset, source })?;
        let mut frame = vec![0; Frame::HEADER_SIZE + len];
        frame[..Frame::HEADER_SIZE].copy_from_slice(&header);
        self.reader
            .read_exact_at(&mut frame[Frame::HEADER_SIZE..], offset + header.len() as u64)?;

        let (payload, _) =
            Frame::decode(&frame).map_err(|source| Error::Corrupted { offset, source })?;
        Ok(payload.to_vec())
    }
}

impl Log {
    fn init(mut file: fs::File) -> Result<Self> {
        let header = Header::new().to_bytes();
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(Self {
            file,
            len: header.len() as u64,
        })
    }

    /// Rebuilds the offset index and the root pointer from the log content.
    fn replay(file: fs::File, bytes: &[u8]) -> Result<(Self, Index)> {
        let mut index = Index::default();
        let mut pending = Vec::new();

        // The end of the last frame that left the log in a consistent state.
        let mut consistent = Header::SIZE;
        let mut offset = Header::SIZE;

        while offset < bytes.len() {
            let (payload, size) = match Frame::decode(&bytes[offset..]) {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(offset, %err, "discarding torn tail of the log");
                    break;
                }
            };

            match serde_json::from_slice::<RecordHead>(payload)? {
                RecordHead::Op(op) => pending.push((op, offset as u64)),
                RecordHead::Commit => {
                    for (op, at) in pending.drain(..) {
                        match op {
                            OpHead::Put { id } => index.offsets.insert(id, at),
                            OpHead::Delete { id } => index.offsets.remove(&id),
                        };
                    }
                    consistent = offset + size;
                }
                RecordHead::Root { id } => {
                    index.root = id;
                    if pending.is_empty() {
                        consistent = offset + size;
                    }
                }
            }
            offset += size;
        }

        if !pending.is_empty() {
            tracing::warn!(ops = pending.len(), "discarding uncommitted batch");
        }

        let len = consistent as u64;
        if len < bytes.len() as u64 {
            file.set_len(len)?;
            file.sync_all()?;
        }

        tracing::debug!(nodes = index.offsets.len(), "replayed log");

        Ok((Self { file, len }, index))
    }

    fn append(&mut self, buf: &[u8], force_sync: bool) -> Result<u64> {
        let offset = self.len;
        let written = self
            .file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(buf))
            .and_then(|_| if force_sync { self.file.sync_data() } else { Ok(()) });

        if let Err(err) = written {
            // Keep the file consistent with the index, a later open would drop the tail anyway.
            _ = self.file.set_len(offset);
            return Err(err.into());
        }

        self.len += buf.len() as u64;
        Ok(offset)
    }
}

impl<K, V> NodeStore<K, V> for FileStore<K, V>
where
    K: Serialize + DeserializeOwned,
    V: Serialize + DeserializeOwned,
{
    fn get(&self, id: NodeId) -> crate::Result<Option<Node<K, V>>> {
        let Some(offset) = self.index.read().unwrap().offsets.get(&id).copied() else {
            return Ok(None);
        };

        let payload = self.read_frame(offset)?;
        match serde_json::from_slice::<Record<K, V>>(&payload).map_err(Error::from)? {
            Record::Op(BatchOp::Put(node)) => Ok(Some(node)),
            _ => Err(Error::NotNode { offset }.into()),
        }
    }

    fn batch(&self, ops: Vec<BatchOp<K, V>>) -> crate::Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        let mut placed = Vec::with_capacity(ops.len());
        for op in &ops {
            let at = buf.len() as u64;
            let payload = serde_json::to_vec(&RecordRef::Op(op)).map_err(Error::from)?;
            Frame::encode(&payload, &mut buf).map_err(Error::from)?;
            placed.push(at);
        }
        let commit = serde_json::to_vec(&Record::<K, V>::Commit).map_err(Error::from)?;
        Frame::encode(&commit, &mut buf).map_err(Error::from)?;

        let mut log = self.log.lock().unwrap();
        let base = log.append(&buf, self.force_sync)?;

        // Still under the log lock, so the index follows the order of the log.
        let mut index = self.index.write().unwrap();
        for (op, at) in ops.iter().zip(placed) {
            match op {
                BatchOp::Put(node) => index.offsets.insert(node.id, base + at),
                BatchOp::Delete { id } => index.offsets.remove(id),
            };
        }
        Ok(())
    }
}

impl<K, V> RootStore for FileStore<K, V> {
    #[inline]
    fn load_root(&self) -> crate::Result<Option<NodeId>> {
        Ok(self.index.read().unwrap().root)
    }

    fn store_root(&self, root: Option<NodeId>) -> crate::Result<()> {
        let payload =
            serde_json::to_vec(&Record::<(), ()>::Root { id: root }).map_err(Error::from)?;
        let mut buf = Vec::new();
        Frame::encode(&payload, &mut buf).map_err(Error::from)?;

        let mut log = self.log.lock().unwrap();
        log.append(&buf, self.force_sync)?;
        self.index.write().unwrap().root = root;
        Ok(())
    }
}

impl<K, V> Debug for FileStore<K, V> {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read().unwrap();
        f.debug_struct("FileStore")
            .field("nodes", &index.offsets.len())
            .field("root", &index.root)
            .field("len", &self.log.lock().unwrap().len)
            .finish()
    }
}

/// Borrowing twin of [`Record::Op`], so batches are encoded without cloning nodes.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum RecordRef<'a, K, V> {
    Op(&'a BatchOp<K, V>),
}
