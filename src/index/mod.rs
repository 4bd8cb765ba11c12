//! Index Module
//!
//! Transactional metadata store for chunks, the active buffer, statistics,
//! the position index and user checkpoints.
//!
//! ## Responsibilities
//! - Consistent read snapshots (`Index::read`)
//! - Atomic multi-put updates (`Index::update`), the durability boundary of
//!   sealing and checkpointing
//! - One shared database handle per folder within the process
//!
//! ## Logical Tables
//! ```text
//! ┌─────┬──────────────────┬──────────────────────────────┬────────────┐
//! │ Tag │ Table            │ Key                          │ Value      │
//! ├─────┼──────────────────┼──────────────────────────────┼────────────┤
//! │  1  │ chunks           │ tag + start_pos (sortable)   │ ChunkMeta  │
//! │  2  │ position index   │ tag + stream + sequence      │ varint pos │
//! │  3  │ active buffer    │ tag                          │ BufferMeta │
//! │  4  │ statistics       │ tag                          │ LogStats   │
//! │  5  │ user checkpoints │ tag + name                   │ varint pos │
//! └─────┴──────────────────┴──────────────────────────────┴────────────┘
//! ```

mod keys;
mod meta;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use bytes::BytesMut;
use parking_lot::Mutex;
use redb::{Database, ReadOnlyTable, ReadableTable, Table, TableDefinition};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{CellarError, Result};
use crate::record::{decode_varint, encode_varint};

pub use keys::{
    BUFFER_TABLE, CHUNK_TABLE, POSITION_TABLE, STATS_TABLE, USER_CHECKPOINT_TABLE,
};
pub use meta::{buffer_file_name, chunk_file_name, BufferMeta, ChunkMeta, LogStats, CHUNK_SUFFIX};

/// Index database file inside the log folder
pub const INDEX_FILE: &str = "cellar.redb";

const META: TableDefinition<&[u8], &[u8]> = TableDefinition::new("cellar");

type RawReadTable = ReadOnlyTable<&'static [u8], &'static [u8]>;
type RawWriteTable<'txn> = Table<'txn, &'static [u8], &'static [u8]>;

/// redb locks its file exclusively, so every handle to a folder's index in
/// this process shares one `Database`
static OPEN_INDEXES: Mutex<Vec<(PathBuf, Weak<Database>)>> = parking_lot::const_mutex(Vec::new());

/// Handle to a folder's metadata index; cheap to clone
#[derive(Clone)]
pub struct Index {
    db: Arc<Database>,
    path: PathBuf,
}

impl Index {
    /// Open (or create) the index of an existing log folder
    pub fn open(folder: &Path) -> Result<Self> {
        let folder = folder
            .canonicalize()
            .map_err(CellarError::io_at("resolve log folder", folder))?;

        let mut open = OPEN_INDEXES.lock();
        open.retain(|(_, db)| db.strong_count() > 0);

        let shared = open
            .iter()
            .find(|(path, _)| *path == folder)
            .and_then(|(_, db)| db.upgrade());

        let path = folder.join(INDEX_FILE);
        if let Some(db) = shared {
            return Ok(Self { db, path });
        }

        let db = Database::create(&path)?;

        // Create the table so read transactions never see it missing
        let txn = db.begin_write()?;
        txn.open_table(META)?;
        txn.commit()?;

        debug!(path = %path.display(), "Opened index");

        let db = Arc::new(db);
        open.push((folder, Arc::downgrade(&db)));
        Ok(Self { db, path })
    }

    /// Path of the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` against a consistent snapshot
    pub fn read<T>(&self, f: impl FnOnce(&ReadTxn<'_>) -> Result<T>) -> Result<T> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(META)?;
        f(&Txn {
            table,
            index_path: &self.path,
        })
    }

    /// Run `f` in a write transaction; commits if `f` succeeds, aborts otherwise
    pub fn update<T>(&self, f: impl FnOnce(&mut WriteTxn<'_>) -> Result<T>) -> Result<T> {
        let txn = self.db.begin_write()?;
        let result = {
            let table = txn.open_table(META)?;
            let mut tx = Txn {
                table,
                index_path: &self.path,
            };
            f(&mut tx)
        };

        match result {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                txn.abort()?;
                Err(e)
            }
        }
    }
}

/// A transaction over the metadata table
pub struct Txn<'a, T> {
    table: T,
    index_path: &'a Path,
}

/// Read-only snapshot
pub type ReadTxn<'a> = Txn<'a, RawReadTable>;

/// Pending atomic update
pub type WriteTxn<'a> = Txn<'a, RawWriteTable<'a>>;

impl<'a, T> Txn<'a, T>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.table.get(key)?.map(|v| v.value().to_vec()))
    }

    fn get_dto<D: DeserializeOwned>(&self, key: &[u8]) -> Result<Option<D>> {
        match self.get_raw(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_pos(&self, key: &[u8]) -> Result<Option<i64>> {
        match self.get_raw(key)? {
            Some(bytes) => {
                let (pos, _) = decode_varint(&bytes).map_err(|e| {
                    CellarError::corruption(self.index_path, format!("stored position: {}", e))
                })?;
                Ok(Some(pos))
            }
            None => Ok(None),
        }
    }

    /// Active buffer state, if the log has been initialized
    pub fn get_buffer(&self) -> Result<Option<BufferMeta>> {
        self.get_dto(&keys::buffer_key())
    }

    /// All sealed chunks in ascending start position
    pub fn list_chunks(&self) -> Result<Vec<ChunkMeta>> {
        let prefix = keys::chunk_prefix();
        let mut chunks = Vec::new();

        for entry in self.table.range(&prefix[..]..)? {
            let (key, value) = entry?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let chunk: ChunkMeta = bincode::deserialize(value.value())?;
            chunks.push(chunk);
        }

        Ok(chunks)
    }

    /// Aggregate statistics, if any were checkpointed
    pub fn get_stats(&self) -> Result<Option<LogStats>> {
        self.get_dto(&keys::stats_key())
    }

    /// Position recorded for `(stream, sequence)`
    pub fn lookup_position(&self, stream: &str, sequence: u64) -> Result<Option<i64>> {
        self.get_pos(&keys::position_key(stream, sequence))
    }

    /// Named user checkpoint; unset names read as 0
    pub fn get_user_checkpoint(&self, name: &str) -> Result<i64> {
        Ok(self.get_pos(&keys::user_checkpoint_key(name))?.unwrap_or(0))
    }
}

impl<'a> Txn<'a, RawWriteTable<'a>> {
    fn put_dto<D: Serialize>(&mut self, key: &[u8], dto: &D) -> Result<()> {
        let value = bincode::serialize(dto)?;
        self.table.insert(key, value.as_slice())?;
        Ok(())
    }

    fn put_pos(&mut self, key: &[u8], pos: i64) -> Result<()> {
        let mut value = BytesMut::with_capacity(crate::record::MAX_VARINT_LEN);
        encode_varint(&mut value, pos);
        self.table.insert(key, &value[..])?;
        Ok(())
    }

    pub fn put_buffer(&mut self, buffer: &BufferMeta) -> Result<()> {
        self.put_dto(&keys::buffer_key(), buffer)
    }

    pub fn add_chunk(&mut self, chunk: &ChunkMeta) -> Result<()> {
        self.put_dto(&keys::chunk_key(chunk.start_pos), chunk)?;
        debug!(
            file = %chunk.file_name,
            records = chunk.records,
            bytes = chunk.uncompressed_byte_size,
            "Added chunk"
        );
        Ok(())
    }

    pub fn put_stats(&mut self, stats: &LogStats) -> Result<()> {
        self.put_dto(&keys::stats_key(), stats)
    }

    pub fn index_position(&mut self, stream: &str, sequence: u64, pos: i64) -> Result<()> {
        self.put_pos(&keys::position_key(stream, sequence), pos)
    }

    pub fn put_user_checkpoint(&mut self, name: &str, pos: i64) -> Result<()> {
        self.put_pos(&keys::user_checkpoint_key(name), pos)
    }
}
