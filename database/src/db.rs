use crate::errors::{DbError, DbResult};
use parking_lot::RwLock;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use std::path::Path;
use std::sync::Arc;

pub const CF_HEADERS: &str = "headers";
pub const CF_INVALID: &str = "invalid";
pub const CF_BLOCKS: &str = "blocks";
pub const CF_UNDO: &str = "undo";
pub const CF_UTXO_TXS: &str = "utxo_txs";
pub const CF_UTXO_OUTPUTS: &str = "utxo_outputs";
pub const CF_METADATA: &str = "metadata";

const COLUMN_FAMILIES: [&str; 7] = [CF_HEADERS, CF_INVALID, CF_BLOCKS, CF_UNDO, CF_UTXO_TXS, CF_UTXO_OUTPUTS, CF_METADATA];

pub struct Database {
    db: Arc<DB>,
    is_closed: Arc<RwLock<bool>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(10000);
        opts.set_keep_log_file_num(10);
        opts.set_max_background_jobs(4);
        opts.increase_parallelism(4);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts.set_write_buffer_size(64 * 1024 * 1024);

        let cf_descriptors: Vec<_> =
            COLUMN_FAMILIES.iter().map(|name| ColumnFamilyDescriptor::new(*name, Options::default())).collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db), is_closed: Arc::new(RwLock::new(false)) })
    }

    fn check_closed(&self) -> DbResult<()> {
        if *self.is_closed.read() {
            return Err(DbError::DatabaseClosed);
        }
        Ok(())
    }

    pub(crate) fn cf(&self, cf_name: &str) -> DbResult<&ColumnFamily> {
        self.db.cf_handle(cf_name).ok_or_else(|| DbError::ColumnFamilyNotFound(cf_name.to_string()))
    }

    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> DbResult<()> {
        self.check_closed()?;
        self.db.put_cf(self.cf(cf_name)?, key, value)?;
        Ok(())
    }

    pub fn get(&self, cf_name: &str, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        self.check_closed()?;
        Ok(self.db.get_cf(self.cf(cf_name)?, key)?)
    }

    pub fn delete(&self, cf_name: &str, key: &[u8]) -> DbResult<()> {
        self.check_closed()?;
        self.db.delete_cf(self.cf(cf_name)?, key)?;
        Ok(())
    }

    pub fn exists(&self, cf_name: &str, key: &[u8]) -> DbResult<bool> {
        self.check_closed()?;
        Ok(self.db.get_pinned_cf(self.cf(cf_name)?, key)?.is_some())
    }

    pub fn batch(&self) -> WriteBatch {
        WriteBatch::default()
    }

    pub fn write_batch(&self, batch: WriteBatch) -> DbResult<()> {
        self.check_closed()?;
        self.db.write(batch)?;
        Ok(())
    }

    /// Every key-value pair of a column family, in key order.
    pub fn entries(&self, cf_name: &str) -> DbResult<Vec<(Box<[u8]>, Box<[u8]>)>> {
        self.check_closed()?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            entries.push(item?);
        }
        Ok(entries)
    }

    pub fn close(&self) {
        *self.is_closed.write() = true;
    }

    pub fn compact(&self, cf_name: &str) -> DbResult<()> {
        self.db.compact_range_cf(self.cf(cf_name)?, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), is_closed: self.is_closed.clone() }
    }
}
