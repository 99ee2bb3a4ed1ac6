//! File-backed write-ahead log.
//!
//! Records are appended as a big-endian `u32` length followed by the bincode
//! encoding of a [`LogRecord`]. Rollback restores the before images a
//! transaction logged, newest first, so every page ends at its oldest image.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use parking_lot::Mutex;

use super::record::{LogPayload, LogRecord, LSN};
use super::WriteAheadLog;
use crate::catalog::Catalog;
use crate::error::DbResult;
use crate::storage::page::{HeapPage, PageId};
use crate::transaction::TransactionId;

struct LogState {
    writer: BufWriter<File>,
    next_lsn: LSN,
    /// Before images of pages written by unfinished transactions, oldest first.
    undo: HashMap<TransactionId, Vec<(PageId, Vec<u8>)>>,
    /// Transactions found unfinished when the log was opened.
    pending_recovery: Vec<TransactionId>,
    last_transaction_id: Option<TransactionId>,
}

pub struct FileLog {
    path: PathBuf,
    catalog: Arc<Catalog>,
    state: Mutex<LogState>,
}

impl FileLog {
    /// Opens the log at `path`, creating it if needed, and indexes any
    /// transactions left unfinished by a previous run.
    ///
    /// Their pages are not touched until [`FileLog::recover`] runs, which
    /// needs every affected table registered in `catalog`.
    pub fn open(path: &Path, catalog: Arc<Catalog>) -> DbResult<Self> {
        let records = if path.exists() {
            let (records, valid_len) = Self::scan(path)?;
            let file = OpenOptions::new().write(true).open(path)?;
            if file.metadata()?.len() > valid_len {
                warn!("Truncating torn record at the end of {}", path.display());
                file.set_len(valid_len)?;
            }
            records
        } else {
            Vec::new()
        };

        let mut next_lsn = LSN::new();
        let mut last_transaction_id = None;
        let mut undo: HashMap<TransactionId, Vec<(PageId, Vec<u8>)>> = HashMap::new();
        let mut order = Vec::new();
        for record in records {
            next_lsn = next_lsn.max(record.lsn.next());
            last_transaction_id = last_transaction_id.max(Some(record.transaction_id));
            let tid = record.transaction_id;
            match record.payload {
                LogPayload::Begin => {
                    undo.entry(tid).or_default();
                    order.push(tid);
                }
                LogPayload::Update { page_id, before, .. } => {
                    if !undo.contains_key(&tid) {
                        order.push(tid);
                    }
                    undo.entry(tid).or_default().push((page_id, before));
                }
                LogPayload::Commit | LogPayload::Abort => {
                    undo.remove(&tid);
                }
            }
        }
        let mut seen = HashSet::new();
        let pending_recovery: Vec<TransactionId> = order
            .into_iter()
            .filter(|tid| undo.contains_key(tid) && seen.insert(*tid))
            .collect();

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;

        debug!(
            "Opened log {} at {} with {} unfinished transactions",
            path.display(),
            next_lsn,
            pending_recovery.len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            catalog,
            state: Mutex::new(LogState {
                writer: BufWriter::new(file),
                next_lsn,
                undo,
                pending_recovery,
                last_transaction_id,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every complete record of a log file. A torn record at the end
    /// of the file is ignored.
    pub fn read_records(path: &Path) -> DbResult<Vec<LogRecord>> {
        Ok(Self::scan(path)?.0)
    }

    /// Complete records plus the byte length they occupy.
    fn scan(path: &Path) -> DbResult<(Vec<LogRecord>, u64)> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        let mut valid_len = 0u64;

        loop {
            let size = match reader.read_u32::<BigEndian>() {
                Ok(size) => size as usize,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            };

            let mut record_data = vec![0u8; size];
            match reader.read_exact(&mut record_data) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            records.push(LogRecord::deserialize(&record_data)?);
            valid_len += 4 + size as u64;
        }

        Ok((records, valid_len))
    }

    fn append(
        state: &mut LogState,
        build: impl FnOnce(LSN) -> LogRecord,
    ) -> DbResult<LSN> {
        let lsn = state.next_lsn;
        let record = build(lsn);
        let serialized = record.serialize()?;

        state.writer.write_u32::<BigEndian>(serialized.len() as u32)?;
        state.writer.write_all(&serialized)?;
        state.next_lsn = lsn.next();
        state.last_transaction_id = state.last_transaction_id.max(Some(record.transaction_id));
        Ok(lsn)
    }

    fn sync(state: &mut LogState) -> DbResult<()> {
        state.writer.flush()?;
        state.writer.get_ref().sync_data()?;
        Ok(())
    }

    fn rollback(&self, state: &mut LogState, tid: TransactionId) -> DbResult<Vec<PageId>> {
        let updates = state.undo.remove(&tid).unwrap_or_default();
        let mut restored = Vec::new();

        for (page_id, before) in updates.into_iter().rev() {
            let file = self.catalog.database_file(page_id.table_id)?;
            let page = HeapPage::new(page_id, before, file.tuple_desc().clone())?;
            file.write_page(&page)?;
            if !restored.contains(&page_id) {
                restored.push(page_id);
            }
        }

        Ok(restored)
    }
}

impl WriteAheadLog for FileLog {
    fn log_begin(&self, tid: TransactionId) -> DbResult<()> {
        let mut state = self.state.lock();
        Self::append(&mut state, |lsn| LogRecord::begin(lsn, tid))?;
        state.undo.entry(tid).or_default();
        Ok(())
    }

    fn log_write(&self, tid: TransactionId, before: &HeapPage, after: &HeapPage) -> DbResult<()> {
        let mut state = self.state.lock();
        let page_id = after.id();
        let before_data = before.page_data();
        Self::append(&mut state, |lsn| {
            LogRecord::update(lsn, tid, page_id, before_data.clone(), after.page_data())
        })?;
        state.undo.entry(tid).or_default().push((page_id, before_data));
        Ok(())
    }

    fn log_commit(&self, tid: TransactionId) -> DbResult<()> {
        let mut state = self.state.lock();
        Self::append(&mut state, |lsn| LogRecord::commit(lsn, tid))?;
        Self::sync(&mut state)?;
        state.undo.remove(&tid);
        Ok(())
    }

    fn log_abort(&self, tid: TransactionId) -> DbResult<Vec<PageId>> {
        let mut state = self.state.lock();
        let restored = self.rollback(&mut state, tid)?;
        Self::append(&mut state, |lsn| LogRecord::abort(lsn, tid))?;
        Self::sync(&mut state)?;
        if !restored.is_empty() {
            debug!("Rolled back {} pages of {}", restored.len(), tid);
        }
        Ok(restored)
    }

    fn force(&self) -> DbResult<()> {
        Self::sync(&mut self.state.lock())
    }

    fn last_transaction_id(&self) -> Option<TransactionId> {
        self.state.lock().last_transaction_id
    }

    /// Rolls back the transactions a previous run left unfinished and marks
    /// them aborted.
    fn recover(&self) -> DbResult<Vec<TransactionId>> {
        let mut state = self.state.lock();
        let pending = std::mem::take(&mut state.pending_recovery);
        for &tid in &pending {
            let restored = self.rollback(&mut state, tid)?;
            info!(
                "Recovery rolled back {} ({} pages restored)",
                tid,
                restored.len()
            );
            Self::append(&mut state, |lsn| LogRecord::abort(lsn, tid))?;
        }
        Self::sync(&mut state)?;
        Ok(pending)
    }
}
