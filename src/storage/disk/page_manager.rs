use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Reads and overwrites fixed-size pages of a single file.
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Creates (or truncates) the file at `path`.
    pub fn create(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens an existing file, creating it empty if it does not exist.
    pub fn open(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens a file that must already exist.
    pub fn open_existing(path: &Path, page_size: usize) -> DbResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file, page_size })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads exactly one page. Pages at or past the end of the file do not exist.
    pub fn read_page(&mut self, page_id: PageId, buf: &mut [u8]) -> DbResult<()> {
        if buf.len() != self.page_size {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "buffer size must be {} bytes, got {}",
                    self.page_size,
                    buf.len()
                ),
            )));
        }

        let offset = self.page_offset(page_id);
        let file_size = self.file.metadata()?.len();

        if offset >= file_size {
            return Err(DbError::PageNotFound(page_id));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        // The last page of a file written by another tool may be short.
        let available = ((file_size - offset) as usize).min(self.page_size);
        self.file.read_exact(&mut buf[..available])?;
        buf[available..].fill(0);

        Ok(())
    }

    /// Overwrites one page in place, extending the file if necessary.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> DbResult<()> {
        if data.len() != self.page_size {
            return Err(DbError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!(
                    "page image must be {} bytes, got {}",
                    self.page_size,
                    data.len()
                ),
            )));
        }

        let offset = self.page_offset(page_id);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;

        Ok(())
    }

    /// `ceil(file length / page size)`.
    pub fn num_pages(&self) -> DbResult<u32> {
        let file_size = self.file.metadata()?.len();
        Ok(file_size.div_ceil(self.page_size as u64) as u32)
    }

    /// Appends a zeroed page and returns its page number.
    pub fn allocate_page(&mut self, table_id: u32) -> DbResult<PageId> {
        let page_id = PageId::new(table_id, self.num_pages()?);
        let empty = vec![0u8; self.page_size];
        self.write_page(page_id, &empty)?;
        Ok(page_id)
    }

    fn page_offset(&self, page_id: PageId) -> u64 {
        page_id.page_number as u64 * self.page_size as u64
    }
}
