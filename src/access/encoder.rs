use crate::access::{Tuple, TupleDesc};
use crate::error::{DbError, DbResult};
use crate::storage::disk::PageManager;
use crate::storage::page::{HeapPage, PageId};
use log::info;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

/// Builds heap files directly, without going through a buffer pool.
pub struct HeapFileEncoder;

impl HeapFileEncoder {
    /// Converts a delimited text file (one tuple per line) into a heap file.
    /// Returns the number of tuples written.
    pub fn convert(
        input: &Path,
        output: &Path,
        desc: Arc<TupleDesc>,
        page_size: usize,
        separator: char,
    ) -> DbResult<usize> {
        let reader = BufReader::new(File::open(input)?);
        let mut tuples = Vec::new();

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(separator).collect();
            if parts.len() != desc.num_fields() {
                return Err(DbError::InvalidSchema(format!(
                    "line {}: expected {} fields, found {}",
                    line_number + 1,
                    desc.num_fields(),
                    parts.len()
                )));
            }

            let values = parts
                .iter()
                .zip(desc.types())
                .map(|(text, data_type)| data_type.parse_value(text))
                .collect::<DbResult<Vec<_>>>()?;
            tuples.push(Tuple::new(desc.clone(), values)?);
        }

        let count = tuples.len();
        let pages = Self::write_tuples(output, desc, page_size, tuples)?;
        info!(
            "Converted {} tuples from {} into {} pages",
            count,
            input.display(),
            pages
        );
        Ok(count)
    }

    /// Packs `tuples` into consecutive full pages of a new file at `output`.
    /// Returns the number of pages written.
    pub fn write_tuples(
        output: &Path,
        desc: Arc<TupleDesc>,
        page_size: usize,
        tuples: impl IntoIterator<Item = Tuple>,
    ) -> DbResult<u32> {
        let mut pages = PageManager::create(output, page_size)?;
        // Table id is irrelevant on disk.
        let new_page = |page_number: u32| {
            HeapPage::new(
                PageId::new(0, page_number),
                HeapPage::empty_page_data(page_size),
                desc.clone(),
            )
        };

        let mut page = new_page(0)?;
        let mut empty = true;
        for mut tuple in tuples {
            match page.insert_tuple(&mut tuple) {
                Ok(_) => {}
                Err(DbError::PageFull(_)) => {
                    pages.write_page(page.id(), page.data())?;
                    page = new_page(page.id().page_number + 1)?;
                    page.insert_tuple(&mut tuple)?;
                }
                Err(e) => return Err(e),
            }
            empty = false;
        }

        if empty {
            return Ok(0);
        }
        pages.write_page(page.id(), page.data())?;
        Ok(page.id().page_number + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use tempfile::tempdir;

    #[test]
    fn test_convert_text_file() -> DbResult<()> {
        let dir = tempdir()?;
        let input = dir.path().join("people.txt");
        std::fs::write(&input, "1,alice\n2,bob\n\n3,carol\n")?;

        let desc = Arc::new(TupleDesc::from_types(vec![
            DataType::Int32,
            DataType::string(),
        ]));
        let output = dir.path().join("people.dat");
        let count = HeapFileEncoder::convert(&input, &output, desc.clone(), 4096, ',')?;
        assert_eq!(count, 3);

        let mut pages = PageManager::open(&output, 4096)?;
        assert_eq!(pages.num_pages()?, 1);
        let mut data = vec![0u8; 4096];
        pages.read_page(PageId::new(0, 0), &mut data)?;
        let page = HeapPage::new(PageId::new(0, 0), data, desc)?;
        let tuples = page.tuples()?;
        assert_eq!(tuples.len(), 3);
        assert_eq!(tuples[1].field(1), Some(&Value::String("bob".to_string())));
        Ok(())
    }

    #[test]
    fn test_convert_rejects_bad_lines() -> DbResult<()> {
        let dir = tempdir()?;
        let input = dir.path().join("bad.txt");
        std::fs::write(&input, "1,2\n3\n")?;
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32, DataType::Int32]));

        let result = HeapFileEncoder::convert(&input, &dir.path().join("bad.dat"), desc, 4096, ',');
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));
        Ok(())
    }

    #[test]
    fn test_write_tuples_fills_pages() -> DbResult<()> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32, DataType::Int32]));
        let tuples = (0..1009)
            .map(|i| Tuple::new(desc.clone(), vec![Value::Int32(i), Value::Int32(i)]))
            .collect::<DbResult<Vec<_>>>()?;

        let pages = HeapFileEncoder::write_tuples(&dir.path().join("t.dat"), desc, 4096, tuples)?;
        assert_eq!(pages, 3);
        Ok(())
    }

    #[test]
    fn test_empty_input_writes_no_pages() -> DbResult<()> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32]));
        let pages = HeapFileEncoder::write_tuples(&dir.path().join("t.dat"), desc, 4096, Vec::new())?;
        assert_eq!(pages, 0);
        Ok(())
    }
}
