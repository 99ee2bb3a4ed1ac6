pub mod heap_page;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

/// Addresses one fixed-size block in one table's file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageId {
    pub table_id: u32,
    pub page_number: u32,
}

/// Length of the on-wire form of a `PageId`.
pub const PAGE_ID_WIRE_SIZE: usize = 8;

impl PageId {
    pub fn new(table_id: u32, page_number: u32) -> Self {
        Self {
            table_id,
            page_number,
        }
    }

    /// Encodes as `(table_id, page_number)`, both big-endian 32-bit integers.
    pub fn serialize(&self) -> [u8; PAGE_ID_WIRE_SIZE] {
        let mut buf = [0u8; PAGE_ID_WIRE_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        // Writing into a fixed 8-byte buffer cannot run out of space.
        let _ = cursor.write_u32::<BigEndian>(self.table_id);
        let _ = cursor.write_u32::<BigEndian>(self.page_number);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> std::io::Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let table_id = cursor.read_u32::<BigEndian>()?;
        let page_number = cursor.read_u32::<BigEndian>()?;
        Ok(Self::new(table_id, page_number))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.table_id, self.page_number)
    }
}

pub use heap_page::{HeapPage, PageRef};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_page_id_equality_uses_both_fields() {
        assert_eq!(PageId::new(1, 2), PageId::new(1, 2));
        assert_ne!(PageId::new(1, 2), PageId::new(2, 1));
        assert_ne!(PageId::new(1, 2), PageId::new(1, 3));

        let set: HashSet<_> = [PageId::new(1, 2), PageId::new(1, 2), PageId::new(2, 2)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_wire_form() -> std::io::Result<()> {
        let pid = PageId::new(0x0102_0304, 7);
        let bytes = pid.serialize();
        assert_eq!(bytes, [1, 2, 3, 4, 0, 0, 0, 7]);
        assert_eq!(PageId::deserialize(&bytes)?, pid);
        Ok(())
    }

    #[test]
    fn test_page_id_short_input() {
        assert!(PageId::deserialize(&[0, 0, 0, 1]).is_err());
    }
}
