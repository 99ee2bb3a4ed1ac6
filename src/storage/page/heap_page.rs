use crate::access::{RecordId, Tuple, TupleDesc};
use crate::error::{DbError, DbResult};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use parking_lot::RwLock;
use std::sync::Arc;

/// A cached page shared between the buffer pool and its current user.
pub type PageRef = Arc<RwLock<HeapPage>>;

/// Slotted heap page.
///
/// Layout: a bitmap header of `ceil(slots / 8)` bytes (bit `i % 8` of byte
/// `i / 8` set iff slot `i` is occupied), then `slots` fixed-width tuple slots,
/// then zero padding up to the page size.
#[derive(Debug, Clone)]
pub struct HeapPage {
    page_id: PageId,
    desc: Arc<TupleDesc>,
    data: Vec<u8>,
    num_slots: usize,
    dirtier: Option<TransactionId>,
    old_data: Vec<u8>,
}

/// Most slots a page can have; slot numbers are stored as `u16`.
pub const MAX_SLOTS: usize = u16::MAX as usize + 1;

impl HeapPage {
    /// Number of tuples of `tuple_width` bytes that fit in a page, counting one header bit each.
    pub fn slots_per_page(page_size: usize, tuple_width: usize) -> usize {
        (page_size * 8) / (tuple_width * 8 + 1)
    }

    pub fn header_size(num_slots: usize) -> usize {
        num_slots.div_ceil(8)
    }

    /// An all-zero page image, i.e. a page with no occupied slots.
    pub fn empty_page_data(page_size: usize) -> Vec<u8> {
        vec![0u8; page_size]
    }

    /// Wraps a full page image. The image also becomes the page's before image.
    pub fn new(page_id: PageId, data: Vec<u8>, desc: Arc<TupleDesc>) -> DbResult<Self> {
        if desc.size() == 0 {
            return Err(DbError::InvalidSchema(
                "tuple layout has zero width".to_string(),
            ));
        }
        let num_slots = Self::slots_per_page(data.len(), desc.size());
        if num_slots == 0 {
            return Err(DbError::InvalidSchema(format!(
                "a {}-byte tuple does not fit in a {}-byte page",
                desc.size(),
                data.len()
            )));
        }
        if num_slots > MAX_SLOTS {
            return Err(DbError::InvalidSchema(format!(
                "a {}-byte page holds {} slots, more than {}",
                data.len(),
                num_slots,
                MAX_SLOTS
            )));
        }
        Ok(Self {
            page_id,
            desc,
            old_data: data.clone(),
            data,
            num_slots,
            dirtier: None,
        })
    }

    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Full byte image of the page, always exactly the page size.
    pub fn page_data(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots)
            .filter(|&slot| !self.is_slot_used(slot))
            .count()
    }

    pub fn is_slot_used(&self, slot: usize) -> bool {
        slot < self.num_slots && self.data[slot / 8] & (1 << (slot % 8)) != 0
    }

    fn set_slot(&mut self, slot: usize, used: bool) {
        let mask = 1u8 << (slot % 8);
        if used {
            self.data[slot / 8] |= mask;
        } else {
            self.data[slot / 8] &= !mask;
        }
    }

    fn slot_offset(&self, slot: usize) -> usize {
        Self::header_size(self.num_slots) + slot * self.desc.size()
    }

    /// Stores `tuple` in the first free slot and records its new location on it.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> DbResult<RecordId> {
        if tuple.tuple_desc().as_ref() != self.desc.as_ref() {
            return Err(DbError::SchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.tuple_desc().to_string(),
            });
        }
        let slot = (0..self.num_slots)
            .find(|&slot| !self.is_slot_used(slot))
            .ok_or(DbError::PageFull(self.page_id))?;

        let bytes = tuple.serialize()?;
        let offset = self.slot_offset(slot);
        self.data[offset..offset + bytes.len()].copy_from_slice(&bytes);
        self.set_slot(slot, true);

        let record_id = RecordId::new(self.page_id, slot as u16);
        tuple.set_record_id(Some(record_id));
        Ok(record_id)
    }

    /// Frees the tuple's slot. The slot bytes are left in place.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> DbResult<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id != self.page_id {
            return Err(DbError::PageNotFound(record_id.page_id));
        }
        let slot = record_id.slot as usize;
        if !self.is_slot_used(slot) {
            return Err(DbError::SlotEmpty { record_id });
        }
        self.set_slot(slot, false);
        Ok(())
    }

    /// The tuple stored in `slot`, if the slot is occupied.
    pub fn tuple(&self, slot: usize) -> DbResult<Option<Tuple>> {
        if !self.is_slot_used(slot) {
            return Ok(None);
        }
        let offset = self.slot_offset(slot);
        let bytes = &self.data[offset..offset + self.desc.size()];
        let mut tuple = Tuple::deserialize(self.desc.clone(), bytes)?;
        tuple.set_record_id(Some(RecordId::new(self.page_id, slot as u16)));
        Ok(Some(tuple))
    }

    /// Copies of every stored tuple in slot order.
    pub fn tuples(&self) -> DbResult<Vec<Tuple>> {
        let mut tuples = Vec::new();
        for slot in 0..self.num_slots {
            if let Some(tuple) = self.tuple(slot)? {
                tuples.push(tuple);
            }
        }
        Ok(tuples)
    }

    /// Sets (`Some`) or clears (`None`) the transaction that dirtied this page.
    pub fn mark_dirty(&mut self, dirtier: Option<TransactionId>) {
        self.dirtier = dirtier;
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirtier
    }

    /// The page as of its last clean state.
    pub fn before_image(&self) -> HeapPage {
        HeapPage {
            page_id: self.page_id,
            desc: self.desc.clone(),
            data: self.old_data.clone(),
            num_slots: self.num_slots,
            dirtier: None,
            old_data: self.old_data.clone(),
        }
    }

    /// Takes the current contents as the new before image.
    pub fn set_before_image(&mut self) {
        self.old_data = self.data.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};

    const PAGE_SIZE: usize = 4096;

    fn two_ints() -> Arc<TupleDesc> {
        Arc::new(TupleDesc::from_types(vec![DataType::Int32, DataType::Int32]))
    }

    fn empty_page(desc: Arc<TupleDesc>) -> DbResult<HeapPage> {
        HeapPage::new(
            PageId::new(1, 0),
            HeapPage::empty_page_data(PAGE_SIZE),
            desc,
        )
    }

    fn row(desc: &Arc<TupleDesc>, a: i32, b: i32) -> DbResult<Tuple> {
        Tuple::new(desc.clone(), vec![Value::Int32(a), Value::Int32(b)])
    }

    #[test]
    fn test_rejects_more_slots_than_record_ids_address() {
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Int32]));
        assert!(HeapPage::slots_per_page(300_000, 4) > MAX_SLOTS);
        let result = HeapPage::new(PageId::new(1, 0), HeapPage::empty_page_data(300_000), desc);
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn test_slot_count_for_two_ints() -> DbResult<()> {
        assert_eq!(HeapPage::slots_per_page(PAGE_SIZE, 8), 504);
        assert_eq!(HeapPage::header_size(504), 63);

        let page = empty_page(two_ints())?;
        assert_eq!(page.num_slots(), 504);
        assert_eq!(page.num_empty_slots(), 504);
        Ok(())
    }

    #[test]
    fn test_insert_and_read_back() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;

        let mut t1 = row(&desc, 1, 10)?;
        let mut t2 = row(&desc, 2, 20)?;
        let rid1 = page.insert_tuple(&mut t1)?;
        let rid2 = page.insert_tuple(&mut t2)?;

        assert_eq!(rid1.slot, 0);
        assert_eq!(rid2.slot, 1);
        assert_eq!(t1.record_id(), Some(rid1));
        assert_eq!(page.num_empty_slots(), 502);

        let tuples = page.tuples()?;
        assert_eq!(tuples, vec![t1, t2]);
        assert_eq!(tuples[1].record_id(), Some(rid2));
        Ok(())
    }

    #[test]
    fn test_header_bits_are_lsb_first() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        for i in 0..3 {
            page.insert_tuple(&mut row(&desc, i, i)?)?;
        }
        assert_eq!(page.data()[0], 0b0000_0111);

        // First slot starts right after the 63-byte header.
        assert_eq!(&page.data()[63..71], &[0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&page.data()[71..79], &[0, 0, 0, 1, 0, 0, 0, 1]);
        Ok(())
    }

    #[test]
    fn test_delete_frees_slot() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        let mut t = row(&desc, 7, 8)?;
        page.insert_tuple(&mut t)?;

        page.delete_tuple(&t)?;
        assert!(!page.is_slot_used(0));
        assert!(page.tuples()?.is_empty());

        // Deleting twice fails.
        assert!(matches!(
            page.delete_tuple(&t),
            Err(DbError::SlotEmpty { .. })
        ));

        // The freed slot is reused.
        let mut again = row(&desc, 9, 9)?;
        assert_eq!(page.insert_tuple(&mut again)?.slot, 0);
        Ok(())
    }

    #[test]
    fn test_delete_requires_record_id_on_this_page() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        let mut t = row(&desc, 1, 1)?;
        assert!(matches!(
            page.delete_tuple(&t),
            Err(DbError::MissingRecordId)
        ));

        t.set_record_id(Some(RecordId::new(PageId::new(1, 5), 0)));
        assert!(matches!(
            page.delete_tuple(&t),
            Err(DbError::PageNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_page_full() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        for i in 0..504 {
            page.insert_tuple(&mut row(&desc, i, i)?)?;
        }
        assert_eq!(page.num_empty_slots(), 0);
        assert!(matches!(
            page.insert_tuple(&mut row(&desc, 0, 0)?),
            Err(DbError::PageFull(_))
        ));
        Ok(())
    }

    #[test]
    fn test_schema_mismatch() -> DbResult<()> {
        let mut page = empty_page(two_ints())?;
        let other = Arc::new(TupleDesc::from_types(vec![DataType::Int32]));
        let mut t = Tuple::new(other, vec![Value::Int32(1)])?;
        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(DbError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_page_image_round_trips() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        page.insert_tuple(&mut row(&desc, 3, 4)?)?;

        let image = page.page_data();
        assert_eq!(image.len(), PAGE_SIZE);

        let reloaded = HeapPage::new(page.id(), image, desc)?;
        assert_eq!(reloaded.tuples()?, page.tuples()?);
        Ok(())
    }

    #[test]
    fn test_dirty_flag_and_before_image() -> DbResult<()> {
        let desc = two_ints();
        let mut page = empty_page(desc.clone())?;
        assert_eq!(page.is_dirty(), None);

        let tid = TransactionId::new(3);
        page.insert_tuple(&mut row(&desc, 1, 2)?)?;
        page.mark_dirty(Some(tid));
        assert_eq!(page.is_dirty(), Some(tid));

        // Before image still reflects the empty page.
        let before = page.before_image();
        assert!(before.tuples()?.is_empty());
        assert_eq!(before.is_dirty(), None);

        page.set_before_image();
        assert_eq!(page.before_image().tuples()?.len(), 1);

        page.mark_dirty(None);
        assert_eq!(page.is_dirty(), None);
        Ok(())
    }

    #[test]
    fn test_oversized_tuple_rejected() {
        let desc = Arc::new(TupleDesc::from_types(vec![DataType::Char(5000)]));
        let result = HeapPage::new(PageId::new(1, 0), HeapPage::empty_page_data(PAGE_SIZE), desc);
        assert!(result.is_err());
    }
}
