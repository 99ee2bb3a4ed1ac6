use super::replacer::Replacer;
use crate::storage::page::PageId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Cached pages, least recently used at front
    lru_list: VecDeque<PageId>,
    /// Map to track position in LRU list
    page_map: HashMap<PageId, usize>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lru_list: VecDeque::with_capacity(capacity),
            page_map: HashMap::with_capacity(capacity),
        }
    }

    fn update_indices(&mut self) {
        // Update all indices in the map after modification
        for (idx, &page_id) in self.lru_list.iter().enumerate() {
            self.page_map.insert(page_id, idx);
        }
    }
}

impl Replacer for LruReplacer {
    fn record_access(&mut self, page_id: PageId) {
        if let Some(&idx) = self.page_map.get(&page_id) {
            if idx + 1 == self.lru_list.len() {
                return;
            }
            self.lru_list.remove(idx);
            self.lru_list.push_back(page_id);
            self.update_indices();
        } else {
            self.lru_list.push_back(page_id);
            self.page_map.insert(page_id, self.lru_list.len() - 1);
        }
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(idx) = self.page_map.remove(&page_id) {
            self.lru_list.remove(idx);
            self.update_indices();
        }
    }

    fn candidates(&self) -> Vec<PageId> {
        self.lru_list.iter().copied().collect()
    }

    fn size(&self) -> usize {
        self.lru_list.len()
    }
}
