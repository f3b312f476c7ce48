use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{PageId, RecordId, Result};
use crate::storage::page::LeafPage;

/// Forward cursor over the leaf chain.
///
/// No page stays pinned between calls; each step re-fetches the current leaf.
/// The tree must not be modified while a cursor is in use.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    current_page_id: Option<PageId>,
    current_index: usize,
}

impl BTreeIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, page_id: PageId, index: usize) -> Self {
        Self {
            bpm,
            current_page_id: Some(page_id),
            current_index: index,
        }
    }

    pub(crate) fn empty(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            current_page_id: None,
            current_index: 0,
        }
    }

    pub fn is_end(&self) -> bool {
        self.current_page_id.is_none()
    }

    fn advance(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        while let Some(page_id) = self.current_page_id {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let leaf = LeafPage::new(guard.data());

            if self.current_index < leaf.size() {
                let entry = (
                    leaf.key_at(self.current_index).to_vec(),
                    leaf.value_at(self.current_index),
                );
                self.current_index += 1;
                return Ok(Some(entry));
            }

            self.current_page_id = leaf.next_page_id();
            self.current_index = 0;
        }

        Ok(None)
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(Vec<u8>, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.current_page_id = None;
                Some(Err(e))
            }
        }
    }
}
