use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use crate::common::{PageId, RecordId};
use crate::index::KeyComparator;

use super::btree_page::{
    leaf_page_capacity, BTreePage, PageType, LEAF_HEADER_SIZE, NEXT_PAGE_OFFSET, VALUE_SIZE,
};

/// View over a leaf page: sorted `(key, RecordId)` pairs plus the link to the
/// next leaf in key order.
///
/// Entries are fixed-width and packed right after the header:
///
/// ```text
/// | header (24) | key 0 | rid 0 | key 1 | rid 1 | ... |
/// ```
pub struct LeafPage<B> {
    page: BTreePage<B>,
}

impl<B> Deref for LeafPage<B> {
    type Target = BTreePage<B>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl<B> DerefMut for LeafPage<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl<B: AsRef<[u8]>> LeafPage<B> {
    pub fn new(data: B) -> Self {
        Self {
            page: BTreePage::new(data),
        }
    }

    fn entry_size(&self) -> usize {
        self.key_size() + VALUE_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        LEAF_HEADER_SIZE + index * self.entry_size()
    }

    fn entry_bytes(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.entry_size()]
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        PageId::from_raw(self.read_u32(NEXT_PAGE_OFFSET))
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        debug_assert!(index < self.size());
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> RecordId {
        debug_assert!(index < self.size());
        let offset = self.entry_offset(index) + self.key_size();
        RecordId::decode(&self.bytes()[offset..offset + VALUE_SIZE])
    }

    /// Index of the first key not less than `key` (`size()` if none).
    pub fn key_index<C: KeyComparator + ?Sized>(&self, key: &[u8], comparator: &C) -> usize {
        let mut left = 0;
        let mut right = self.size();

        while left < right {
            let mid = left + (right - left) / 2;
            if comparator.compare(self.key_at(mid), key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }

        left
    }

    pub fn lookup<C: KeyComparator + ?Sized>(&self, key: &[u8], comparator: &C) -> Option<RecordId> {
        let index = self.key_index(key, comparator);
        if index < self.size() && comparator.compare(self.key_at(index), key) == Ordering::Equal {
            Some(self.value_at(index))
        } else {
            None
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> LeafPage<B> {
    pub fn init(
        &mut self,
        page_id: PageId,
        parent_page_id: Option<PageId>,
        max_size: usize,
        key_size: usize,
    ) {
        self.init_header(PageType::Leaf, page_id, parent_page_id, max_size, key_size);
        self.set_next_page_id(None);
    }

    pub fn set_next_page_id(&mut self, next_page_id: Option<PageId>) {
        self.write_u32(NEXT_PAGE_OFFSET, PageId::to_raw(next_page_id));
    }

    fn set_entry_bytes(&mut self, index: usize, entry: &[u8]) {
        let offset = self.entry_offset(index);
        self.bytes_mut()[offset..offset + entry.len()].copy_from_slice(entry);
    }

    fn write_entry(&mut self, index: usize, key: &[u8], value: RecordId) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        let bytes = self.bytes_mut();
        bytes[offset..offset + key_size].copy_from_slice(key);
        value.encode(&mut bytes[offset + key_size..offset + key_size + VALUE_SIZE]);
    }

    /// Opens a hole at `index` by moving entries `index..size` up one slot.
    fn shift_right(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(size < leaf_page_capacity(self.key_size()), "leaf page overflow");
        let from = self.entry_offset(index);
        let to = self.entry_offset(size);
        let step = self.entry_size();
        self.bytes_mut().copy_within(from..to, from + step);
    }

    /// Closes the slot at `index` by moving entries `index+1..size` down one.
    fn shift_left(&mut self, index: usize) {
        let size = self.size();
        let from = self.entry_offset(index + 1);
        let to = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(from..to, dest);
    }

    /// Inserts keeping keys sorted and returns the new size. A key that is
    /// already present leaves the page untouched and its size unchanged.
    pub fn insert<C: KeyComparator + ?Sized>(
        &mut self,
        key: &[u8],
        value: RecordId,
        comparator: &C,
    ) -> usize {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index < size && comparator.compare(self.key_at(index), key) == Ordering::Equal {
            return size;
        }

        self.shift_right(index);
        self.write_entry(index, key, value);
        self.set_size(size + 1);
        size + 1
    }

    /// Removes `key` if present and returns the resulting size.
    pub fn remove_and_delete_record<C: KeyComparator + ?Sized>(
        &mut self,
        key: &[u8],
        comparator: &C,
    ) -> usize {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index >= size || comparator.compare(self.key_at(index), key) != Ordering::Equal {
            return size;
        }

        self.shift_left(index);
        self.set_size(size - 1);
        size - 1
    }

    /// Moves the upper half of the entries into an empty `recipient` and
    /// splices it into the leaf chain right after this page.
    pub fn move_half_to<R: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<R>) {
        debug_assert_eq!(recipient.size(), 0);
        let size = self.size();
        let split_at = size / 2;

        for (dest, index) in (split_at..size).enumerate() {
            recipient.set_entry_bytes(dest, self.entry_bytes(index));
        }
        recipient.set_size(size - split_at);
        self.set_size(split_at);

        recipient.set_next_page_id(self.next_page_id());
        self.set_next_page_id(Some(recipient.page_id()));
    }

    /// Appends every entry to `recipient` (the left sibling) and unlinks this
    /// page from the leaf chain.
    pub fn move_all_to<R: AsRef<[u8]> + AsMut<[u8]>>(&mut self, recipient: &mut LeafPage<R>) {
        let size = self.size();
        let base = recipient.size();

        for index in 0..size {
            recipient.set_entry_bytes(base + index, self.entry_bytes(index));
        }
        recipient.set_size(base + size);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves this page's first entry to the end of `recipient` (the left sibling).
    pub fn move_first_to_end_of<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut LeafPage<R>,
    ) {
        let base = recipient.size();
        recipient.set_entry_bytes(base, self.entry_bytes(0));
        recipient.set_size(base + 1);

        let size = self.size();
        self.shift_left(0);
        self.set_size(size - 1);
    }

    /// Moves this page's last entry to the front of `recipient` (the right sibling).
    pub fn move_last_to_front_of<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut LeafPage<R>,
    ) {
        let last = self.size() - 1;
        let recipient_size = recipient.size();
        recipient.shift_right(0);
        recipient.set_entry_bytes(0, self.entry_bytes(last));
        recipient.set_size(recipient_size + 1);
        self.set_size(last);
    }
}
