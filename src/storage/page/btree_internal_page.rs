use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

use crate::common::{IndexError, PageId, Result};
use crate::index::KeyComparator;

use super::btree_page::{
    internal_page_capacity, BTreePage, PageType, CHILD_SIZE, INTERNAL_HEADER_SIZE,
};

/// View over an internal page: `size` child pointers separated by `size - 1`
/// keys. Slot 0 carries a key that is never compared.
///
/// ```text
/// | header (24) | (unused) child 0 | key 1 child 1 | ... | key n-1 child n-1 |
/// ```
///
/// Every key in `child i` lies in `[key i, key i+1)`.
pub struct InternalPage<B> {
    page: BTreePage<B>,
}

impl<B> Deref for InternalPage<B> {
    type Target = BTreePage<B>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl<B> DerefMut for InternalPage<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl<B: AsRef<[u8]>> InternalPage<B> {
    pub fn new(data: B) -> Self {
        Self {
            page: BTreePage::new(data),
        }
    }

    fn entry_size(&self) -> usize {
        self.key_size() + CHILD_SIZE
    }

    fn entry_offset(&self, index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * self.entry_size()
    }

    fn entry_bytes(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.entry_size()]
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let offset = self.entry_offset(index);
        &self.bytes()[offset..offset + self.key_size()]
    }

    pub fn value_at(&self, index: usize) -> PageId {
        debug_assert!(index < self.size());
        PageId::new(self.read_u32(self.entry_offset(index) + self.key_size()))
    }

    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&index| self.value_at(index) == child)
    }

    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|index| self.value_at(index)).collect()
    }

    /// Child whose subtree may hold `key`.
    pub fn lookup<C: KeyComparator + ?Sized>(&self, key: &[u8], comparator: &C) -> PageId {
        // Largest i >= 1 with key_at(i) <= key, or 0.
        let mut left = 1;
        let mut right = self.size();

        while left < right {
            let mid = left + (right - left) / 2;
            if comparator.compare(self.key_at(mid), key) == Ordering::Greater {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        self.value_at(left - 1)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> InternalPage<B> {
    pub fn init(
        &mut self,
        page_id: PageId,
        parent_page_id: Option<PageId>,
        max_size: usize,
        key_size: usize,
    ) {
        self.init_header(PageType::Internal, page_id, parent_page_id, max_size, key_size);
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let offset = self.entry_offset(index);
        let key_size = self.key_size();
        self.bytes_mut()[offset..offset + key_size].copy_from_slice(key);
    }

    fn set_value_at(&mut self, index: usize, child: PageId) {
        let offset = self.entry_offset(index) + self.key_size();
        self.write_u32(offset, child.as_u32());
    }

    fn set_entry_bytes(&mut self, index: usize, entry: &[u8]) {
        let offset = self.entry_offset(index);
        self.bytes_mut()[offset..offset + entry.len()].copy_from_slice(entry);
    }

    fn shift_right(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(size < internal_page_capacity(self.key_size()), "internal page overflow");
        let from = self.entry_offset(index);
        let to = self.entry_offset(size);
        let step = self.entry_size();
        self.bytes_mut().copy_within(from..to, from + step);
    }

    fn shift_left(&mut self, index: usize) {
        let size = self.size();
        let from = self.entry_offset(index + 1);
        let to = self.entry_offset(size);
        let dest = self.entry_offset(index);
        self.bytes_mut().copy_within(from..to, dest);
    }

    /// Turns an empty page into a root with exactly two children.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &[u8], new_child: PageId) {
        self.set_value_at(0, old_child);
        self.set_key_at(1, key);
        self.set_value_at(1, new_child);
        self.set_size(2);
    }

    /// Inserts `(key, new_child)` right after the slot pointing at
    /// `old_child` and returns the new size.
    pub fn insert_node_after(
        &mut self,
        old_child: PageId,
        key: &[u8],
        new_child: PageId,
    ) -> Result<usize> {
        let index = self.value_index(old_child).ok_or_else(|| {
            IndexError::IndexCorrupted(format!(
                "page {} has no child {}",
                self.page_id(),
                old_child
            ))
        })?;

        let size = self.size();
        self.shift_right(index + 1);
        self.set_key_at(index + 1, key);
        self.set_value_at(index + 1, new_child);
        self.set_size(size + 1);
        Ok(size + 1)
    }

    pub fn remove(&mut self, index: usize) {
        let size = self.size();
        debug_assert!(index < size);
        self.shift_left(index);
        self.set_size(size - 1);
    }

    /// Empties a page with a single child and hands that child back.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        debug_assert_eq!(self.size(), 1);
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Moves the upper half of the children into an empty `recipient`.
    ///
    /// The key landing in the recipient's slot 0 is the separator to push up
    /// into the parent. Returns the moved children, whose parent pointers the
    /// caller must rewrite.
    pub fn move_half_to<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<R>,
    ) -> Vec<PageId> {
        debug_assert_eq!(recipient.size(), 0);
        let size = self.size();
        let split_at = size / 2;

        for (dest, index) in (split_at..size).enumerate() {
            recipient.set_entry_bytes(dest, self.entry_bytes(index));
        }
        recipient.set_size(size - split_at);
        self.set_size(split_at);

        recipient.children()
    }

    /// Appends all children to `recipient` (the left sibling). `middle_key`
    /// is the parent's separator for this page and becomes a real key.
    pub fn move_all_to<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<R>,
        middle_key: &[u8],
    ) -> Vec<PageId> {
        self.set_key_at(0, middle_key);

        let size = self.size();
        let base = recipient.size();
        for index in 0..size {
            recipient.set_entry_bytes(base + index, self.entry_bytes(index));
        }
        recipient.set_size(base + size);

        let moved = self.children();
        self.set_size(0);
        moved
    }

    /// Moves the first child to the end of `recipient` (the left sibling),
    /// pairing it with `middle_key`. Afterwards `key_at(0)` is the new
    /// separator for this page.
    pub fn move_first_to_end_of<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<R>,
        middle_key: &[u8],
    ) -> PageId {
        let child = self.value_at(0);
        let base = recipient.size();
        recipient.set_key_at(base, middle_key);
        recipient.set_value_at(base, child);
        recipient.set_size(base + 1);

        let size = self.size();
        self.shift_left(0);
        self.set_size(size - 1);
        child
    }

    /// Moves the last child to the front of `recipient` (the right sibling).
    /// `middle_key` becomes the key of the recipient's old first child and the
    /// recipient's `key_at(0)` is the new separator.
    pub fn move_last_to_front_of<R: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        recipient: &mut InternalPage<R>,
        middle_key: &[u8],
    ) -> PageId {
        let last = self.size() - 1;
        let child = self.value_at(last);

        let recipient_size = recipient.size();
        recipient.set_key_at(0, middle_key);
        recipient.shift_right(0);
        recipient.set_entry_bytes(0, self.entry_bytes(last));
        recipient.set_size(recipient_size + 1);

        self.set_size(last);
        child
    }
}
