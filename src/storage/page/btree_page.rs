use crate::common::{min_size_for, PageId, PAGE_SIZE};

// Header shared by leaf and internal pages
const PAGE_TYPE_OFFSET: usize = 0;
const KEY_SIZE_OFFSET: usize = 2;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_PAGE_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 16;

/// Leaf-only: forward link of the leaf chain
pub(crate) const NEXT_PAGE_OFFSET: usize = 20;

pub(crate) const LEAF_HEADER_SIZE: usize = 24;
pub(crate) const INTERNAL_HEADER_SIZE: usize = 24;

pub(crate) const VALUE_SIZE: usize = 6; // RecordId
pub(crate) const CHILD_SIZE: usize = 4; // PageId

/// Number of (key, record id) slots a leaf page has room for.
pub fn leaf_page_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (key_size + VALUE_SIZE)
}

/// Number of (key, child) slots an internal page has room for.
pub fn internal_page_capacity(key_size: usize) -> usize {
    (PAGE_SIZE - INTERNAL_HEADER_SIZE) / (key_size + CHILD_SIZE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Invalid,
    Leaf,
    Internal,
}

impl PageType {
    fn from_u8(tag: u8) -> Self {
        match tag {
            1 => PageType::Leaf,
            2 => PageType::Internal,
            _ => PageType::Invalid,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PageType::Invalid => 0,
            PageType::Leaf => 1,
            PageType::Internal => 2,
        }
    }
}

/// View over the header every B+ tree page starts with.
///
/// The view borrows the page bytes from a guard: `BTreePage::new(guard.data())`
/// for reads, `BTreePage::new(guard.data_mut())` for writes.
pub struct BTreePage<B> {
    pub(crate) data: B,
}

impl<B: AsRef<[u8]>> BTreePage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        let bytes = &self.bytes()[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.bytes()[PAGE_TYPE_OFFSET])
    }

    pub fn is_leaf(&self) -> bool {
        self.page_type() == PageType::Leaf
    }

    pub fn key_size(&self) -> usize {
        let bytes = &self.bytes()[KEY_SIZE_OFFSET..KEY_SIZE_OFFSET + 2];
        u16::from_le_bytes([bytes[0], bytes[1]]) as usize
    }

    /// Pairs in a leaf, children in an internal page.
    pub fn size(&self) -> usize {
        self.read_u32(SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        self.read_u32(MAX_SIZE_OFFSET) as usize
    }

    pub fn min_size(&self) -> usize {
        min_size_for(self.max_size())
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(self.read_u32(PAGE_ID_OFFSET))
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        PageId::from_raw(self.read_u32(PARENT_PAGE_OFFSET))
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id().is_none()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BTreePage<B> {
    pub(crate) fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        self.bytes_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Clears the page and writes a fresh header.
    pub(crate) fn init_header(
        &mut self,
        page_type: PageType,
        page_id: PageId,
        parent_page_id: Option<PageId>,
        max_size: usize,
        key_size: usize,
    ) {
        self.bytes_mut().fill(0);
        self.bytes_mut()[PAGE_TYPE_OFFSET] = page_type.as_u8();
        self.bytes_mut()[KEY_SIZE_OFFSET..KEY_SIZE_OFFSET + 2]
            .copy_from_slice(&(key_size as u16).to_le_bytes());
        self.set_size(0);
        self.write_u32(MAX_SIZE_OFFSET, max_size as u32);
        self.write_u32(PAGE_ID_OFFSET, page_id.as_u32());
        self.set_parent_page_id(parent_page_id);
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.write_u32(SIZE_OFFSET, size as u32);
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: Option<PageId>) {
        self.write_u32(PARENT_PAGE_OFFSET, PageId::to_raw(parent_page_id));
    }
}
