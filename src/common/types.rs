use std::fmt;

/// Page identifier type - uniquely identifies a page on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Decodes a page id stored on a page, mapping the on-page sentinel to `None`.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if raw == u32::MAX {
            None
        } else {
            Some(Self(raw))
        }
    }

    /// Encodes an optional page id for storage on a page.
    pub fn to_raw(page_id: Option<PageId>) -> u32 {
        page_id.map(|p| p.0).unwrap_or(u32::MAX)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageId({})", self.0)
    }
}

/// Frame identifier type - identifies a buffer frame in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(pub u32);

impl FrameId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// Slot identifier within a heap page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u16);

impl SlotId {
    pub fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

/// Record identifier - the value stored against each key in a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_id: SlotId,
}

impl RecordId {
    /// Encoded width on a leaf page: page id (4) + slot id (2).
    pub const ENCODED_SIZE: usize = 6;

    pub fn new(page_id: PageId, slot_id: SlotId) -> Self {
        Self { page_id, slot_id }
    }

    /// Builds the positional record id used by the bulk loaders: the high
    /// 32 bits of the key select the page, the low 16 bits the slot.
    pub fn from_integer(key: i64) -> Self {
        let raw = key as u64;
        Self {
            page_id: PageId::new((raw >> 32) as u32),
            slot_id: SlotId::new(raw as u16),
        }
    }

    pub fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.page_id.as_u32().to_le_bytes());
        out[4..6].copy_from_slice(&self.slot_id.as_u16().to_le_bytes());
    }

    pub fn decode(bytes: &[u8]) -> Self {
        let page_id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let slot_id = u16::from_le_bytes([bytes[4], bytes[5]]);
        Self::new(PageId::new(page_id), SlotId::new(slot_id))
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.page_id.as_u32(), self.slot_id.as_u16())
    }
}

/// Timestamp type for LRU-K tracking
pub type Timestamp = u64;
