use crate::common::{IndexError, PageId, Result, PAGE_SIZE};

const MAGIC_NUMBER: u32 = 0x4250_5452; // "BPTR"
const VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const RECORD_COUNT_OFFSET: usize = 8;
const RECORDS_OFFSET: usize = 12;

/// Longest index name a record can hold
pub const MAX_INDEX_NAME_LEN: usize = 32;
const RECORD_SIZE: usize = MAX_INDEX_NAME_LEN + 4; // name + root page id
const MAX_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// View over the header page: the catalog mapping index names to their root
/// page ids. An empty index keeps its record with the invalid page id.
pub struct HeaderPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> HeaderPage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }

    fn read_u32(&self, offset: usize) -> u32 {
        let bytes = &self.data.as_ref()[offset..offset + 4];
        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn is_valid(&self) -> bool {
        self.read_u32(MAGIC_OFFSET) == MAGIC_NUMBER && self.read_u32(VERSION_OFFSET) == VERSION
    }

    pub fn record_count(&self) -> usize {
        self.read_u32(RECORD_COUNT_OFFSET) as usize
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_OFFSET + index * RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = Self::record_offset(index);
        let name = &self.data.as_ref()[offset..offset + MAX_INDEX_NAME_LEN];
        let len = name.iter().position(|&b| b == 0).unwrap_or(MAX_INDEX_NAME_LEN);
        &name[..len]
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Returns the stored root page id for `name`, if the index is registered.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|index| {
            PageId::new(self.read_u32(Self::record_offset(index) + MAX_INDEX_NAME_LEN))
        })
    }

    /// Names of all registered indexes, in registration order.
    pub fn index_names(&self) -> Vec<String> {
        (0..self.record_count())
            .map(|i| String::from_utf8_lossy(self.name_at(i)).into_owned())
            .collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> HeaderPage<B> {
    pub fn init(&mut self) {
        self.data.as_mut().fill(0);
        self.write_u32(MAGIC_OFFSET, MAGIC_NUMBER);
        self.write_u32(VERSION_OFFSET, VERSION);
        self.write_u32(RECORD_COUNT_OFFSET, 0);
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.as_mut()[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn set_record(&mut self, index: usize, name: &str, root_page_id: PageId) {
        let offset = Self::record_offset(index);
        let slot = &mut self.data.as_mut()[offset..offset + MAX_INDEX_NAME_LEN];
        slot.fill(0);
        slot[..name.len()].copy_from_slice(name.as_bytes());
        self.write_u32(offset + MAX_INDEX_NAME_LEN, root_page_id.as_u32());
    }

    /// Registers a new index.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        check_name(name)?;
        if self.find_record(name).is_some() {
            return Err(IndexError::IndexAlreadyExists(name.to_string()));
        }

        let count = self.record_count();
        if count >= MAX_RECORDS {
            return Err(IndexError::HeaderFull);
        }

        self.set_record(count, name, root_page_id);
        self.write_u32(RECORD_COUNT_OFFSET, (count + 1) as u32);
        Ok(())
    }

    /// Points a registered index at a new root.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> Result<()> {
        let index = self
            .find_record(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        self.set_record(index, name, root_page_id);
        Ok(())
    }

    /// Unregisters an index, moving the last record into its slot.
    pub fn delete_record(&mut self, name: &str) -> Result<PageId> {
        let index = self
            .find_record(name)
            .ok_or_else(|| IndexError::IndexNotFound(name.to_string()))?;
        let root = PageId::new(self.read_u32(Self::record_offset(index) + MAX_INDEX_NAME_LEN));

        let last = self.record_count() - 1;
        if index != last {
            let from = Self::record_offset(last);
            let to = Self::record_offset(index);
            self.data
                .as_mut()
                .copy_within(from..from + RECORD_SIZE, to);
        }
        let from = Self::record_offset(last);
        self.data.as_mut()[from..from + RECORD_SIZE].fill(0);
        self.write_u32(RECORD_COUNT_OFFSET, last as u32);

        Ok(root)
    }
}

pub fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_INDEX_NAME_LEN || name.as_bytes().contains(&0) {
        return Err(IndexError::InvalidIndexName(name.to_string()));
    }
    Ok(())
}
