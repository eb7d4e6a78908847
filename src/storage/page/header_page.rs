use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of records one header page can hold
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

/// HeaderPage is the distinguished page (HEADER_PAGE_ID) that records, for
/// each index, the page id of its current root. Records are fixed width:
/// a nul-padded 32 byte name followed by the root page id. Every index
/// writes through this page whenever its root changes.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self) {
        self.data.fill(0);
    }

    fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        let bytes = (count as u32).to_le_bytes();
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4].copy_from_slice(&bytes);
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE;
        let name = &self.data[offset..offset + NAME_SIZE];
        let end = name.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
        &name[..end]
    }

    fn root_at(&self, index: usize) -> PageId {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        let bytes: [u8; 4] = self.data[offset..offset + 4].try_into().unwrap();
        PageId::new(u32::from_le_bytes(bytes))
    }

    fn set_root_at(&mut self, index: usize, root: PageId) {
        let offset = RECORDS_OFFSET + index * RECORD_SIZE + NAME_SIZE;
        self.data[offset..offset + 4].copy_from_slice(&root.as_u32().to_le_bytes());
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Adds a record for `name`. Returns false if the name is taken, too
    /// long, or the page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        let count = self.record_count();
        if name.len() >= NAME_SIZE || count >= MAX_HEADER_RECORDS {
            return false;
        }
        if self.find_record(name).is_some() {
            return false;
        }

        let offset = RECORDS_OFFSET + count * RECORD_SIZE;
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.set_root_at(count, root);
        self.set_record_count(count + 1);
        true
    }

    /// Rewrites the root recorded for `name`. Returns false if no such
    /// record exists.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                self.set_root_at(index, root);
                true
            }
            None => false,
        }
    }

    /// Drops the record for `name`, compacting the tail over it.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let count = self.record_count();
        match self.find_record(name) {
            Some(index) => {
                let start = RECORDS_OFFSET + (index + 1) * RECORD_SIZE;
                let end = RECORDS_OFFSET + count * RECORD_SIZE;
                let dest = RECORDS_OFFSET + index * RECORD_SIZE;
                self.data.copy_within(start..end, dest);
                self.set_record_count(count - 1);
                true
            }
            None => false,
        }
    }

    /// Looks up the recorded root for `name`.
    pub fn get_record(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|i| self.root_at(i))
    }
}

/// Read-only view of a header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        let bytes: [u8; 4] = self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .try_into()
            .unwrap();
        u32::from_le_bytes(bytes) as usize
    }

    pub fn get_record(&self, name: &str) -> Option<PageId> {
        for i in 0..self.record_count() {
            let offset = RECORDS_OFFSET + i * RECORD_SIZE;
            let stored = &self.data[offset..offset + NAME_SIZE];
            let end = stored.iter().position(|&b| b == 0).unwrap_or(NAME_SIZE);
            if &stored[..end] == name.as_bytes() {
                let bytes: [u8; 4] = self.data
                    [offset + NAME_SIZE..offset + NAME_SIZE + 4]
                    .try_into()
                    .unwrap();
                return Some(PageId::new(u32::from_le_bytes(bytes)));
            }
        }
        None
    }
}
