//! The header page lives at a fixed well-known page id and records the root
//! page of every index in the database: a count followed by fixed-width
//! `(index name, root page id)` records. A tree updates its record whenever
//! its root changes.

use crate::common::{PageId, Result, StratumError, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;

const NAME_LEN: usize = 32;
const RECORD_LEN: usize = NAME_LEN + 4;

pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_LEN;

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_LEN
}

fn encode_name(name: &str) -> Result<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > NAME_LEN {
        return Err(StratumError::InvalidIndexName(name.to_string()));
    }
    let mut padded = [0u8; NAME_LEN];
    padded[..bytes.len()].copy_from_slice(bytes);
    Ok(padded)
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        u32::from_le_bytes(
            self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
                .try_into()
                .expect("in-bounds read"),
        ) as usize
    }

    fn find(&self, name: &[u8; NAME_LEN]) -> Option<usize> {
        (0..self.record_count()).find(|&i| {
            let offset = record_offset(i);
            &self.data[offset..offset + NAME_LEN] == name
        })
    }

    /// Root page id recorded for the named index, which may be the invalid
    /// sentinel for an index that is currently empty.
    pub fn get_record(&self, name: &str) -> Result<Option<PageId>> {
        let name = encode_name(name)?;
        Ok(self.find(&name).map(|i| {
            let offset = record_offset(i) + NAME_LEN;
            PageId::new(u32::from_le_bytes(
                self.data[offset..offset + 4]
                    .try_into()
                    .expect("in-bounds read"),
            ))
        }))
    }
}

/// Mutable view of the header page.
pub struct HeaderPageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    fn as_ref(&self) -> HeaderPageRef<'_> {
        HeaderPageRef { data: self.data }
    }

    pub fn record_count(&self) -> usize {
        self.as_ref().record_count()
    }

    pub fn get_record(&self, name: &str) -> Result<Option<PageId>> {
        self.as_ref().get_record(name)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &[u8; NAME_LEN], root: PageId) {
        let offset = record_offset(index);
        self.data[offset..offset + NAME_LEN].copy_from_slice(name);
        self.data[offset + NAME_LEN..offset + RECORD_LEN]
            .copy_from_slice(&root.as_u32().to_le_bytes());
    }

    /// Adds a record for a new index. Fails when the name is taken or the
    /// page is out of record slots.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        if self.as_ref().find(&encoded).is_some() {
            return Err(StratumError::IndexAlreadyExists(name.to_string()));
        }

        let count = self.record_count();
        if count == MAX_HEADER_RECORDS {
            return Err(StratumError::HeaderPageFull);
        }

        self.write_record(count, &encoded, root);
        self.set_record_count(count + 1);
        Ok(())
    }

    /// Rewrites the root page id of an existing record.
    pub fn update_record(&mut self, name: &str, root: PageId) -> Result<()> {
        let encoded = encode_name(name)?;
        let index = self
            .as_ref()
            .find(&encoded)
            .ok_or_else(|| StratumError::IndexNotFound(name.to_string()))?;

        self.write_record(index, &encoded, root);
        Ok(())
    }
}
