use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{PageId, RecordId, Result, StratumError};

use super::key::IndexKey;
use super::node::{LeafNodeRef, NodeRef, PageType};

/// Forward iterator over the leaf chain of a B+ tree.
///
/// Holds exactly one leaf pinned between calls; advancing across a leaf
/// boundary unpins the exhausted leaf before pinning its successor, and
/// dropping the iterator releases the pin.
pub struct TreeIterator<K: IndexKey> {
    bpm: Arc<BufferPoolManager>,
    leaf: Option<ReadPageGuard>,
    index: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> TreeIterator<K> {
    /// Builds an iterator at the given leaf position, or an exhausted one
    /// when `position` is None (the empty tree). Fails when the page is not
    /// a leaf.
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        position: Option<(PageId, usize)>,
    ) -> Result<Self> {
        let mut iterator = Self {
            bpm,
            leaf: None,
            index: 0,
            _key: PhantomData,
        };

        if let Some((page_id, index)) = position {
            let guard = iterator.bpm.read_page(page_id)?;
            if NodeRef::new(guard.data()).page_type()? != PageType::Leaf {
                return Err(StratumError::IndexCorrupted(format!(
                    "iterator built over non-leaf page {}",
                    page_id
                )));
            }
            iterator.leaf = Some(guard);
            iterator.index = index;
            iterator.skip_exhausted()?;
        }

        Ok(iterator)
    }

    /// True when no further entries remain.
    pub fn is_end(&self) -> bool {
        match &self.leaf {
            None => true,
            Some(guard) => {
                let leaf = LeafNodeRef::<K>::new(guard.data());
                self.index >= leaf.size() && leaf.next_page_id().is_none()
            }
        }
    }

    /// The entry at the current position, None past the end.
    pub fn entry(&self) -> Option<(K, RecordId)> {
        let guard = self.leaf.as_ref()?;
        let leaf = LeafNodeRef::<K>::new(guard.data());
        if self.index >= leaf.size() {
            return None;
        }
        Some((leaf.key_at(self.index), leaf.value_at(self.index)))
    }

    /// Steps to the next entry, hopping to the next leaf at a boundary.
    /// Parks past the last entry of the rightmost leaf.
    pub fn advance(&mut self) -> Result<()> {
        if self.leaf.is_none() {
            return Ok(());
        }
        self.index += 1;
        self.skip_exhausted()
    }

    /// Moves off an exhausted leaf onto its successor, releasing the pin on
    /// the old leaf before taking the new one.
    fn skip_exhausted(&mut self) -> Result<()> {
        loop {
            let Some(guard) = &self.leaf else {
                return Ok(());
            };
            let leaf = LeafNodeRef::<K>::new(guard.data());
            let size = leaf.size();

            if self.index < size {
                return Ok(());
            }

            match leaf.next_page_id() {
                None => {
                    // Rightmost leaf: park at the past-the-end position
                    self.index = size;
                    return Ok(());
                }
                Some(next_id) => {
                    self.leaf = None;
                    self.leaf = Some(self.bpm.read_page(next_id)?);
                    self.index = 0;
                }
            }
        }
    }
}

impl<K: IndexKey> Iterator for TreeIterator<K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.entry()?;
        match self.advance() {
            Ok(()) => Some(Ok(entry)),
            Err(e) => Some(Err(e)),
        }
    }
}
