use std::marker::PhantomData;
use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{
    PageId, RecordId, Result, StratumError, Transaction, HEADER_PAGE_ID, INVALID_PAGE_ID,
    PAGE_SIZE,
};

use super::header_page::{HeaderPageMut, HeaderPageRef};
use super::iterator::TreeIterator;
use super::key::IndexKey;
use super::node::{
    InternalNodeMut, InternalNodeRef, LeafNodeMut, LeafNodeRef, NodeMut, NodeRef, PageType,
    CHILD_ID_LEN, COMMON_HEADER_LEN, LEAF_HEADER_LEN, RECORD_ID_LEN,
};

/// A disk-resident B+ tree index over a totally ordered key type.
///
/// All node data lives on buffer-pool pages; the tree touches pages only
/// through pinned guards and keeps an in-memory mirror of the root page id,
/// persisted in the header page whenever the root changes. Keys are unique;
/// leaves are chained for forward range scans.
///
/// Tree operations are single-threaded: each call must complete before the
/// next begins. The buffer pool underneath is thread-safe.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: u16,
    internal_max_size: u16,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    /// Opens (or registers) the named index with fan-outs derived from the
    /// page size.
    pub fn new(name: &str, bpm: Arc<BufferPoolManager>) -> Result<Self> {
        let leaf_max = (PAGE_SIZE - LEAF_HEADER_LEN) / (K::ENCODED_LEN + RECORD_ID_LEN);
        // One slot of slack so the overflowing insert fits before the split
        let internal_max = (PAGE_SIZE - COMMON_HEADER_LEN) / (K::ENCODED_LEN + CHILD_ID_LEN) - 1;
        Self::with_max_sizes(name, bpm, leaf_max as u16, internal_max as u16)
    }

    /// Opens (or registers) the named index with explicit fan-outs. The
    /// root page id is loaded from the header page, so an index survives
    /// process restarts.
    pub fn with_max_sizes(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: u16,
        internal_max_size: u16,
    ) -> Result<Self> {
        assert!(leaf_max_size >= 2, "leaf fan-out too small");
        assert!(internal_max_size >= 4, "internal fan-out too small");
        assert!(
            LEAF_HEADER_LEN + leaf_max_size as usize * (K::ENCODED_LEN + RECORD_ID_LEN)
                <= PAGE_SIZE,
            "leaf fan-out exceeds page capacity"
        );
        assert!(
            COMMON_HEADER_LEN
                + (internal_max_size as usize + 1) * (K::ENCODED_LEN + CHILD_ID_LEN)
                <= PAGE_SIZE,
            "internal fan-out exceeds page capacity"
        );

        let existing = {
            let guard = bpm.read_page(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data()).get_record(name)?
        };

        let root_page_id = match existing {
            Some(root) => root,
            None => {
                let mut guard = bpm.write_page(HEADER_PAGE_ID)?;
                HeaderPageMut::new(guard.data_mut()).insert_record(name, INVALID_PAGE_ID)?;
                INVALID_PAGE_ID
            }
        };

        Ok(Self {
            index_name: name.to_string(),
            root_page_id,
            bpm,
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Point lookup. Pushes the value for `key` onto `result` and returns
    /// true when the key exists.
    pub fn get(
        &self,
        key: &K,
        result: &mut Vec<RecordId>,
        _transaction: Option<&Transaction>,
    ) -> Result<bool> {
        if self.is_empty() {
            return Ok(false);
        }

        let leaf_id = self.find_leaf(key)?;
        let guard = self.bpm.read_page(leaf_id)?;
        let leaf = LeafNodeRef::<K>::new(guard.data());

        match leaf.lookup(key) {
            Some(record_id) => {
                result.push(record_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Inserts a key/value pair. Returns false when the key already exists;
    /// the tree is unchanged in that case.
    pub fn insert(
        &mut self,
        key: K,
        value: RecordId,
        _transaction: Option<&Transaction>,
    ) -> Result<bool> {
        if self.is_empty() {
            self.start_new_tree(&key, value)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(&key)?;

        {
            let guard = self.bpm.read_page(leaf_id)?;
            let leaf = LeafNodeRef::<K>::new(guard.data());
            if leaf.lookup(&key).is_some() {
                return Ok(false);
            }
        }

        let needs_split = {
            let mut guard = self.bpm.write_page(leaf_id)?;
            let mut leaf = LeafNodeMut::<K>::new(guard.data_mut());
            leaf.insert(&key, value);
            leaf.size() == leaf.max_size()
        };

        if needs_split {
            self.split_leaf(leaf_id)?;
        }

        Ok(true)
    }

    /// Removes the entry for `key`. A no-op when the key is absent.
    pub fn remove(&mut self, key: &K, _transaction: Option<&Transaction>) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let leaf_id = self.find_leaf(key)?;

        {
            let guard = self.bpm.read_page(leaf_id)?;
            let leaf = LeafNodeRef::<K>::new(guard.data());
            if leaf.lookup(key).is_none() {
                return Ok(());
            }
        }

        let (size, min_size, is_root) = {
            let mut guard = self.bpm.write_page(leaf_id)?;
            let mut leaf = LeafNodeMut::<K>::new(guard.data_mut());
            leaf.remove(key);
            (leaf.size(), leaf.min_size(), leaf.parent_page_id().is_none())
        };

        if is_root {
            if size == 0 {
                // The last entry of the whole tree is gone
                self.bpm.delete_page(leaf_id)?;
                self.root_page_id = INVALID_PAGE_ID;
                self.update_header_root()?;
            }
            return Ok(());
        }

        if size < min_size {
            self.handle_leaf_underflow(leaf_id)?;
        }

        Ok(())
    }

    /// Iterator positioned at the first entry of the leftmost leaf.
    pub fn begin(&self) -> Result<TreeIterator<K>> {
        if self.is_empty() {
            return TreeIterator::new(Arc::clone(&self.bpm), None);
        }
        let leaf_id = self.find_edge_leaf(false)?;
        TreeIterator::new(Arc::clone(&self.bpm), Some((leaf_id, 0)))
    }

    /// Iterator positioned at the smallest entry with key >= `key`.
    pub fn begin_at(&self, key: &K) -> Result<TreeIterator<K>> {
        if self.is_empty() {
            return TreeIterator::new(Arc::clone(&self.bpm), None);
        }

        let leaf_id = self.find_leaf(key)?;
        let index = {
            let guard = self.bpm.read_page(leaf_id)?;
            LeafNodeRef::<K>::new(guard.data()).lower_bound(key)
        };
        TreeIterator::new(Arc::clone(&self.bpm), Some((leaf_id, index)))
    }

    /// Iterator positioned past the last entry of the rightmost leaf.
    pub fn end(&self) -> Result<TreeIterator<K>> {
        if self.is_empty() {
            return TreeIterator::new(Arc::clone(&self.bpm), None);
        }

        let leaf_id = self.find_edge_leaf(true)?;
        let size = {
            let guard = self.bpm.read_page(leaf_id)?;
            LeafNodeRef::<K>::new(guard.data()).size()
        };
        TreeIterator::new(Arc::clone(&self.bpm), Some((leaf_id, size)))
    }

    fn start_new_tree(&mut self, key: &K, value: RecordId) -> Result<()> {
        let root_id = self.bpm.new_page()?;

        {
            let mut guard = self.bpm.write_page(root_id)?;
            let mut leaf = LeafNodeMut::<K>::new(guard.data_mut());
            leaf.init(root_id, None, self.leaf_max_size);
            leaf.insert(key, value);
        }

        self.root_page_id = root_id;
        self.update_header_root()
    }

    /// Descends from the root to the leaf whose key range contains `key`.
    fn find_leaf(&self, key: &K) -> Result<PageId> {
        let mut page_id = self.root_page_id;

        loop {
            let child = {
                let guard = self.bpm.read_page(page_id)?;
                let node = NodeRef::new(guard.data());
                if node.page_type()? == PageType::Leaf {
                    return Ok(page_id);
                }
                InternalNodeRef::<K>::new(guard.data()).lookup(key)
            };
            page_id = child;
        }
    }

    /// Descends to the leftmost (`rightmost == false`) or rightmost leaf.
    fn find_edge_leaf(&self, rightmost: bool) -> Result<PageId> {
        let mut page_id = self.root_page_id;

        loop {
            let child = {
                let guard = self.bpm.read_page(page_id)?;
                let node = NodeRef::new(guard.data());
                if node.page_type()? == PageType::Leaf {
                    return Ok(page_id);
                }
                let internal = InternalNodeRef::<K>::new(guard.data());
                if rightmost {
                    internal.value_at(internal.size() - 1)
                } else {
                    internal.value_at(0)
                }
            };
            page_id = child;
        }
    }

    /// Splits a full leaf: the upper half moves to a fresh right sibling
    /// spliced into the chain, and the separator is pushed to the parent.
    fn split_leaf(&mut self, leaf_id: PageId) -> Result<()> {
        let right_id = self.bpm.new_page()?;

        let (separator, parent_id) = {
            let mut left_guard = self.bpm.write_page(leaf_id)?;
            let mut right_guard = self.bpm.write_page(right_id)?;
            let mut left = LeafNodeMut::<K>::new(left_guard.data_mut());
            let mut right = LeafNodeMut::<K>::new(right_guard.data_mut());

            let parent_id = left.parent_page_id();
            right.init(right_id, parent_id, self.leaf_max_size);

            let separator = left.split_to(&mut right);
            right.set_next_page_id(left.next_page_id());
            left.set_next_page_id(Some(right_id));

            (separator, parent_id)
        };

        self.insert_into_parent(leaf_id, separator, right_id, parent_id)
    }

    /// Splits an overfull internal node, re-parenting the children that
    /// move to the new right sibling.
    fn split_internal(&mut self, page_id: PageId) -> Result<()> {
        let right_id = self.bpm.new_page()?;

        let (separator, parent_id, moved_children) = {
            let mut left_guard = self.bpm.write_page(page_id)?;
            let mut right_guard = self.bpm.write_page(right_id)?;
            let mut left = InternalNodeMut::<K>::new(left_guard.data_mut());
            let mut right = InternalNodeMut::<K>::new(right_guard.data_mut());

            let parent_id = left.parent_page_id();
            right.init(right_id, parent_id, self.internal_max_size);

            let (separator, moved) = left.split_to(&mut right);
            (separator, parent_id, moved)
        };

        for child_id in moved_children {
            self.set_parent(child_id, Some(right_id))?;
        }

        self.insert_into_parent(page_id, separator, right_id, parent_id)
    }

    /// Links a freshly split-off `right_id` under the parent of `left_id`,
    /// growing a new root when the split reached the top.
    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        key: K,
        right_id: PageId,
        parent_id: Option<PageId>,
    ) -> Result<()> {
        let Some(parent_id) = parent_id else {
            let root_id = self.bpm.new_page()?;

            {
                let mut guard = self.bpm.write_page(root_id)?;
                let mut root = InternalNodeMut::<K>::new(guard.data_mut());
                root.init(root_id, None, self.internal_max_size);
                root.populate_new_root(left_id, &key, right_id);
            }

            self.set_parent(left_id, Some(root_id))?;
            self.set_parent(right_id, Some(root_id))?;

            self.root_page_id = root_id;
            return self.update_header_root();
        };

        let needs_split = {
            let mut guard = self.bpm.write_page(parent_id)?;
            let mut parent = InternalNodeMut::<K>::new(guard.data_mut());
            parent.insert_node_after(left_id, &key, right_id)?;
            parent.size() > parent.max_size()
        };

        if needs_split {
            self.split_internal(parent_id)?;
        }

        Ok(())
    }

    /// Rewrites a node's parent back-reference.
    fn set_parent(&self, page_id: PageId, parent: Option<PageId>) -> Result<()> {
        let mut guard = self.bpm.write_page(page_id)?;
        NodeMut::new(guard.data_mut()).set_parent_page_id(parent);
        Ok(())
    }

    /// Parent id of a non-root node.
    fn parent_of(&self, page_id: PageId) -> Result<PageId> {
        let guard = self.bpm.read_page(page_id)?;
        NodeRef::new(guard.data()).parent_page_id().ok_or_else(|| {
            StratumError::IndexCorrupted(format!("page {} has no parent", page_id))
        })
    }

    /// Picks the sibling to rebalance with: the left neighbor under the
    /// same parent, or the right neighbor when the node is its parent's
    /// first child. Returns (node's slot, sibling page id).
    fn pick_sibling(&self, parent_id: PageId, page_id: PageId) -> Result<(usize, PageId)> {
        let guard = self.bpm.read_page(parent_id)?;
        let parent = InternalNodeRef::<K>::new(guard.data());

        let index = parent.value_index(page_id).ok_or_else(|| {
            StratumError::IndexCorrupted(format!(
                "page {} missing from its parent {}",
                page_id, parent_id
            ))
        })?;

        if index == 0 {
            Ok((0, parent.value_at(1)))
        } else {
            Ok((index, parent.value_at(index - 1)))
        }
    }

    /// Rebalances an underflowing leaf by merging with or borrowing from a
    /// same-parent sibling.
    fn handle_leaf_underflow(&mut self, page_id: PageId) -> Result<()> {
        let parent_id = self.parent_of(page_id)?;
        let (node_index, sibling_id) = self.pick_sibling(parent_id, page_id)?;

        // Orient the pair left-to-right; right_index is the parent slot of
        // the right node, whose entry disappears on a merge.
        let (left_id, right_id, right_index) = if node_index == 0 {
            (page_id, sibling_id, 1)
        } else {
            (sibling_id, page_id, node_index)
        };

        let (left_size, right_size, max_size) = {
            let left_guard = self.bpm.read_page(left_id)?;
            let right_guard = self.bpm.read_page(right_id)?;
            let left = LeafNodeRef::<K>::new(left_guard.data());
            let right = LeafNodeRef::<K>::new(right_guard.data());
            (left.size(), right.size(), left.max_size())
        };

        if left_size + right_size <= max_size {
            // Coalesce into the left node and drop the right one
            {
                let mut left_guard = self.bpm.write_page(left_id)?;
                let mut right_guard = self.bpm.write_page(right_id)?;
                let mut left = LeafNodeMut::<K>::new(left_guard.data_mut());
                let mut right = LeafNodeMut::<K>::new(right_guard.data_mut());

                let next = right.next_page_id();
                right.move_all_to(&mut left);
                left.set_next_page_id(next);
            }

            self.bpm.delete_page(right_id)?;
            self.remove_parent_entry(parent_id, right_index)
        } else if node_index == 0 {
            // Borrow the right sibling's first entry
            let new_separator = {
                let mut node_guard = self.bpm.write_page(page_id)?;
                let mut sibling_guard = self.bpm.write_page(sibling_id)?;
                let mut node = LeafNodeMut::<K>::new(node_guard.data_mut());
                let mut sibling = LeafNodeMut::<K>::new(sibling_guard.data_mut());

                sibling.move_first_to_end_of(&mut node);
                sibling.key_at(0)
            };

            let mut guard = self.bpm.write_page(parent_id)?;
            InternalNodeMut::<K>::new(guard.data_mut()).set_key_at(1, &new_separator);
            Ok(())
        } else {
            // Borrow the left sibling's last entry
            let new_separator = {
                let mut node_guard = self.bpm.write_page(page_id)?;
                let mut sibling_guard = self.bpm.write_page(sibling_id)?;
                let mut node = LeafNodeMut::<K>::new(node_guard.data_mut());
                let mut sibling = LeafNodeMut::<K>::new(sibling_guard.data_mut());

                sibling.move_last_to_front_of(&mut node);
                node.key_at(0)
            };

            let mut guard = self.bpm.write_page(parent_id)?;
            InternalNodeMut::<K>::new(guard.data_mut()).set_key_at(node_index, &new_separator);
            Ok(())
        }
    }

    /// Rebalances an underflowing internal node. The parent separator is
    /// pulled down on a merge and rotated on a redistribution.
    fn handle_internal_underflow(&mut self, page_id: PageId) -> Result<()> {
        let parent_id = self.parent_of(page_id)?;
        let (node_index, sibling_id) = self.pick_sibling(parent_id, page_id)?;

        let (left_id, right_id, right_index) = if node_index == 0 {
            (page_id, sibling_id, 1)
        } else {
            (sibling_id, page_id, node_index)
        };

        let (left_size, right_size, max_size) = {
            let left_guard = self.bpm.read_page(left_id)?;
            let right_guard = self.bpm.read_page(right_id)?;
            let left = InternalNodeRef::<K>::new(left_guard.data());
            let right = InternalNodeRef::<K>::new(right_guard.data());
            (left.size(), right.size(), left.max_size())
        };

        if left_size + right_size < max_size {
            let middle_key = self.parent_key_at(parent_id, right_index)?;

            let moved_children = {
                let mut left_guard = self.bpm.write_page(left_id)?;
                let mut right_guard = self.bpm.write_page(right_id)?;
                let mut left = InternalNodeMut::<K>::new(left_guard.data_mut());
                let mut right = InternalNodeMut::<K>::new(right_guard.data_mut());

                right.move_all_to(&mut left, &middle_key)
            };

            for child_id in moved_children {
                self.set_parent(child_id, Some(left_id))?;
            }

            self.bpm.delete_page(right_id)?;
            self.remove_parent_entry(parent_id, right_index)
        } else if node_index == 0 {
            // Rotate the right sibling's first child into this node
            let middle_key = self.parent_key_at(parent_id, 1)?;

            let (new_separator, moved_child) = {
                let mut node_guard = self.bpm.write_page(page_id)?;
                let mut sibling_guard = self.bpm.write_page(sibling_id)?;
                let mut node = InternalNodeMut::<K>::new(node_guard.data_mut());
                let mut sibling = InternalNodeMut::<K>::new(sibling_guard.data_mut());

                sibling.move_first_to_end_of(&mut node, &middle_key)
            };

            self.set_parent(moved_child, Some(page_id))?;

            let mut guard = self.bpm.write_page(parent_id)?;
            InternalNodeMut::<K>::new(guard.data_mut()).set_key_at(1, &new_separator);
            Ok(())
        } else {
            // Rotate the left sibling's last child into this node
            let middle_key = self.parent_key_at(parent_id, node_index)?;

            let (new_separator, moved_child) = {
                let mut node_guard = self.bpm.write_page(page_id)?;
                let mut sibling_guard = self.bpm.write_page(sibling_id)?;
                let mut node = InternalNodeMut::<K>::new(node_guard.data_mut());
                let mut sibling = InternalNodeMut::<K>::new(sibling_guard.data_mut());

                sibling.move_last_to_front_of(&mut node, &middle_key)
            };

            self.set_parent(moved_child, Some(page_id))?;

            let mut guard = self.bpm.write_page(parent_id)?;
            InternalNodeMut::<K>::new(guard.data_mut()).set_key_at(node_index, &new_separator);
            Ok(())
        }
    }

    fn parent_key_at(&self, parent_id: PageId, index: usize) -> Result<K> {
        let guard = self.bpm.read_page(parent_id)?;
        Ok(InternalNodeRef::<K>::new(guard.data()).key_at(index))
    }

    /// Removes a child entry from an internal node after a merge, cascading
    /// the underflow upward and collapsing the root when it is left with a
    /// single child.
    fn remove_parent_entry(&mut self, page_id: PageId, entry_index: usize) -> Result<()> {
        let (size, min_size, is_root) = {
            let mut guard = self.bpm.write_page(page_id)?;
            let mut node = InternalNodeMut::<K>::new(guard.data_mut());
            node.remove(entry_index);
            (node.size(), node.min_size(), node.parent_page_id().is_none())
        };

        if is_root {
            if size == 1 {
                self.collapse_root()?;
            }
            Ok(())
        } else if size < min_size {
            self.handle_internal_underflow(page_id)
        } else {
            Ok(())
        }
    }

    /// Promotes the single remaining child of the internal root.
    fn collapse_root(&mut self) -> Result<()> {
        let old_root_id = self.root_page_id;

        let child_id = {
            let guard = self.bpm.read_page(old_root_id)?;
            InternalNodeRef::<K>::new(guard.data()).value_at(0)
        };

        self.bpm.delete_page(old_root_id)?;
        self.set_parent(child_id, None)?;

        self.root_page_id = child_id;
        self.update_header_root()
    }

    /// Writes the current root page id through to the header page.
    fn update_header_root(&mut self) -> Result<()> {
        let mut guard = self.bpm.write_page(HEADER_PAGE_ID)?;
        HeaderPageMut::new(guard.data_mut()).update_record(&self.index_name, self.root_page_id)
    }

    /// Walks the whole tree and verifies its structural invariants: key
    /// ordering and range containment, parent back-references, uniform
    /// leaf depth, occupancy bounds, and the sibling chain. Intended for
    /// tests and debugging.
    pub fn check_integrity(&self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }

        let mut leaves = Vec::new();
        let mut leaf_depth = None;
        self.check_node(self.root_page_id, None, None, None, 0, &mut leaf_depth, &mut leaves)?;

        // The sibling chain must visit exactly the leaves found by the
        // top-down traversal, in order
        let mut page_id = leaves[0];
        let mut visited = 0;
        loop {
            if leaves.get(visited) != Some(&page_id) {
                return Err(corrupted(format!(
                    "sibling chain diverges from tree order at page {}",
                    page_id
                )));
            }
            visited += 1;

            let next = {
                let guard = self.bpm.read_page(page_id)?;
                LeafNodeRef::<K>::new(guard.data()).next_page_id()
            };
            match next {
                Some(next_id) => page_id = next_id,
                None => break,
            }
        }
        if visited != leaves.len() {
            return Err(corrupted(format!(
                "sibling chain visits {} leaves, tree has {}",
                visited,
                leaves.len()
            )));
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn check_node(
        &self,
        page_id: PageId,
        lower: Option<K>,
        upper: Option<K>,
        expected_parent: Option<PageId>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        leaves: &mut Vec<PageId>,
    ) -> Result<()> {
        let children = {
            let guard = self.bpm.read_page(page_id)?;
            let node = NodeRef::new(guard.data());

            if node.page_id() != page_id {
                return Err(corrupted(format!(
                    "page {} header names page {}",
                    page_id,
                    node.page_id()
                )));
            }
            if node.parent_page_id() != expected_parent {
                return Err(corrupted(format!(
                    "page {} has parent {:?}, expected {:?}",
                    page_id,
                    node.parent_page_id(),
                    expected_parent
                )));
            }

            let is_root = expected_parent.is_none();
            match node.page_type()? {
                PageType::Leaf => {
                    let leaf = LeafNodeRef::<K>::new(guard.data());
                    let size = leaf.size();

                    if is_root {
                        if size < 1 {
                            return Err(corrupted(format!("root leaf {} is empty", page_id)));
                        }
                    } else if size < leaf.min_size() || size > leaf.max_size() {
                        return Err(corrupted(format!(
                            "leaf {} occupancy {} outside [{}, {}]",
                            page_id,
                            size,
                            leaf.min_size(),
                            leaf.max_size()
                        )));
                    }

                    let mut previous: Option<K> = None;
                    for i in 0..size {
                        let key = leaf.key_at(i);
                        if let Some(prev) = previous {
                            if key <= prev {
                                return Err(corrupted(format!(
                                    "leaf {} keys not strictly increasing at slot {}",
                                    page_id, i
                                )));
                            }
                        }
                        if lower.is_some_and(|low| key < low)
                            || upper.is_some_and(|up| key >= up)
                        {
                            return Err(corrupted(format!(
                                "leaf {} key at slot {} outside its subtree range",
                                page_id, i
                            )));
                        }
                        previous = Some(key);
                    }

                    match *leaf_depth {
                        None => *leaf_depth = Some(depth),
                        Some(expected) if expected != depth => {
                            return Err(corrupted(format!(
                                "leaf {} at depth {}, expected {}",
                                page_id, depth, expected
                            )));
                        }
                        Some(_) => {}
                    }

                    leaves.push(page_id);
                    Vec::new()
                }
                PageType::Internal => {
                    let internal = InternalNodeRef::<K>::new(guard.data());
                    let size = internal.size();

                    if is_root {
                        if size < 2 {
                            return Err(corrupted(format!(
                                "internal root {} has {} children",
                                page_id, size
                            )));
                        }
                    } else if size < internal.min_size() || size > internal.max_size() {
                        return Err(corrupted(format!(
                            "internal {} occupancy {} outside [{}, {}]",
                            page_id,
                            size,
                            internal.min_size(),
                            internal.max_size()
                        )));
                    }

                    let mut previous: Option<K> = None;
                    for i in 1..size {
                        let key = internal.key_at(i);
                        if let Some(prev) = previous {
                            if key <= prev {
                                return Err(corrupted(format!(
                                    "internal {} keys not strictly increasing at slot {}",
                                    page_id, i
                                )));
                            }
                        }
                        if lower.is_some_and(|low| key < low)
                            || upper.is_some_and(|up| key >= up)
                        {
                            return Err(corrupted(format!(
                                "internal {} key at slot {} outside its subtree range",
                                page_id, i
                            )));
                        }
                        previous = Some(key);
                    }

                    // Child i covers [key_i, key_{i+1}), with the node's own
                    // bounds at the edges
                    (0..size)
                        .map(|i| {
                            let child_lower =
                                if i == 0 { lower } else { Some(internal.key_at(i)) };
                            let child_upper = if i + 1 == size {
                                upper
                            } else {
                                Some(internal.key_at(i + 1))
                            };
                            (internal.value_at(i), child_lower, child_upper)
                        })
                        .collect()
                }
            }
        };

        for (child_id, child_lower, child_upper) in children {
            self.check_node(
                child_id,
                child_lower,
                child_upper,
                Some(page_id),
                depth + 1,
                leaf_depth,
                leaves,
            )?;
        }

        Ok(())
    }
}

fn corrupted(msg: String) -> StratumError {
    StratumError::IndexCorrupted(msg)
}
