use tracing::debug;

use crate::common::{PageId, RecordId, Result};
use crate::storage::page::{InternalPage, LeafPage};

use super::btree_index::{BTreeIndex, LeafTarget, PageReservation};
use super::key_comparator::KeyComparator;

impl<C: KeyComparator> BTreeIndex<C> {
    /// Inserts a unique key. Returns `false` without touching the tree if the
    /// key is already present.
    ///
    /// Every page a split could need is reserved up front, so an exhausted
    /// buffer pool fails with `AllocationFailure` and leaves the tree as it was.
    pub fn insert(&mut self, key: &[u8], value: RecordId) -> Result<bool> {
        self.check_key(key)?;
        match self.root_page_id {
            None => {
                self.start_new_tree(key, value)?;
                Ok(true)
            }
            Some(root) => self.insert_into_leaf(root, key, value),
        }
    }

    fn start_new_tree(&mut self, key: &[u8], value: RecordId) -> Result<()> {
        let mut reservation = PageReservation::reserve(&self.bpm, 1, "new tree root")?;
        let mut guard = reservation.take()?;
        let root_id = guard.page_id();

        let mut leaf = LeafPage::new(guard.data_mut());
        leaf.init(root_id, None, self.options.leaf_max_size, self.options.key_size);
        leaf.insert(key, value, &self.comparator);
        drop(guard);

        self.root_page_id = Some(root_id);
        self.update_root_page_id()?;
        debug!(index = %self.index_name, root = root_id.as_u32(), "btree.start_new_tree");
        Ok(())
    }

    fn insert_into_leaf(&mut self, root: PageId, key: &[u8], value: RecordId) -> Result<bool> {
        let mut guard = self.find_leaf(root, LeafTarget::Key(key), |id| {
            self.bpm.fetch_page_write(id)
        })?;

        let (duplicate, full, parent_id) = {
            let leaf = LeafPage::new(guard.data());
            (
                leaf.lookup(key, &self.comparator).is_some(),
                leaf.size() >= leaf.max_size(),
                leaf.parent_page_id(),
            )
        };
        if duplicate {
            return Ok(false);
        }
        if !full {
            LeafPage::new(guard.data_mut()).insert(key, value, &self.comparator);
            return Ok(true);
        }

        let needed = self.pages_needed_for_split(parent_id)?;
        let mut reservation = PageReservation::reserve(&self.bpm, needed, "leaf split")?;

        let leaf_id = guard.page_id();
        let mut sibling_guard = reservation.take()?;
        let sibling_id = sibling_guard.page_id();

        let separator = {
            let mut leaf = LeafPage::new(guard.data_mut());
            leaf.insert(key, value, &self.comparator);

            let mut sibling = LeafPage::new(sibling_guard.data_mut());
            sibling.init(sibling_id, parent_id, self.options.leaf_max_size, self.options.key_size);
            leaf.move_half_to(&mut sibling);
            sibling.key_at(0).to_vec()
        };
        drop(sibling_guard);
        drop(guard);

        debug!(
            leaf = leaf_id.as_u32(),
            sibling = sibling_id.as_u32(),
            "btree.split_leaf"
        );
        self.insert_into_parent(leaf_id, parent_id, &separator, sibling_id, &mut reservation)?;
        Ok(true)
    }

    /// Pages a split of a full leaf consumes: the leaf's sibling, one more for
    /// every full ancestor the promotion climbs through, and a new root if it
    /// climbs past the current one.
    fn pages_needed_for_split(&self, leaf_parent: Option<PageId>) -> Result<usize> {
        let mut needed = 1;
        let mut current = leaf_parent;

        while let Some(page_id) = current {
            let guard = self.bpm.fetch_page_read(page_id)?;
            let node = InternalPage::new(guard.data());
            if node.size() < node.max_size() {
                return Ok(needed);
            }
            needed += 1;
            current = node.parent_page_id();
        }

        Ok(needed + 1)
    }

    /// Links `new_id` into the parent of `old_id` right after it, splitting the
    /// parent (and so on upward) when it overflows.
    fn insert_into_parent(
        &mut self,
        old_id: PageId,
        parent_id: Option<PageId>,
        key: &[u8],
        new_id: PageId,
        reservation: &mut PageReservation,
    ) -> Result<()> {
        let Some(parent_id) = parent_id else {
            return self.grow_root(old_id, key, new_id, reservation);
        };

        let mut parent_guard = self.bpm.fetch_page_write(parent_id)?;
        let (size, max_size, grandparent_id) = {
            let mut parent = InternalPage::new(parent_guard.data_mut());
            let size = parent.insert_node_after(old_id, key, new_id)?;
            (size, parent.max_size(), parent.parent_page_id())
        };
        if size <= max_size {
            return Ok(());
        }

        let mut sibling_guard = reservation.take()?;
        let sibling_id = sibling_guard.page_id();
        let (separator, moved) = {
            let mut parent = InternalPage::new(parent_guard.data_mut());
            let mut sibling = InternalPage::new(sibling_guard.data_mut());
            sibling.init(
                sibling_id,
                grandparent_id,
                self.options.internal_max_size,
                self.options.key_size,
            );
            let moved = parent.move_half_to(&mut sibling);
            (sibling.key_at(0).to_vec(), moved)
        };
        drop(sibling_guard);
        drop(parent_guard);

        for child in moved {
            self.set_parent(child, Some(sibling_id))?;
        }

        debug!(
            internal = parent_id.as_u32(),
            sibling = sibling_id.as_u32(),
            "btree.split_internal"
        );
        self.insert_into_parent(parent_id, grandparent_id, &separator, sibling_id, reservation)
    }

    /// The old root split: put a new internal root above both halves.
    fn grow_root(
        &mut self,
        old_id: PageId,
        key: &[u8],
        new_id: PageId,
        reservation: &mut PageReservation,
    ) -> Result<()> {
        let mut root_guard = reservation.take()?;
        let root_id = root_guard.page_id();
        {
            let mut root = InternalPage::new(root_guard.data_mut());
            root.init(root_id, None, self.options.internal_max_size, self.options.key_size);
            root.populate_new_root(old_id, key, new_id);
        }
        drop(root_guard);

        self.set_parent(old_id, Some(root_id))?;
        self.set_parent(new_id, Some(root_id))?;

        self.root_page_id = Some(root_id);
        self.update_root_page_id()?;
        debug!(root = root_id.as_u32(), "btree.new_root");
        Ok(())
    }
}
