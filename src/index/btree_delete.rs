use tracing::debug;

use crate::buffer::WritePageGuard;
use crate::common::{IndexError, PageId, Result};
use crate::storage::page::{BTreePage, InternalPage, LeafPage};

use super::btree_index::{BTreeIndex, LeafTarget};
use super::key_comparator::KeyComparator;

/// Side of the underflowing node a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sibling {
    Left,
    Right,
}

impl<C: KeyComparator> BTreeIndex<C> {
    /// Removes `key`. Returns `false` if it was not present, in which case no
    /// page is modified, allocated or deleted.
    pub fn remove(&mut self, key: &[u8]) -> Result<bool> {
        self.check_key(key)?;
        let Some(root) = self.root_page_id else {
            return Ok(false);
        };

        let mut guard = self.find_leaf(root, LeafTarget::Key(key), |id| {
            self.bpm.fetch_page_write(id)
        })?;
        if LeafPage::new(guard.data())
            .lookup(key, &self.comparator)
            .is_none()
        {
            return Ok(false);
        }

        let (size, min_size, is_root) = {
            let mut leaf = LeafPage::new(guard.data_mut());
            let size = leaf.remove_and_delete_record(key, &self.comparator);
            (size, leaf.min_size(), leaf.is_root())
        };

        if is_root {
            self.adjust_root(guard)?;
        } else if size < min_size {
            self.coalesce_or_redistribute(guard)?;
        }
        Ok(true)
    }

    /// Fixes an underflowing non-root node by borrowing from a sibling or
    /// merging with one, then repairs the parent if the merge left it short.
    ///
    /// Siblings on the left are preferred for both. Returns whether `node`
    /// itself was merged away and deleted.
    fn coalesce_or_redistribute(&mut self, mut node: WritePageGuard) -> Result<bool> {
        let node_id = node.page_id();
        let (parent_id, is_leaf) = {
            let page = BTreePage::new(node.data());
            (page.parent_page_id(), page.is_leaf())
        };
        let parent_id = parent_id.ok_or_else(|| {
            IndexError::IndexCorrupted(format!("root page {node_id} cannot borrow from siblings"))
        })?;

        let mut parent = self.bpm.fetch_page_write(parent_id)?;
        let (index, left_id, right_id) = {
            let page = InternalPage::new(parent.data());
            let index = page.value_index(node_id).ok_or_else(|| {
                IndexError::IndexCorrupted(format!("page {parent_id} has no child {node_id}"))
            })?;
            let left = (index > 0).then(|| page.value_at(index - 1));
            let right = (index + 1 < page.size()).then(|| page.value_at(index + 1));
            (index, left, right)
        };

        let mut left = match left_id {
            Some(id) => Some(self.bpm.fetch_page_write(id)?),
            None => None,
        };
        if let Some(neighbor) = left.as_mut().filter(|guard| can_spare(guard)) {
            let moved =
                self.redistribute(Sibling::Left, neighbor, &mut node, &mut parent, index, is_leaf);
            drop(left);
            drop(node);
            drop(parent);
            return self.finish_redistribute(moved, node_id);
        }

        let mut right = match right_id {
            Some(id) => Some(self.bpm.fetch_page_write(id)?),
            None => None,
        };
        if let Some(neighbor) = right.as_mut().filter(|guard| can_spare(guard)) {
            let moved =
                self.redistribute(Sibling::Right, neighbor, &mut node, &mut parent, index, is_leaf);
            drop(left);
            drop(right);
            drop(node);
            drop(parent);
            return self.finish_redistribute(moved, node_id);
        }

        // Neither sibling can spare an entry: fold the right page of a pair
        // into the left one.
        let (absorbed_id, survivor_id, moved, node_deleted) = if let Some(mut left_guard) = left {
            drop(right);
            let moved = coalesce(&mut left_guard, &mut node, &mut parent, index, is_leaf);
            (node_id, left_guard.page_id(), moved, true)
        } else if let Some(mut right_guard) = right {
            let moved = coalesce(&mut node, &mut right_guard, &mut parent, index + 1, is_leaf);
            (right_guard.page_id(), node_id, moved, false)
        } else {
            return Err(IndexError::IndexCorrupted(format!(
                "page {node_id} has no sibling under {parent_id}"
            )));
        };
        drop(node);

        self.delete_node(absorbed_id)?;
        for child in moved {
            self.set_parent(child, Some(survivor_id))?;
        }
        debug!(
            absorbed = absorbed_id.as_u32(),
            into = survivor_id.as_u32(),
            leaf = is_leaf,
            "btree.coalesce"
        );

        let (parent_size, parent_min, parent_is_root) = {
            let page = BTreePage::new(parent.data());
            (page.size(), page.min_size(), page.is_root())
        };
        if parent_is_root {
            self.adjust_root(parent)?;
        } else if parent_size < parent_min {
            self.coalesce_or_redistribute(parent)?;
        }

        Ok(node_deleted)
    }

    /// Moves one entry from `neighbor` into `node` and fixes the separator in
    /// `parent`. `index` is the slot of `node` in `parent`. For internal pages
    /// returns the child that changed parents.
    fn redistribute(
        &self,
        sibling: Sibling,
        neighbor: &mut WritePageGuard,
        node: &mut WritePageGuard,
        parent: &mut WritePageGuard,
        index: usize,
        is_leaf: bool,
    ) -> Option<PageId> {
        let mut parent = InternalPage::new(parent.data_mut());

        let moved = if is_leaf {
            let mut from = LeafPage::new(neighbor.data_mut());
            let mut to = LeafPage::new(node.data_mut());
            match sibling {
                Sibling::Left => {
                    from.move_last_to_front_of(&mut to);
                    parent.set_key_at(index, to.key_at(0));
                }
                Sibling::Right => {
                    from.move_first_to_end_of(&mut to);
                    parent.set_key_at(index + 1, from.key_at(0));
                }
            }
            None
        } else {
            let mut from = InternalPage::new(neighbor.data_mut());
            let mut to = InternalPage::new(node.data_mut());
            let child = match sibling {
                Sibling::Left => {
                    let middle = parent.key_at(index).to_vec();
                    let child = from.move_last_to_front_of(&mut to, &middle);
                    parent.set_key_at(index, to.key_at(0));
                    child
                }
                Sibling::Right => {
                    let middle = parent.key_at(index + 1).to_vec();
                    let child = from.move_first_to_end_of(&mut to, &middle);
                    parent.set_key_at(index + 1, from.key_at(0));
                    child
                }
            };
            Some(child)
        };

        debug!(
            node = node.page_id().as_u32(),
            neighbor = neighbor.page_id().as_u32(),
            from = ?sibling,
            "btree.redistribute"
        );
        moved
    }

    fn finish_redistribute(&self, moved: Option<PageId>, node_id: PageId) -> Result<bool> {
        if let Some(child) = moved {
            self.set_parent(child, Some(node_id))?;
        }
        Ok(false)
    }

    /// Shrinks the root after a removal. An internal root left with one child
    /// hands the root role to that child; an empty root leaf empties the tree.
    /// Returns whether the old root page was deleted.
    fn adjust_root(&mut self, mut root: WritePageGuard) -> Result<bool> {
        let root_id = root.page_id();
        let (is_leaf, size) = {
            let page = BTreePage::new(root.data());
            (page.is_leaf(), page.size())
        };

        let new_root = match (is_leaf, size) {
            (false, 1) => {
                let child = InternalPage::new(root.data_mut()).remove_and_return_only_child();
                drop(root);
                self.set_parent(child, None)?;
                Some(child)
            }
            (true, 0) => {
                drop(root);
                None
            }
            _ => return Ok(false),
        };

        self.root_page_id = new_root;
        self.update_root_page_id()?;
        self.delete_node(root_id)?;
        debug!(
            old_root = root_id.as_u32(),
            new_root = new_root.map(|id| id.as_u32()),
            "btree.adjust_root"
        );
        Ok(true)
    }
}

fn can_spare(guard: &WritePageGuard) -> bool {
    let page = BTreePage::new(guard.data());
    page.size() > page.min_size()
}

/// Appends every entry of `right` to `left` and drops `right` from `parent`,
/// where it sits at `right_index`. Returns the children that moved for
/// internal pages.
fn coalesce(
    left: &mut WritePageGuard,
    right: &mut WritePageGuard,
    parent: &mut WritePageGuard,
    right_index: usize,
    is_leaf: bool,
) -> Vec<PageId> {
    let mut parent = InternalPage::new(parent.data_mut());

    let moved = if is_leaf {
        let mut from = LeafPage::new(right.data_mut());
        let mut to = LeafPage::new(left.data_mut());
        from.move_all_to(&mut to);
        Vec::new()
    } else {
        let middle = parent.key_at(right_index).to_vec();
        let mut from = InternalPage::new(right.data_mut());
        let mut to = InternalPage::new(left.data_mut());
        from.move_all_to(&mut to, &middle)
    };

    parent.remove(right_index);
    moved
}
