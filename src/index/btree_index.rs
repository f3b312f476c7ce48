use std::cmp::Ordering;
use std::collections::VecDeque;
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    BTreeOptions, IndexError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::{check_name, BTreePage, HeaderPage, InternalPage, LeafPage, PageType};

use super::btree_iterator::BTreeIterator;
use super::key_comparator::{encode_integer_key, KeyComparator};

/// Which leaf a descent should stop at.
#[derive(Clone, Copy)]
pub(super) enum LeafTarget<'a> {
    Key(&'a [u8]),
    LeftMost,
}

/// Shape of a tree as seen by `verify_integrity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub leaf_count: usize,
    pub internal_count: usize,
    pub key_count: usize,
}

/// A unique-key B+ tree stored in buffer pool pages.
///
/// The handle owns the root page id and writes every change of it through to
/// the header page under `index_name`, so the tree can be reopened later with
/// [`BTreeIndex::new`]. Mutations take `&mut self`: one writer at a time.
pub struct BTreeIndex<C: KeyComparator> {
    pub(super) index_name: String,
    pub(super) root_page_id: Option<PageId>,
    pub(super) bpm: Arc<BufferPoolManager>,
    pub(super) comparator: C,
    pub(super) options: BTreeOptions,
}

impl<C: KeyComparator> BTreeIndex<C> {
    /// Opens the index registered as `name`, or an empty one if the header
    /// page has no record for it yet.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        options: BTreeOptions,
    ) -> Result<Self> {
        options.validate()?;
        let index_name = name.into();
        check_name(&index_name)?;

        let root_page_id = {
            let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
            if !HeaderPage::new(guard.data()).is_valid() {
                HeaderPage::new(guard.data_mut()).init();
                debug!("btree.header_init");
            }
            HeaderPage::new(guard.data())
                .get_root_id(&index_name)
                .filter(|&root| root != INVALID_PAGE_ID)
        };

        if let Some(root) = root_page_id {
            let guard = bpm.fetch_page_read(root)?;
            let stored = BTreePage::new(guard.data()).key_size();
            if stored != options.key_size {
                return Err(IndexError::KeySizeMismatch {
                    expected: stored,
                    actual: options.key_size,
                });
            }
        }

        debug!(
            index = %index_name,
            root = root_page_id.map(|id| id.as_u32()),
            "btree.open"
        );

        Ok(Self {
            index_name,
            root_page_id,
            bpm,
            comparator,
            options,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id.is_none()
    }

    pub fn root_page_id(&self) -> Option<PageId> {
        self.root_page_id
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn options(&self) -> &BTreeOptions {
        &self.options
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }

    pub(super) fn check_key(&self, key: &[u8]) -> Result<()> {
        if key.len() != self.options.key_size {
            return Err(IndexError::KeySizeMismatch {
                expected: self.options.key_size,
                actual: key.len(),
            });
        }
        Ok(())
    }

    /// Point lookup.
    pub fn get_value(&self, key: &[u8]) -> Result<Option<RecordId>> {
        self.check_key(key)?;
        let Some(root) = self.root_page_id else {
            return Ok(None);
        };

        let guard = self.find_leaf(root, LeafTarget::Key(key), |id| {
            self.bpm.fetch_page_read(id)
        })?;
        Ok(LeafPage::new(guard.data()).lookup(key, &self.comparator))
    }

    /// Descends from `root` to the leaf selected by `target`.
    ///
    /// Each child is fetched before its parent guard is dropped; only the
    /// returned leaf stays pinned.
    pub(super) fn find_leaf<G, F>(&self, root: PageId, target: LeafTarget<'_>, fetch: F) -> Result<G>
    where
        G: Deref<Target = [u8]>,
        F: Fn(PageId) -> Result<G>,
    {
        let mut page_id = root;
        let mut guard = fetch(page_id)?;

        loop {
            let child = match BTreePage::new(&*guard).page_type() {
                PageType::Leaf => return Ok(guard),
                PageType::Internal => {
                    let node = InternalPage::new(&*guard);
                    match target {
                        LeafTarget::Key(key) => node.lookup(key, &self.comparator),
                        LeafTarget::LeftMost => node.value_at(0),
                    }
                }
                PageType::Invalid => {
                    return Err(IndexError::IndexCorrupted(format!(
                        "page {page_id} is not a tree page"
                    )))
                }
            };

            let next = fetch(child)?;
            guard = next;
            page_id = child;
        }
    }

    /// Writes the current root to the header page, registering the index on
    /// first use.
    pub(super) fn update_root_page_id(&self) -> Result<()> {
        let root = self.root_page_id.unwrap_or(INVALID_PAGE_ID);
        let mut guard = self.bpm.fetch_page_write(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());

        if header.get_root_id(&self.index_name).is_some() {
            header.update_record(&self.index_name, root)?;
        } else {
            header.insert_record(&self.index_name, root)?;
        }

        debug!(
            index = %self.index_name,
            root = self.root_page_id.map(|id| id.as_u32()),
            "btree.root_persisted"
        );
        Ok(())
    }

    pub(super) fn set_parent(&self, page_id: PageId, parent: Option<PageId>) -> Result<()> {
        let mut guard = self.bpm.fetch_page_write(page_id)?;
        BTreePage::new(guard.data_mut()).set_parent_page_id(parent);
        Ok(())
    }

    /// Returns a page whose entries have all moved elsewhere. The page must
    /// already be unpinned.
    pub(super) fn delete_node(&self, page_id: PageId) -> Result<()> {
        if !self.bpm.delete_page(page_id)? {
            warn!(page_id = page_id.as_u32(), "btree.delete_node.already_free");
        }
        Ok(())
    }

    /// Iterator over every entry in key order.
    pub fn begin(&self) -> Result<BTreeIterator> {
        let Some(root) = self.root_page_id else {
            return Ok(BTreeIterator::empty(Arc::clone(&self.bpm)));
        };

        let guard = self.find_leaf(root, LeafTarget::LeftMost, |id| {
            self.bpm.fetch_page_read(id)
        })?;
        Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard.page_id(), 0))
    }

    /// Iterator starting at the first entry whose key is not less than `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BTreeIterator> {
        self.check_key(key)?;
        let Some(root) = self.root_page_id else {
            return Ok(BTreeIterator::empty(Arc::clone(&self.bpm)));
        };

        let guard = self.find_leaf(root, LeafTarget::Key(key), |id| {
            self.bpm.fetch_page_read(id)
        })?;
        let index = LeafPage::new(guard.data()).key_index(key, &self.comparator);
        Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard.page_id(), index))
    }

    /// Inserts every whitespace-separated integer in `path`, each paired with
    /// `RecordId::from_integer`. Returns how many keys were new.
    pub fn insert_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let mut inserted = 0;
        for value in read_integer_keys(path.as_ref())? {
            let key = encode_integer_key(value, self.options.key_size);
            if self.insert(&key, RecordId::from_integer(value))? {
                inserted += 1;
            }
        }
        debug!(index = %self.index_name, inserted, "btree.insert_from_file");
        Ok(inserted)
    }

    /// Removes every whitespace-separated integer in `path`. Returns how many
    /// keys were present.
    pub fn remove_from_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let mut removed = 0;
        for value in read_integer_keys(path.as_ref())? {
            let key = encode_integer_key(value, self.options.key_size);
            if self.remove(&key)? {
                removed += 1;
            }
        }
        debug!(index = %self.index_name, removed, "btree.remove_from_file");
        Ok(removed)
    }

    /// Renders the tree one level per line.
    ///
    /// Leaves print their keys, internal pages their separators. `verbose`
    /// adds page ids, parent ids, sizes and leaf links.
    pub fn to_string_by_level(&self, verbose: bool) -> Result<String> {
        let Some(root) = self.root_page_id else {
            return Ok("Empty tree".to_string());
        };

        let mut out = String::new();
        let mut level = vec![root];
        let mut depth = 0;

        while !level.is_empty() {
            let mut next_level = Vec::new();
            let mut nodes = Vec::with_capacity(level.len());

            for page_id in level {
                let guard = self.bpm.fetch_page_read(page_id)?;
                let page = BTreePage::new(guard.data());

                let (keys, next) = if page.is_leaf() {
                    let leaf = LeafPage::new(guard.data());
                    let keys: Vec<String> = (0..leaf.size())
                        .map(|i| self.comparator.display(leaf.key_at(i)))
                        .collect();
                    (keys, Some(leaf.next_page_id()))
                } else {
                    let node = InternalPage::new(guard.data());
                    let keys: Vec<String> = (1..node.size())
                        .map(|i| self.comparator.display(node.key_at(i)))
                        .collect();
                    next_level.extend(node.children());
                    (keys, None)
                };

                let mut rendered = format!("({})", keys.join(","));
                if verbose {
                    rendered = format!(
                        "[page={} parent={} size={}/{}{}] {}",
                        page_id.as_u32(),
                        display_page(page.parent_page_id()),
                        page.size(),
                        page.max_size(),
                        next.map(|n| format!(" next={}", display_page(n)))
                            .unwrap_or_default(),
                        rendered
                    );
                }
                nodes.push(rendered);
            }

            if depth > 0 {
                out.push('\n');
            }
            out.push_str(&format!("L{depth}: {}", nodes.join(" ")));
            level = next_level;
            depth += 1;
        }

        Ok(out)
    }

    /// Walks the whole tree and checks ordering, occupancy, parent pointers,
    /// uniform leaf depth, the leaf chain, and the header record.
    pub fn verify_integrity(&self) -> Result<TreeStats> {
        let Some(root) = self.root_page_id else {
            return Ok(TreeStats::default());
        };

        {
            let guard = self.bpm.fetch_page_read(HEADER_PAGE_ID)?;
            let recorded = HeaderPage::new(guard.data()).get_root_id(&self.index_name);
            if recorded != Some(root) {
                return Err(corrupted(format!(
                    "header records root {recorded:?} for {:?}, tree root is {root}",
                    self.index_name
                )));
            }
        }

        let mut walk = IntegrityWalk::default();
        self.check_subtree(root, None, None, None, 1, &mut walk)?;

        // The leaf chain must list exactly the leaves found by the walk.
        let mut chained = Vec::with_capacity(walk.leaves.len());
        let mut current = walk.leaves.first().copied();
        while let Some(page_id) = current {
            if chained.len() > walk.leaves.len() {
                return Err(corrupted("leaf chain has a cycle".to_string()));
            }
            chained.push(page_id);
            let guard = self.bpm.fetch_page_read(page_id)?;
            current = LeafPage::new(guard.data()).next_page_id();
        }
        if chained != walk.leaves {
            return Err(corrupted(format!(
                "leaf chain {chained:?} does not match tree order {:?}",
                walk.leaves
            )));
        }

        walk.stats.leaf_count = walk.leaves.len();
        Ok(walk.stats)
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        parent: Option<PageId>,
        lower: Option<&[u8]>,
        upper: Option<&[u8]>,
        depth: usize,
        walk: &mut IntegrityWalk,
    ) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let page = BTreePage::new(guard.data());

        if page.page_id() != page_id {
            return Err(corrupted(format!(
                "page {page_id} claims to be page {}",
                page.page_id()
            )));
        }
        if page.parent_page_id() != parent {
            return Err(corrupted(format!(
                "page {page_id} has parent {:?}, expected {parent:?}",
                page.parent_page_id()
            )));
        }
        if page.key_size() != self.options.key_size {
            return Err(corrupted(format!(
                "page {page_id} has key size {}",
                page.key_size()
            )));
        }

        let is_root = parent.is_none();
        let size = page.size();
        let min = match (is_root, page.page_type()) {
            (true, PageType::Leaf) => 1,
            (true, _) => 2,
            (false, _) => page.min_size(),
        };
        if size < min || size > page.max_size() {
            return Err(corrupted(format!(
                "page {page_id} holds {size}, allowed {min}..={}",
                page.max_size()
            )));
        }

        let in_bounds = |key: &[u8]| {
            lower.map_or(true, |lo| self.comparator.compare(key, lo) != Ordering::Less)
                && upper.map_or(true, |hi| self.comparator.compare(key, hi) == Ordering::Less)
        };

        match page.page_type() {
            PageType::Leaf => {
                let leaf = LeafPage::new(guard.data());
                for i in 0..size {
                    let key = leaf.key_at(i);
                    if !in_bounds(key) {
                        return Err(corrupted(format!("leaf {page_id} key {i} out of range")));
                    }
                    if i > 0 && self.comparator.compare(leaf.key_at(i - 1), key) != Ordering::Less
                    {
                        return Err(corrupted(format!("leaf {page_id} keys not increasing")));
                    }
                }

                match walk.leaf_depth {
                    Some(expected) if expected != depth => {
                        return Err(corrupted(format!(
                            "leaf {page_id} at depth {depth}, others at {expected}"
                        )));
                    }
                    _ => walk.leaf_depth = Some(depth),
                }
                walk.stats.height = depth;
                walk.stats.key_count += size;
                walk.leaves.push(page_id);
                Ok(())
            }
            PageType::Internal => {
                let node = InternalPage::new(guard.data());
                let keys: Vec<Vec<u8>> = (1..size).map(|i| node.key_at(i).to_vec()).collect();
                let children = node.children();
                drop(guard);

                for (i, key) in keys.iter().enumerate() {
                    if !in_bounds(key) {
                        return Err(corrupted(format!(
                            "internal {page_id} key {} out of range",
                            i + 1
                        )));
                    }
                    if i > 0 && self.comparator.compare(&keys[i - 1], key) != Ordering::Less {
                        return Err(corrupted(format!("internal {page_id} keys not increasing")));
                    }
                }

                walk.stats.internal_count += 1;
                for (i, &child) in children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(keys[i - 1].as_slice()) };
                    let child_upper = keys.get(i).map(Vec::as_slice).or(upper);
                    self.check_subtree(
                        child,
                        Some(page_id),
                        child_lower,
                        child_upper,
                        depth + 1,
                        walk,
                    )?;
                }
                Ok(())
            }
            PageType::Invalid => Err(corrupted(format!("page {page_id} is not a tree page"))),
        }
    }
}

#[derive(Default)]
struct IntegrityWalk {
    stats: TreeStats,
    leaf_depth: Option<usize>,
    leaves: Vec<PageId>,
}

fn corrupted(message: String) -> IndexError {
    IndexError::IndexCorrupted(message)
}

fn display_page(page_id: Option<PageId>) -> String {
    page_id.map_or_else(|| "none".to_string(), |id| id.as_u32().to_string())
}

fn read_integer_keys(path: &Path) -> Result<Vec<i64>> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .split_whitespace()
        .map(|token| {
            token.parse::<i64>().map_err(|e| {
                IndexError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("bad key {token:?} in {}: {e}", path.display()),
                ))
            })
        })
        .collect()
}

/// Pages set aside before a split touches the tree, so running out of frames
/// surfaces while every page is still untouched.
///
/// Reserved pages stay pinned until taken. Whatever is left on drop is
/// handed back to the buffer pool.
pub(super) struct PageReservation {
    bpm: Arc<BufferPoolManager>,
    guards: VecDeque<WritePageGuard>,
}

impl PageReservation {
    pub(super) fn reserve(
        bpm: &Arc<BufferPoolManager>,
        count: usize,
        purpose: &'static str,
    ) -> Result<Self> {
        let mut reservation = Self {
            bpm: Arc::clone(bpm),
            guards: VecDeque::with_capacity(count),
        };

        for _ in 0..count {
            let page_id = match bpm.new_page() {
                Ok(page_id) => page_id,
                Err(IndexError::BufferPoolFull) => {
                    warn!(purpose, requested = count, "btree.allocation_failure");
                    return Err(IndexError::AllocationFailure(purpose));
                }
                Err(e) => return Err(e),
            };

            match bpm.fetch_page_write(page_id) {
                Ok(guard) => reservation.guards.push_back(guard),
                Err(e) => {
                    if let Err(err) = bpm.delete_page(page_id) {
                        warn!(page_id = page_id.as_u32(), error = %err, "btree.reservation.release_failed");
                    }
                    return Err(e);
                }
            }
        }

        Ok(reservation)
    }

    pub(super) fn take(&mut self) -> Result<WritePageGuard> {
        self.guards
            .pop_front()
            .ok_or_else(|| corrupted("split needed more pages than were reserved".to_string()))
    }
}

impl Drop for PageReservation {
    fn drop(&mut self) {
        for guard in self.guards.drain(..) {
            let page_id = guard.page_id();
            drop(guard);
            if let Err(err) = self.bpm.delete_page(page_id) {
                warn!(page_id = page_id.as_u32(), error = %err, "btree.reservation.release_failed");
            }
        }
    }
}
