//! Tree of recent, not yet irreversible blocks.
//!
//! Blocks are indexed by id, by number and by parent. The head is the highest block seen;
//! on equal height the earlier block stays head. Blocks below the retained window are pruned.
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use thiserror::Error;

use crate::types::{BlockId, SignedBlock};

pub(crate) const DEFAULT_MAX_SIZE: u32 = 1024;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForkDbError {
    #[error("Block {id:?} does not link to a known chain, previous {previous:?} is unknown")]
    Unlinkable { id: BlockId, previous: BlockId },
    #[error("Block {num} is outside the retained window, lowest accepted is {min}")]
    TooOld { num: u32, min: u32 },
    #[error("Unknown block {0:?}")]
    UnknownBlock(BlockId),
    #[error("Blocks {first:?} and {second:?} have no common ancestor")]
    NoCommonAncestor { first: BlockId, second: BlockId },
    #[error("No block to pop")]
    Empty,
}

pub(crate) type Result<T> = std::result::Result<T, ForkDbError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkItem {
    pub id: BlockId,
    pub previous_id: BlockId,
    pub num: u32,
    pub block: Arc<SignedBlock>,
}

impl ForkItem {
    pub fn new(block: SignedBlock) -> anyhow::Result<Self> {
        Ok(Self {
            id: block.id()?,
            previous_id: block.previous(),
            num: block.block_num(),
            block: Arc::new(block),
        })
    }
}

/// Two branches leading from their tips down to, but excluding, the common ancestor.
pub type BranchPair = (Vec<ForkItem>, Vec<ForkItem>);

#[derive(Debug)]
pub struct ForkDatabase {
    items: HashMap<BlockId, ForkItem>,
    children: HashMap<BlockId, BTreeSet<BlockId>>,
    by_num: BTreeMap<u32, BTreeSet<BlockId>>,
    head: Option<ForkItem>,
    /// Id that new blocks may link to without it being stored.
    root: BlockId,
    max_size: u32,
}

impl Default for ForkDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ForkDatabase {
    pub fn new() -> Self {
        Self {
            items: HashMap::new(),
            children: HashMap::new(),
            by_num: BTreeMap::new(),
            head: None,
            root: BlockId::default(),
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Drops everything. New blocks have to build on `root`.
    pub fn reset(&mut self, root: BlockId) {
        self.items.clear();
        self.children.clear();
        self.by_num.clear();
        self.head = None;
        self.root = root;
    }

    /// Restarts the tree with a single block, usually the last block of the block log.
    pub fn start_block(&mut self, block: SignedBlock) -> anyhow::Result<()> {
        let item = ForkItem::new(block)?;
        self.reset(item.previous_id);
        self.insert(item.clone());
        self.head = Some(item);
        Ok(())
    }

    /// Inserts a block and returns the resulting head. Known blocks are ignored.
    pub fn push_block(&mut self, item: ForkItem) -> Result<ForkItem> {
        if let Some(existing) = self.items.get(&item.id) {
            log::trace!("Block {:?} is already known", item.id);
            return Ok(self.head.clone().unwrap_or_else(|| existing.clone()));
        }

        if let Some(head) = &self.head {
            let min = head.num.saturating_sub(self.max_size).saturating_add(1);
            if item.num < min {
                return Err(ForkDbError::TooOld { num: item.num, min });
            }
        }

        if item.previous_id != self.root && !self.items.contains_key(&item.previous_id) {
            return Err(ForkDbError::Unlinkable {
                id: item.id,
                previous: item.previous_id,
            });
        }

        self.insert(item.clone());

        let is_new_head = match &self.head {
            Some(head) => item.num > head.num,
            None => true,
        };
        if is_new_head {
            log::trace!("New fork db head {:?}", item.id);
            self.head = Some(item);
        }

        self.prune();
        self.head
            .clone()
            .ok_or(ForkDbError::UnknownBlock(BlockId::default()))
    }

    pub fn head(&self) -> Option<&ForkItem> {
        self.head.as_ref()
    }

    pub fn set_head(&mut self, item: ForkItem) {
        self.head = Some(item);
    }

    /// Moves the head to its parent. The parent may be the untracked root.
    pub fn pop_block(&mut self) -> Result<ForkItem> {
        let head = self.head.take().ok_or(ForkDbError::Empty)?;
        self.head = self.items.get(&head.previous_id).cloned();
        Ok(head)
    }

    pub fn is_known_block(&self, id: &BlockId) -> bool {
        self.items.contains_key(id)
    }

    pub fn fetch(&self, id: &BlockId) -> Option<ForkItem> {
        self.items.get(id).cloned()
    }

    pub fn fetch_block(&self, id: &BlockId) -> Option<Arc<SignedBlock>> {
        self.items.get(id).map(|item| item.block.clone())
    }

    pub fn fetch_by_number(&self, num: u32) -> Vec<ForkItem> {
        self.by_num
            .get(&num)
            .map(|ids| ids.iter().filter_map(|id| self.fetch(id)).collect())
            .unwrap_or_default()
    }

    /// Block with the given number on the branch ending at the head.
    pub fn fetch_on_main_branch(&self, num: u32) -> Option<ForkItem> {
        let mut current = self.head.clone()?;
        while current.num > num {
            current = self.fetch(&current.previous_id)?;
        }
        (current.num == num).then_some(current)
    }

    /// Walks both blocks back to their common ancestor.
    ///
    /// Each branch is ordered from its tip down and excludes the ancestor itself.
    pub fn fetch_branch_from(&self, first: &BlockId, second: &BlockId) -> Result<BranchPair> {
        let mut first_branch = vec![];
        let mut second_branch = vec![];
        let mut first_item = self
            .fetch(first)
            .ok_or(ForkDbError::UnknownBlock(*first))?;
        let mut second_item = self
            .fetch(second)
            .ok_or(ForkDbError::UnknownBlock(*second))?;
        let no_ancestor = ForkDbError::NoCommonAncestor {
            first: *first,
            second: *second,
        };

        while first_item.num > second_item.num {
            let previous = first_item.previous_id;
            first_branch.push(first_item);
            first_item = self.fetch(&previous).ok_or_else(|| no_ancestor.clone())?;
        }
        while second_item.num > first_item.num {
            let previous = second_item.previous_id;
            second_branch.push(second_item);
            second_item = self.fetch(&previous).ok_or_else(|| no_ancestor.clone())?;
        }

        while first_item.id != second_item.id {
            let first_previous = first_item.previous_id;
            let second_previous = second_item.previous_id;
            first_branch.push(first_item);
            second_branch.push(second_item);
            if first_previous == second_previous {
                break;
            }
            first_item = self
                .fetch(&first_previous)
                .ok_or_else(|| no_ancestor.clone())?;
            second_item = self
                .fetch(&second_previous)
                .ok_or_else(|| no_ancestor.clone())?;
        }

        Ok((first_branch, second_branch))
    }

    /// Removes a block and everything built on top of it.
    pub fn remove(&mut self, id: &BlockId) {
        let Some(removed_root) = self.items.get(id).cloned() else {
            return;
        };

        let mut queue = VecDeque::from([*id]);
        let mut head_removed = false;
        while let Some(next) = queue.pop_front() {
            if let Some(children) = self.children.remove(&next) {
                queue.extend(children);
            }
            if self.head.as_ref().map_or(false, |head| head.id == next) {
                head_removed = true;
            }
            self.erase(&next);
        }

        if head_removed {
            self.head = self.fetch(&removed_root.previous_id);
        }
    }

    /// Retained window is `max_size` blocks below the head.
    pub fn set_max_size(&mut self, max_size: u32) {
        self.max_size = max_size;
        self.prune();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn insert(&mut self, item: ForkItem) {
        self.children
            .entry(item.previous_id)
            .or_default()
            .insert(item.id);
        self.by_num.entry(item.num).or_default().insert(item.id);
        self.items.insert(item.id, item);
    }

    fn erase(&mut self, id: &BlockId) {
        let Some(item) = self.items.remove(id) else {
            return;
        };
        if let Some(siblings) = self.children.get_mut(&item.previous_id) {
            siblings.remove(id);
            if siblings.is_empty() {
                self.children.remove(&item.previous_id);
            }
        }
        if let Some(ids) = self.by_num.get_mut(&item.num) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_num.remove(&item.num);
            }
        }
    }

    fn prune(&mut self) {
        let Some(head) = &self.head else {
            return;
        };
        let min = head.num.saturating_sub(self.max_size);
        let expired: Vec<BlockId> = self
            .by_num
            .range(..min)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        for id in expired {
            self.erase(&id);
        }
    }
}
