//! 偏移索引
//!
//! 偏移 → [`Region`] 的有序映射。底层是 `BTreeMap`（B 树），
//! 查找、插入、删除均为 O(log n)，按无符号整数序比较键。
//!
//! 所有区域都由索引持有。[`OffsetIndex::attach`] 把"查找或创建"与
//! "引用计数 +1"放在同一临界区内，从而不会与并发的删除交错。

use alloc::collections::btree_map::{BTreeMap, Entry};
use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

use crate::error::{HeapError, HeapResult};
use crate::region::{Region, RegionInfo};

/// 偏移索引
pub struct OffsetIndex {
    tree: SpinLock<BTreeMap<u64, Arc<Region>>>,
}

impl OffsetIndex {
    /// 创建空索引
    pub fn new() -> Self {
        Self {
            tree: SpinLock::new(BTreeMap::new()),
        }
    }

    /// 查找偏移对应的区域，无副作用
    pub fn find(&self, offset: u64) -> Option<Arc<Region>> {
        self.tree.lock().get(&offset).cloned()
    }

    /// 查找或创建区域。
    ///
    /// 区域已存在时忽略 `size`（先到者决定大小）。
    pub fn find_or_insert(&self, offset: u64, size: u64) -> Arc<Region> {
        let mut tree = self.tree.lock();
        Self::entry(&mut tree, offset, size).clone()
    }

    /// 查找或创建区域，并在同一临界区内为它增加一个映射
    pub fn attach(&self, offset: u64, size: u64) -> HeapResult<Arc<Region>> {
        let mut tree = self.tree.lock();
        let region = Self::entry(&mut tree, offset, size);
        let refs = region.attach()?;
        log::debug!("npheap: region {:#x} attached (refs={})", offset, refs);
        Ok(region.clone())
    }

    fn entry(tree: &mut BTreeMap<u64, Arc<Region>>, offset: u64, size: u64) -> &Arc<Region> {
        match tree.entry(offset) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                log::debug!("npheap: region {:#x} created, size {:#x}", offset, size);
                e.insert(Arc::new(Region::new(offset, size)))
            }
        }
    }

    /// 移除区域并释放它的存储。
    ///
    /// 偏移未知时返回 [`HeapError::NotFound`]，
    /// 区域仍被映射时返回 [`HeapError::RegionBusy`] 且索引不变。
    pub fn remove(&self, offset: u64) -> HeapResult<Arc<Region>> {
        let mut tree = self.tree.lock();
        let region = tree.get(&offset).ok_or(HeapError::NotFound)?;
        let freed = region.release()?;
        let region = tree.remove(&offset).ok_or(HeapError::NotFound)?;
        log::debug!(
            "npheap: region {:#x} deleted, {} pages released",
            offset,
            freed
        );
        Ok(region)
    }

    /// 区域数量
    pub fn len(&self) -> usize {
        self.tree.lock().len()
    }

    /// 索引是否为空
    pub fn is_empty(&self) -> bool {
        self.tree.lock().is_empty()
    }

    /// 按偏移升序返回所有区域的快照
    pub fn snapshot(&self) -> Vec<RegionInfo> {
        let regions: Vec<Arc<Region>> = self.tree.lock().values().cloned().collect();
        regions.iter().map(|r| r.info()).collect()
    }
}

impl Default for OffsetIndex {
    fn default() -> Self {
        Self::new()
    }
}
