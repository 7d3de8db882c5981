//! 堆区域
//!
//! [`Region`] 是共享堆中由偏移命名的一段按需分配的内存。
//!
//! # 状态机
//!
//! ```text
//! Unmapped ──首次映射──▶ Active ──DELETE (ref_count == 0)──▶ Deleted
//!                         │  ▲
//!                         └──┘ attach / detach / 缺页
//! ```
//!
//! `Unmapped` 即"不在索引中"，不单独表示。`Deleted` 是终态：
//! 页表被清空、物理帧归还帧池，之后任何 attach 都会失败。

use alloc::collections::btree_map::BTreeMap;
use sync::SpinLock;

use crate::address::Ppn;
use crate::error::{HeapError, HeapResult};
use crate::fault::FaultKind;
use crate::frame_allocator::FrameTracker;

/// 区域的生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// 位于索引中，可以被映射
    Active,
    /// 已从索引中移除，存储已释放
    Deleted,
}

/// 区域的只读快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    /// 区域偏移
    pub offset: u64,
    /// 区域大小（字节）
    pub size: u64,
    /// 当前映射数
    pub ref_count: u32,
    /// 已分配的物理页数
    pub resident_pages: usize,
    /// 生命周期状态
    pub state: RegionState,
}

struct RegionInner {
    state: RegionState,
    ref_count: u32,
    /// 页下标 → 物理帧，只在首次访问该页时插入
    pages: BTreeMap<u64, FrameTracker>,
}

/// 共享堆中的一个区域
pub struct Region {
    offset: u64,
    size: u64,
    inner: SpinLock<RegionInner>,
}

impl Region {
    pub(crate) fn new(offset: u64, size: u64) -> Self {
        Region {
            offset,
            size,
            inner: SpinLock::new(RegionInner {
                state: RegionState::Active,
                ref_count: 0,
                pages: BTreeMap::new(),
            }),
        }
    }

    /// 区域偏移（索引键）
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// 创建时请求的字节数
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 当前映射数
    pub fn ref_count(&self) -> u32 {
        self.inner.lock().ref_count
    }

    /// 生命周期状态
    pub fn state(&self) -> RegionState {
        self.inner.lock().state
    }

    /// 已分配的物理页数
    pub fn resident_pages(&self) -> usize {
        self.inner.lock().pages.len()
    }

    /// 第 `index` 页对应的物理页（如果已分配）
    pub fn page(&self, index: u64) -> Option<Ppn> {
        self.inner.lock().pages.get(&index).map(FrameTracker::ppn)
    }

    /// 区域快照
    pub fn info(&self) -> RegionInfo {
        let inner = self.inner.lock();
        RegionInfo {
            offset: self.offset,
            size: self.size,
            ref_count: inner.ref_count,
            resident_pages: inner.pages.len(),
            state: inner.state,
        }
    }

    /// 新增一个映射，返回新的引用计数
    pub(crate) fn attach(&self) -> HeapResult<u32> {
        let mut inner = self.inner.lock();
        if inner.state == RegionState::Deleted {
            return Err(HeapError::NotFound);
        }
        inner.ref_count = inner
            .ref_count
            .checked_add(1)
            .ok_or(HeapError::InvalidArgument)?;
        Ok(inner.ref_count)
    }

    /// 撤销一个映射，返回新的引用计数
    pub(crate) fn detach(&self) -> u32 {
        let mut inner = self.inner.lock();
        if inner.ref_count == 0 {
            log::warn!("npheap: unbalanced detach on region {:#x}", self.offset);
            return 0;
        }
        inner.ref_count -= 1;
        inner.ref_count
    }

    /// 查找第 `index` 页，不存在时用 `alloc` 分配。
    ///
    /// 检查与插入在同一临界区内完成，同一页的并发缺页只会有一次分配生效。
    pub(crate) fn resolve_page(
        &self,
        index: u64,
        alloc: impl FnOnce() -> Option<FrameTracker>,
    ) -> HeapResult<(Ppn, FaultKind)> {
        let mut inner = self.inner.lock();
        if inner.state == RegionState::Deleted {
            return Err(HeapError::NotFound);
        }
        if let Some(frame) = inner.pages.get(&index) {
            return Ok((frame.ppn(), FaultKind::Remap));
        }
        let frame = alloc().ok_or(HeapError::OutOfMemory)?;
        let ppn = frame.ppn();
        inner.pages.insert(index, frame);
        Ok((ppn, FaultKind::Fresh))
    }

    /// 转入 Deleted 状态并释放全部物理页，返回释放的页数。
    ///
    /// 仍有映射时返回 [`HeapError::RegionBusy`]，状态不变。
    pub(crate) fn release(&self) -> HeapResult<usize> {
        let pages = {
            let mut inner = self.inner.lock();
            match inner.state {
                RegionState::Deleted => return Err(HeapError::NotFound),
                RegionState::Active if inner.ref_count > 0 => {
                    return Err(HeapError::RegionBusy);
                }
                RegionState::Active => {}
            }
            inner.state = RegionState::Deleted;
            core::mem::take(&mut inner.pages)
        };
        // 帧在区域锁之外归还帧池
        Ok(pages.len())
    }
}

impl core::fmt::Debug for Region {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Region")
            .field("offset", &self.offset)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}
