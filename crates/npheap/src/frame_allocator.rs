//! 物理帧池
//!
//! 为共享堆提供按需分配的物理页。
//!
//! ## 分配策略（位图）
//!
//! - **bitmap**：每个 bit 表示一个物理帧（0=空闲，1=已分配）
//! - **last_alloc_hint**：上次分配所在的 u64 下标，利用局部性加速查找
//!
//! 单帧分配从 hint 开始循环查找第一个空闲位，整字全满时一次跳过 64 帧；
//! 释放时直接清除对应 bit。
//!
//! ## RAII
//!
//! [`FrameTracker`] 持有帧池的 `Arc`，`Drop` 时自动把帧还给帧池。
//! 因此区域删除时只需丢弃它的页表，存储即被回收。
//!
//! 帧池属于某个 [`crate::NpHeap`] 实例，而不是全局单例：
//! 设备卸载后帧池随最后一个引用一起释放。

use alloc::sync::Arc;
use alloc::vec::Vec;
use sync::SpinLock;

use crate::address::{Paddr, Ppn, UsizeConvert};
use crate::ops::heap_ops;

// ============================================================================
// FrameTracker - 单帧 RAII 封装
// ============================================================================

/// 物理帧跟踪器。被 drop 时自动把帧归还给所属帧池。
pub struct FrameTracker {
    ppn: Ppn,
    pool: Arc<FramePool>,
}

impl FrameTracker {
    /// 此跟踪器管理的物理页号
    pub fn ppn(&self) -> Ppn {
        self.ppn
    }
}

impl core::fmt::Debug for FrameTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("FrameTracker").field(&self.ppn).finish()
    }
}

impl Drop for FrameTracker {
    fn drop(&mut self) {
        self.pool.dealloc(self.ppn);
    }
}

// ============================================================================
// FrameAllocator - 位图分配器
// ============================================================================

/// 位图帧分配器，本身不加锁，由 [`FramePool`] 用自旋锁保护。
pub struct FrameAllocator {
    /// 物理帧的起始 Ppn
    start: Ppn,
    /// 位图数据（每个 bit 表示一个帧）
    bitmap: Vec<u64>,
    /// 总帧数
    total_frames: usize,
    /// 已分配帧数
    allocated_count: usize,
    /// 上次分配所在的字下标
    last_alloc_hint: usize,
}

impl FrameAllocator {
    /// 管理 `[start, start + total_frames)` 范围的帧
    pub fn new(start: Ppn, total_frames: usize) -> Self {
        FrameAllocator {
            start,
            bitmap: alloc::vec![0u64; total_frames.div_ceil(64)],
            total_frames,
            allocated_count: 0,
            last_alloc_hint: 0,
        }
    }

    #[inline]
    fn is_free(&self, frame_idx: usize) -> bool {
        (self.bitmap[frame_idx / 64] & (1u64 << (frame_idx % 64))) == 0
    }

    /// 分配一个物理帧，耗尽时返回 None
    pub fn alloc(&mut self) -> Option<Ppn> {
        let words = self.bitmap.len();
        for step in 0..words {
            let idx = (self.last_alloc_hint + step) % words;
            let word = self.bitmap[idx];
            if word == u64::MAX {
                continue;
            }

            let bit = (!word).trailing_zeros() as usize;
            let frame_idx = idx * 64 + bit;
            // 最后一个字中超出范围的位永远不会被置位
            if frame_idx >= self.total_frames {
                continue;
            }

            self.bitmap[idx] |= 1u64 << bit;
            self.allocated_count += 1;
            self.last_alloc_hint = idx;
            return Some(self.start + frame_idx);
        }
        None
    }

    /// 回收一个物理帧
    pub fn dealloc(&mut self, ppn: Ppn) {
        let frame_idx = ppn.as_usize().wrapping_sub(self.start.as_usize());
        debug_assert!(frame_idx < self.total_frames, "dealloc: frame out of range");
        debug_assert!(!self.is_free(frame_idx), "dealloc: double free detected");

        self.bitmap[frame_idx / 64] &= !(1u64 << (frame_idx % 64));
        self.allocated_count -= 1;
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// 已分配帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocated_count
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_count
    }
}

// ============================================================================
// FramePool - 带锁的帧池
// ============================================================================

/// 由自旋锁保护的物理帧池
pub struct FramePool {
    allocator: SpinLock<FrameAllocator>,
    page_size: usize,
}

impl FramePool {
    /// 使用 `[start_addr, end_addr)` 范围内完整的物理页创建帧池。
    ///
    /// 起始地址向上取整、结束地址向下取整到页边界。
    pub fn new(start_addr: usize, end_addr: usize, page_size: usize) -> Arc<Self> {
        let start = Ppn::from_addr_ceil(Paddr::from_usize(start_addr), page_size);
        let end = Ppn::from_addr_floor(Paddr::from_usize(end_addr), page_size);
        let total = end.as_usize().saturating_sub(start.as_usize());
        log::debug!(
            "npheap: frame pool {:?}..{:?} ({} frames)",
            start,
            end,
            total
        );
        Arc::new(Self {
            allocator: SpinLock::new(FrameAllocator::new(start, total)),
            page_size,
        })
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// 分配一个清零的物理帧
    pub fn alloc_frame(self: &Arc<Self>) -> Option<FrameTracker> {
        let ppn = self.allocator.lock().alloc()?;
        self.clear_frame(ppn);
        Some(FrameTracker {
            ppn,
            pool: self.clone(),
        })
    }

    fn dealloc(&self, ppn: Ppn) {
        self.allocator.lock().dealloc(ppn);
    }

    fn clear_frame(&self, ppn: Ppn) {
        let va = heap_ops().paddr_to_vaddr(ppn.start_addr(self.page_size).as_usize());
        // SAFETY: 帧刚从位图中取出，此时没有其它持有者
        unsafe { core::ptr::write_bytes(va as *mut u8, 0, self.page_size) };
    }

    /// 总帧数
    pub fn total_frames(&self) -> usize {
        self.allocator.lock().total_frames()
    }

    /// 已分配帧数
    pub fn allocated_frames(&self) -> usize {
        self.allocator.lock().allocated_frames()
    }

    /// 空闲帧数
    pub fn free_frames(&self) -> usize {
        self.allocator.lock().free_frames()
    }
}
