//! 缺页解析
//!
//! [`FaultResolver`] 只负责"分配新页还是复用已有页"的策略，并返回物理页号；
//! 把物理页写入发生缺页进程的页表由宿主的缺页机制（经由 [`crate::PageMapper`]）完成。

use alloc::sync::Arc;

use crate::address::Ppn;
use crate::error::{HeapError, HeapResult};
use crate::frame_allocator::FramePool;
use crate::region::Region;

/// 一次缺页走了哪条路径
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// 首次访问，分配了新的清零页
    Fresh,
    /// 页已存在（另一进程映射了同一区域，或同一进程再次缺页）
    Remap,
}

/// 缺页解析器
pub struct FaultResolver {
    pool: Arc<FramePool>,
}

impl FaultResolver {
    /// 创建从 `pool` 分配物理页的解析器
    pub fn new(pool: Arc<FramePool>) -> Self {
        Self { pool }
    }

    /// 解析器使用的帧池
    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }

    /// 解析区域内偏移 `offset` 所在的页，返回其物理页号。
    ///
    /// `offset` 会先向下对齐到页边界。对齐后的偏移必须小于区域大小，
    /// 否则返回 [`HeapError::InvalidOffset`]。
    pub fn resolve(&self, region: &Region, offset: u64) -> HeapResult<Ppn> {
        self.resolve_with_kind(region, offset).map(|(ppn, _)| ppn)
    }

    /// 同 [`FaultResolver::resolve`]，并返回走的是哪条路径
    pub fn resolve_with_kind(&self, region: &Region, offset: u64) -> HeapResult<(Ppn, FaultKind)> {
        let page_size = self.pool.page_size() as u64;
        let aligned = offset & !(page_size - 1);
        if aligned >= region.size() {
            log::error!(
                "npheap: fault at {:#x} beyond region {:#x} of size {:#x}",
                offset,
                region.offset(),
                region.size()
            );
            return Err(HeapError::InvalidOffset);
        }

        let index = aligned / page_size;
        let result = region.resolve_page(index, || self.pool.alloc_frame());
        match result {
            Ok((ppn, FaultKind::Fresh)) => {
                log::trace!(
                    "npheap: region {:#x} page {} -> {:?} (fresh)",
                    region.offset(),
                    index,
                    ppn
                );
            }
            Ok((ppn, FaultKind::Remap)) => {
                log::trace!(
                    "npheap: region {:#x} page {} -> {:?} (remap)",
                    region.offset(),
                    index,
                    ppn
                );
            }
            Err(HeapError::OutOfMemory) => {
                log::warn!(
                    "npheap: out of frames resolving region {:#x} page {}",
                    region.offset(),
                    index
                );
            }
            Err(_) => {}
        }
        result
    }
}
