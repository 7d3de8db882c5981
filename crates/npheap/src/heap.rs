//! npheap 实例
//!
//! [`NpHeap`] 把偏移索引、帧池、缺页解析器和锁代理组合成一个状态对象。
//! 它在设备加载时构造、卸载时销毁，不存在全局的索引或全局锁。

use alloc::sync::Arc;
use alloc::vec::Vec;
use uapi::mm::ProtFlags;

use crate::config::HeapConfig;
use crate::error::{HeapError, HeapResult};
use crate::fault::FaultResolver;
use crate::frame_allocator::FramePool;
use crate::index::OffsetIndex;
use crate::lock_broker::LockBroker;
use crate::mapping::HeapMapping;
use crate::ops::heap_ops;
use crate::region::RegionInfo;

/// 设备的整体统计信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// 区域数量
    pub regions: usize,
    /// 所有区域已分配的物理页总数
    pub resident_pages: usize,
    /// 帧池总帧数
    pub total_frames: usize,
    /// 帧池空闲帧数
    pub free_frames: usize,
}

/// 共享堆
pub struct NpHeap {
    config: HeapConfig,
    index: OffsetIndex,
    resolver: Arc<FaultResolver>,
    broker: LockBroker,
}

impl NpHeap {
    /// 以 `[mem_start, mem_end)` 物理内存作为后备存储创建共享堆
    pub fn new(config: HeapConfig, mem_start: usize, mem_end: usize) -> HeapResult<Self> {
        config.validate()?;
        if mem_end <= mem_start {
            log::error!("npheap: empty backing range {:#x}..{:#x}", mem_start, mem_end);
            return Err(HeapError::InvalidArgument);
        }

        let pool = FramePool::new(mem_start, mem_end, config.page_size);
        let broker = LockBroker::new(config.lock_scope, config.unlock_policy);
        log::info!(
            "npheap: {} frames of {:#x} bytes, lock scope {:?}, unlock policy {:?}",
            pool.total_frames(),
            config.page_size,
            config.lock_scope,
            config.unlock_policy
        );
        Ok(Self {
            config,
            index: OffsetIndex::new(),
            resolver: Arc::new(FaultResolver::new(pool)),
            broker,
        })
    }

    /// 配置
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// 偏移索引
    pub fn index(&self) -> &OffsetIndex {
        &self.index
    }

    /// 缺页解析器
    pub fn resolver(&self) -> &Arc<FaultResolver> {
        &self.resolver
    }

    /// 锁代理
    pub fn broker(&self) -> &LockBroker {
        &self.broker
    }

    /// 把偏移为 `offset` 的区域映射到 `[start, start + size)`。
    ///
    /// 区域不存在时以 `size` 创建；已存在时沿用它原来的大小，
    /// 映射长度取两者较小值并向上取整到页。物理页在首次访问时才分配。
    pub fn mmap(
        &self,
        offset: u64,
        size: u64,
        start: usize,
        prot: ProtFlags,
    ) -> HeapResult<HeapMapping> {
        if size == 0 || size > isize::MAX as u64 || start & (self.config.page_size - 1) != 0 {
            return Err(HeapError::InvalidArgument);
        }
        // 先检查请求本身能否对齐，避免为无效请求创建区域
        self.config
            .page_align_up(size)
            .ok_or(HeapError::InvalidArgument)?;

        let region = self.index.attach(offset, size)?;
        let len = self
            .config
            .page_align_up(size.min(region.size()))
            .and_then(|len| usize::try_from(len).ok())
            .filter(|len| start.checked_add(*len).is_some());
        let Some(len) = len else {
            region.detach();
            return Err(HeapError::InvalidArgument);
        };

        log::debug!(
            "npheap: mmap offset {:#x} at {:#x}, len {:#x}, prot {:?}",
            offset,
            start,
            len,
            prot
        );
        Ok(HeapMapping::new(region, self.resolver.clone(), start, len, prot))
    }

    /// LOCK：以当前任务身份阻塞获取锁
    pub fn lock(&self, offset: u64) {
        self.lock_as(offset, heap_ops().current_task_id());
    }

    /// LOCK：以 `caller` 身份阻塞获取锁
    pub fn lock_as(&self, offset: u64, caller: usize) {
        self.broker.acquire(offset, caller);
    }

    /// 非阻塞 LOCK
    pub fn try_lock(&self, offset: u64) -> HeapResult<()> {
        self.broker.try_acquire(offset, heap_ops().current_task_id())
    }

    /// UNLOCK：以当前任务身份释放锁
    pub fn unlock(&self, offset: u64) -> HeapResult<()> {
        self.unlock_as(offset, heap_ops().current_task_id())
    }

    /// UNLOCK：以 `caller` 身份释放锁
    pub fn unlock_as(&self, offset: u64, caller: usize) -> HeapResult<()> {
        self.broker.release(offset, caller)
    }

    /// GETSIZE：区域大小，偏移未知时返回 0
    pub fn getsize(&self, offset: u64) -> u64 {
        self.index.find(offset).map_or(0, |region| region.size())
    }

    /// DELETE：删除空闲区域。
    ///
    /// 偏移未知视为成功；区域仍被映射时返回 [`HeapError::RegionBusy`]。
    pub fn delete(&self, offset: u64) -> HeapResult<()> {
        match self.index.remove(offset) {
            Ok(_) | Err(HeapError::NotFound) => Ok(()),
            Err(HeapError::RegionBusy) => {
                log::debug!("npheap: delete of busy region {:#x} refused", offset);
                Err(HeapError::RegionBusy)
            }
            Err(e) => Err(e),
        }
    }

    /// 所有区域的快照（按偏移升序）
    pub fn snapshot(&self) -> Vec<RegionInfo> {
        self.index.snapshot()
    }

    /// 统计信息
    pub fn stats(&self) -> HeapStats {
        let regions = self.index.snapshot();
        let pool = self.resolver.pool();
        HeapStats {
            regions: regions.len(),
            resident_pages: regions.iter().map(|r| r.resident_pages).sum(),
            total_frames: pool.total_frames(),
            free_frames: pool.free_frames(),
        }
    }
}

impl Drop for NpHeap {
    fn drop(&mut self) {
        let stats = self.stats();
        log::info!(
            "npheap: torn down with {} regions, {} resident pages",
            stats.regions,
            stats.resident_pages
        );
    }
}
