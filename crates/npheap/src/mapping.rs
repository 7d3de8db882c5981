//! 区域映射
//!
//! [`HeapMapping`] 代表某个进程中映射了一个区域的虚拟地址范围（相当于一个 VMA）。
//! 它持有区域的一个引用计数：创建时 attach，drop 时 detach。
//! detach 到 0 并不会删除区域，删除只能通过 DELETE 显式发起。

use alloc::sync::Arc;
use core::cmp::min;
use uapi::mm::ProtFlags;

use crate::address::{Ppn, UsizeConvert};
use crate::error::{HeapError, HeapResult};
use crate::fault::FaultResolver;
use crate::ops::heap_ops;
use crate::region::Region;

/// 宿主页表的最小接口：把物理页接入发生缺页的地址空间
pub trait PageMapper {
    /// 把 `ppn` 以 `prot` 权限映射到页对齐的虚拟地址 `vaddr`
    fn map_page(&mut self, vaddr: usize, ppn: Ppn, prot: ProtFlags) -> HeapResult<()>;
}

/// 一个进程对某个区域的映射
pub struct HeapMapping {
    region: Arc<Region>,
    resolver: Arc<FaultResolver>,
    /// 映射起始虚拟地址（页对齐）
    start: usize,
    /// 映射长度（页对齐）
    len: usize,
    prot: ProtFlags,
}

impl HeapMapping {
    /// `region` 必须已经为这个映射 attach 过
    pub(crate) fn new(
        region: Arc<Region>,
        resolver: Arc<FaultResolver>,
        start: usize,
        len: usize,
        prot: ProtFlags,
    ) -> Self {
        Self {
            region,
            resolver,
            start,
            len,
            prot,
        }
    }

    /// 被映射区域的偏移
    pub fn offset(&self) -> u64 {
        self.region.offset()
    }

    /// 被映射的区域
    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    /// 起始虚拟地址
    pub fn start(&self) -> usize {
        self.start
    }

    /// 映射长度（字节，页对齐）
    pub fn len(&self) -> usize {
        self.len
    }

    /// 映射长度是否为 0（正常创建的映射永远不为 0）
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 结束虚拟地址（不包含）
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// 保护标志
    pub fn prot(&self) -> ProtFlags {
        self.prot
    }

    fn page_size(&self) -> usize {
        self.resolver.pool().page_size()
    }

    /// 处理落在此映射内的缺页：解析物理页并交给 `mapper` 建立页表项。
    ///
    /// 同一页重复缺页是幂等的，总是得到同一个物理页。
    pub fn handle_fault(&self, vaddr: usize, mapper: &mut impl PageMapper) -> HeapResult<Ppn> {
        if vaddr < self.start || vaddr >= self.end() {
            return Err(HeapError::BadAddress);
        }
        if self.prot.is_empty() {
            return Err(HeapError::PermissionDenied);
        }
        let page_vaddr = vaddr & !(self.page_size() - 1);
        let ppn = self
            .resolver
            .resolve(&self.region, (page_vaddr - self.start) as u64)?;
        mapper.map_page(page_vaddr, ppn, self.prot)?;
        Ok(ppn)
    }

    /// 通过映射从区域内偏移 `offset` 处读取数据，必要时触发缺页
    pub fn read_at(
        &self,
        mapper: &mut impl PageMapper,
        offset: usize,
        buf: &mut [u8],
    ) -> HeapResult<()> {
        if !self.prot.contains(ProtFlags::READ) {
            return Err(HeapError::PermissionDenied);
        }
        let len = buf.len();
        self.for_each_chunk(mapper, offset, len, |kva, done, take| {
            let dst = buf[done..].as_mut_ptr();
            // SAFETY: kva 指向已解析物理页内的 take 个字节
            unsafe { core::ptr::copy_nonoverlapping(kva as *const u8, dst, take) };
        })
    }

    /// 通过映射向区域内偏移 `offset` 处写入数据，必要时触发缺页
    pub fn write_at(
        &self,
        mapper: &mut impl PageMapper,
        offset: usize,
        data: &[u8],
    ) -> HeapResult<()> {
        if !self.prot.contains(ProtFlags::WRITE) {
            return Err(HeapError::PermissionDenied);
        }
        self.for_each_chunk(mapper, offset, data.len(), |kva, done, take| {
            let src = data[done..].as_ptr();
            // SAFETY: 同 read_at
            unsafe { core::ptr::copy_nonoverlapping(src, kva as *mut u8, take) };
        })
    }

    /// 按页切分 `[offset, offset + len)`，对每一段调用 `f(内核虚拟地址, 已处理字节数, 本段长度)`
    fn for_each_chunk(
        &self,
        mapper: &mut impl PageMapper,
        offset: usize,
        len: usize,
        mut f: impl FnMut(usize, usize, usize),
    ) -> HeapResult<()> {
        let end = offset.checked_add(len).ok_or(HeapError::BadAddress)?;
        if end > self.len {
            return Err(HeapError::BadAddress);
        }

        let page_size = self.page_size();
        let mut done = 0usize;
        while done < len {
            let cur = offset + done;
            let page_off = cur & (page_size - 1);
            let take = min(len - done, page_size - page_off);
            let ppn = self.handle_fault(self.start + cur, mapper)?;
            let kva = heap_ops().paddr_to_vaddr(ppn.start_addr(page_size).as_usize()) + page_off;
            f(kva, done, take);
            done += take;
        }
        Ok(())
    }

    /// 复制映射（例如 fork 时 VMA 被复制），区域引用计数 +1
    pub fn duplicate(&self) -> HeapResult<HeapMapping> {
        self.region.attach()?;
        Ok(HeapMapping::new(
            self.region.clone(),
            self.resolver.clone(),
            self.start,
            self.len,
            self.prot,
        ))
    }

    /// 解除映射，等价于 drop
    pub fn munmap(self) {}
}

impl Drop for HeapMapping {
    fn drop(&mut self) {
        let refs = self.region.detach();
        log::debug!(
            "npheap: region {:#x} detached (refs={})",
            self.region.offset(),
            refs
        );
    }
}

impl core::fmt::Debug for HeapMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapMapping")
            .field("offset", &self.region.offset())
            .field("start", &self.start)
            .field("len", &self.len)
            .field("prot", &self.prot)
            .finish()
    }
}
