// Unit tests for npheap.
//
// 测试以宿主 `cargo test` 运行：用一块页对齐的堆内存充当物理内存，
// 借助 test-support 的恒等映射 HeapOps，用 std 线程扮演并发的任务。

extern crate std;

use alloc::alloc::{Layout, alloc_zeroed, dealloc};
use alloc::collections::btree_map::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::ArchOps;
use uapi::mm::ProtFlags;

use crate::{HeapConfig, HeapResult, NpHeap, PageMapper, Ppn};

mod fault;
mod index;

pub(crate) const PAGE_SIZE: usize = test_support::mock::heap::MOCK_PAGE_SIZE;

struct DummyArchOps;

impl ArchOps for DummyArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        0
    }

    unsafe fn restore_interrupts(&self, _flags: usize) {}
}

static DUMMY_ARCH_OPS: DummyArchOps = DummyArchOps;
// 0 = uninit, 1 = initializing, 2 = ready
static SYNC_INIT: AtomicUsize = AtomicUsize::new(0);

pub(crate) fn init_sync_arch_ops() {
    match SYNC_INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // Safety: tests use a single global dummy ArchOps.
            unsafe { sync::register_arch_ops(&DUMMY_ARCH_OPS) };
            SYNC_INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while SYNC_INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}

/// 一段页对齐的堆内存，充当帧池的"物理内存"
pub(crate) struct TestMemory {
    ptr: *mut u8,
    layout: Layout,
}

impl TestMemory {
    pub(crate) fn new(pages: usize) -> Self {
        let layout = Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
        // Safety: layout 大小非零
        let ptr = unsafe { alloc_zeroed(layout) };
        assert!(!ptr.is_null());
        Self { ptr, layout }
    }

    pub(crate) fn start(&self) -> usize {
        self.ptr as usize
    }

    pub(crate) fn end(&self) -> usize {
        self.start() + self.layout.size()
    }
}

impl Drop for TestMemory {
    fn drop(&mut self) {
        // Safety: ptr/layout 来自 new()
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

// 帧池只通过地址访问这段内存；并发测试中不同线程触碰的是互不重叠的页
unsafe impl Send for TestMemory {}
unsafe impl Sync for TestMemory {}

/// 记录缺页结果的简易页表
#[derive(Default)]
pub(crate) struct MockPageTable {
    pub(crate) entries: BTreeMap<usize, (Ppn, ProtFlags)>,
}

impl PageMapper for MockPageTable {
    fn map_page(&mut self, vaddr: usize, ppn: Ppn, prot: ProtFlags) -> HeapResult<()> {
        assert_eq!(vaddr % PAGE_SIZE, 0, "unaligned page mapping");
        self.entries.insert(vaddr, (ppn, prot));
        Ok(())
    }
}

/// 创建一个拥有 `pages` 个物理帧的共享堆。内存必须比堆活得更久。
pub(crate) fn new_heap(pages: usize, config: HeapConfig) -> (TestMemory, NpHeap) {
    init_sync_arch_ops();
    let mem = TestMemory::new(pages);
    let heap = NpHeap::new(config, mem.start(), mem.end()).unwrap();
    (mem, heap)
}

/// 用户映射使用的典型虚拟地址
pub(crate) const USER_BASE: usize = 0x4000_0000;
