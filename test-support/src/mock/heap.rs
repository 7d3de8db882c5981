//! 宿主内核操作的 Mock 实现
//!
//! 注意：这里不依赖 `npheap` crate（避免循环依赖）。
//! `npheap` crate 在 `cfg(test)` 下为 [`MockHeapOps`] 实现 `HeapOps`，
//! 需要线程相关语义（任务 ID、让出 CPU）的部分也在那里借助 std 实现。

/// Mock 的宿主内核操作
///
/// 默认采用"恒等映射"（vaddr == paddr），测试直接把一块对齐的堆内存当作物理内存。
pub struct MockHeapOps;

impl MockHeapOps {
    pub const fn new() -> Self {
        Self
    }

    /// 将物理地址转换为内核虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

/// 全局 Mock 实例
pub static MOCK_HEAP_OPS: MockHeapOps = MockHeapOps::new();

/// Mock 使用的页大小
pub const MOCK_PAGE_SIZE: usize = 4096;
