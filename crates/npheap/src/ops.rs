//! 宿主内核操作 trait 定义和注册
//!
//! npheap 需要宿主内核提供少量运行时能力：访问物理页内容、识别当前任务、
//! 以及在 LOCK 阻塞期间让出 CPU。宿主内核实现 [`HeapOps`] 并在加载设备前注册。

use core::sync::atomic::{AtomicUsize, Ordering};

/// 宿主内核操作
pub trait HeapOps: Send + Sync {
    /// 将物理地址转换为内核可直接访问的虚拟地址（直接映射区域）
    fn paddr_to_vaddr(&self, paddr: usize) -> usize;

    /// 当前任务 ID，用于记录锁的持有者
    fn current_task_id(&self) -> usize;

    /// 等待锁期间调用一次，宿主可借此让出 CPU 或进入调度
    fn relax(&self);
}

// 使用 AtomicUsize 存储 fat pointer 的两部分
static HEAP_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static HEAP_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册宿主内核操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_heap_ops(ops: &'static dyn HeapOps) {
    let ptr = ops as *const dyn HeapOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn HeapOps, (usize, usize)>(ptr) };
    HEAP_OPS_DATA.store(data, Ordering::Release);
    HEAP_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的宿主内核操作实现
///
/// # Panics
/// 如果尚未调用 [`register_heap_ops`] 注册实现，则 panic
#[inline]
pub fn heap_ops() -> &'static dyn HeapOps {
    let data = HEAP_OPS_DATA.load(Ordering::Acquire);
    let vtable = HEAP_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::heap::MOCK_HEAP_OPS;
        }
        #[cfg(not(test))]
        panic!("npheap: HeapOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn HeapOps>((data, vtable)) }
}

#[cfg(test)]
mod test_mock {
    extern crate std;
    extern crate test_support;

    use super::HeapOps;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TASK_ID: AtomicUsize = AtomicUsize::new(1);

    std::thread_local! {
        static TASK_ID: usize = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
    }

    impl HeapOps for test_support::mock::heap::MockHeapOps {
        fn paddr_to_vaddr(&self, paddr: usize) -> usize {
            test_support::mock::heap::MockHeapOps::paddr_to_vaddr(self, paddr)
        }

        // 每个测试线程扮演一个独立任务
        fn current_task_id(&self) -> usize {
            TASK_ID.with(|id| *id)
        }

        fn relax(&self) {
            std::thread::yield_now();
        }
    }

    #[test]
    fn test_heap_ops_fallback_does_not_panic() {
        let ops = super::heap_ops();
        assert_eq!(ops.paddr_to_vaddr(0x8000), 0x8000);
        assert_eq!(ops.current_task_id(), ops.current_task_id());
        ops.relax();
    }

    #[test]
    fn test_threads_get_distinct_task_ids() {
        let here = super::heap_ops().current_task_id();
        let there = std::thread::spawn(|| super::heap_ops().current_task_id())
            .join()
            .unwrap();
        assert_ne!(here, there);
    }
}
