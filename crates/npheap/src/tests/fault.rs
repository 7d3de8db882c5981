use alloc::sync::Arc;
use alloc::vec::Vec;

use super::{PAGE_SIZE, TestMemory, init_sync_arch_ops};
use crate::{FaultKind, FaultResolver, FramePool, HeapError, OffsetIndex, UsizeConvert};

fn resolver(pages: usize) -> (TestMemory, FaultResolver) {
    init_sync_arch_ops();
    let mem = TestMemory::new(pages);
    let pool = FramePool::new(mem.start(), mem.end(), PAGE_SIZE);
    (mem, FaultResolver::new(pool))
}

#[test]
fn test_first_fault_allocates_then_remaps() {
    let (_mem, resolver) = resolver(4);
    let index = OffsetIndex::new();
    let region = index.find_or_insert(0, 2 * PAGE_SIZE as u64);

    let (first, kind) = resolver.resolve_with_kind(&region, 0).unwrap();
    assert_eq!(kind, FaultKind::Fresh);
    let (again, kind) = resolver.resolve_with_kind(&region, 100).unwrap();
    assert_eq!(kind, FaultKind::Remap);
    assert_eq!(first, again);

    let second = resolver.resolve(&region, PAGE_SIZE as u64).unwrap();
    assert_ne!(first, second);
    assert_eq!(region.resident_pages(), 2);
    assert_eq!(region.page(1), Some(second));
}

#[test]
fn test_fresh_page_is_zeroed() {
    let (mem, resolver) = resolver(1);
    // 先弄脏内存，确认分配时会清零
    unsafe { core::ptr::write_bytes(mem.start() as *mut u8, 0xAB, PAGE_SIZE) };

    let index = OffsetIndex::new();
    let region = index.find_or_insert(0, PAGE_SIZE as u64);
    let ppn = resolver.resolve(&region, 0).unwrap();
    let va = ppn.start_addr(PAGE_SIZE).as_usize();
    let page = unsafe { core::slice::from_raw_parts(va as *const u8, PAGE_SIZE) };
    assert!(page.iter().all(|b| *b == 0));
}

#[test]
fn test_fault_beyond_size_is_invalid_offset() {
    let (_mem, resolver) = resolver(4);
    let index = OffsetIndex::new();
    let region = index.find_or_insert(0, 100);

    // 同一页内超过 size 的偏移仍然属于第 0 页
    assert!(resolver.resolve(&region, 4000).is_ok());
    assert_eq!(
        resolver.resolve(&region, PAGE_SIZE as u64).unwrap_err(),
        HeapError::InvalidOffset
    );
    assert_eq!(region.resident_pages(), 1);
}

#[test]
fn test_out_of_memory() {
    let (_mem, resolver) = resolver(1);
    let index = OffsetIndex::new();
    let region = index.find_or_insert(0, 2 * PAGE_SIZE as u64);

    resolver.resolve(&region, 0).unwrap();
    assert_eq!(
        resolver.resolve(&region, PAGE_SIZE as u64).unwrap_err(),
        HeapError::OutOfMemory
    );
    // 失败不影响已有页
    assert_eq!(region.resident_pages(), 1);
    assert!(resolver.resolve(&region, 0).is_ok());
}

#[test]
fn test_delete_returns_frames_to_pool() {
    let (_mem, resolver) = resolver(3);
    let index = OffsetIndex::new();
    let region = index.find_or_insert(0, 3 * PAGE_SIZE as u64);
    for page in 0..3 {
        resolver.resolve(&region, page * PAGE_SIZE as u64).unwrap();
    }
    assert_eq!(resolver.pool().free_frames(), 0);

    index.remove(0).unwrap();
    assert_eq!(resolver.pool().free_frames(), 3);
    assert_eq!(
        resolver.resolve(&region, 0).unwrap_err(),
        HeapError::NotFound
    );
}

#[test]
fn test_concurrent_first_touch_allocates_once() {
    extern crate std;
    use std::sync::Barrier;
    use std::thread;

    const THREADS: usize = 8;
    const ROUNDS: u64 = 50;

    let (_mem, resolver) = resolver(4);
    let resolver = Arc::new(resolver);
    let index = OffsetIndex::new();

    for round in 0..ROUNDS {
        let region = index.find_or_insert(round, PAGE_SIZE as u64);
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let resolver = resolver.clone();
                let region = region.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    resolver.resolve_with_kind(&region, 0).unwrap()
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let fresh = results.iter().filter(|(_, k)| *k == FaultKind::Fresh).count();
        assert_eq!(fresh, 1, "round {}", round);
        assert!(results.iter().all(|(ppn, _)| *ppn == results[0].0));
        assert_eq!(resolver.pool().allocated_frames(), 1);

        drop(region);
        index.remove(round).unwrap();
        assert_eq!(resolver.pool().allocated_frames(), 0);
    }
}
