use alloc::sync::Arc;
use alloc::vec::Vec;

use super::init_sync_arch_ops;
use crate::{HeapError, OffsetIndex, RegionState};

#[test]
fn test_find_on_empty_index() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    assert!(index.find(0).is_none());
    assert!(index.is_empty());
    assert_eq!(index.len(), 0);
}

#[test]
fn test_find_or_insert_keeps_first_size() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    let a = index.find_or_insert(7, 8192);
    let b = index.find_or_insert(7, 4096);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(b.size(), 8192);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_attach_counts_references() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    let region = index.attach(1, 100).unwrap();
    index.attach(1, 100).unwrap();
    assert_eq!(region.ref_count(), 2);
    assert_eq!(region.state(), RegionState::Active);
}

#[test]
fn test_remove_unknown_offset() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    assert_eq!(index.remove(3).unwrap_err(), HeapError::NotFound);
}

#[test]
fn test_remove_busy_region_leaves_index_intact() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    let region = index.attach(5, 4096).unwrap();
    assert_eq!(index.remove(5).unwrap_err(), HeapError::RegionBusy);
    assert!(index.find(5).is_some());

    region.detach();
    let removed = index.remove(5).unwrap();
    assert_eq!(removed.state(), RegionState::Deleted);
    assert!(index.find(5).is_none());
}

#[test]
fn test_deleted_region_cannot_be_attached() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    let region = index.find_or_insert(9, 4096);
    index.remove(9).unwrap();
    assert_eq!(region.attach().unwrap_err(), HeapError::NotFound);

    // 同一偏移重新映射得到的是一个全新的区域
    let fresh = index.attach(9, 2048).unwrap();
    assert!(!Arc::ptr_eq(&region, &fresh));
    assert_eq!(fresh.size(), 2048);
}

#[test]
fn test_snapshot_is_ordered_by_unsigned_offset() {
    init_sync_arch_ops();
    let index = OffsetIndex::new();
    for offset in [u64::MAX, 3, 0, 1 << 40, 17] {
        index.find_or_insert(offset, 4096);
    }
    let offsets: Vec<u64> = index.snapshot().iter().map(|r| r.offset).collect();
    assert_eq!(offsets, [0, 3, 17, 1 << 40, u64::MAX]);
}

#[test]
fn test_concurrent_attach_creates_one_region() {
    init_sync_arch_ops();
    extern crate std;
    use std::thread;

    let index = Arc::new(OffsetIndex::new());
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let index = index.clone();
            thread::spawn(move || index.attach(42, 4096 * (i + 1)).unwrap())
        })
        .collect();
    let regions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(index.len(), 1);
    for region in &regions {
        assert!(Arc::ptr_eq(region, &regions[0]));
    }
    assert_eq!(regions[0].ref_count(), 8);
}
