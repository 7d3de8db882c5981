//! npheap：按偏移寻址、按需分页的共享堆伪设备
//!
//! 用户进程通过 mmap 把共享堆中的某个区域映射进自己的地址空间，
//! 通过 ioctl 控制区域的生命周期（加锁、查询大小、删除）。
//!
//! # 组成
//!
//! - [`OffsetIndex`]：偏移 → [`Region`] 的有序索引（B 树，O(log n)）
//! - [`Region`]：一个堆区域的元数据、引用计数与稀疏页表
//! - [`FaultResolver`]：缺页时决定"分配新页"还是"复用已有页"
//! - [`LockBroker`]：LOCK / UNLOCK 控制调用背后的阻塞锁
//! - [`NpHeap`]：把以上组件组合成一个有明确生命周期的状态对象
//! - [`device`]：ioctl 命令分发与 misc 设备注册
//!
//! # 锁顺序
//!
//! 索引树锁 → 区域锁 → 帧池锁。锁代理的表锁不与其它锁嵌套。
//!
//! # 宿主依赖
//!
//! 通过 [`HeapOps`] trait 与宿主内核解耦，使用前必须调用 [`register_heap_ops`]；
//! 同时 `sync` crate 需要注册 `ArchOps`。

#![no_std]

extern crate alloc;

mod address;
mod config;
mod error;
mod fault;
mod heap;
mod index;
mod lock_broker;
mod mapping;
mod ops;
mod region;

pub mod device;
pub mod frame_allocator;

pub use address::{Paddr, Ppn, UsizeConvert};
pub use config::{HeapConfig, LockScope, UnlockPolicy};
pub use error::{HeapError, HeapResult};
pub use fault::{FaultKind, FaultResolver};
pub use frame_allocator::{FramePool, FrameTracker};
pub use heap::{HeapStats, NpHeap};
pub use index::OffsetIndex;
pub use lock_broker::LockBroker;
pub use mapping::{HeapMapping, PageMapper};
pub use ops::{HeapOps, heap_ops, register_heap_ops};
pub use region::{Region, RegionInfo, RegionState};

pub use uapi::mm::ProtFlags;

#[cfg(test)]
mod tests;
