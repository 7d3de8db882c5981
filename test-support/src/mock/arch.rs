//! 中断控制的 Mock 实现
//!
//! 注意：这里不依赖 `sync` crate（避免循环依赖）。
//! `sync` crate 在 `cfg(test)` 下为 [`MockArchOps`] 实现 `ArchOps`。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 模拟状态字中的中断使能位
pub const MOCK_IRQ_ENABLE: usize = 1 << 1;

/// 用一个布尔值模拟本地中断开关，并统计关中断次数
pub struct MockArchOps {
    enabled: AtomicBool,
    disables: AtomicUsize,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            disables: AtomicUsize::new(0),
        }
    }

    /// 关中断并返回之前的状态字
    pub fn save_and_disable(&self) -> usize {
        self.disables.fetch_add(1, Ordering::Relaxed);
        match self.enabled.swap(false, Ordering::SeqCst) {
            true => MOCK_IRQ_ENABLE,
            false => 0,
        }
    }

    /// 按状态字恢复中断
    pub fn restore(&self, flags: usize) {
        self.enabled.store(flags & MOCK_IRQ_ENABLE != 0, Ordering::SeqCst);
    }

    /// 累计关中断次数
    pub fn disable_count(&self) -> usize {
        self.disables.load(Ordering::Relaxed)
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
