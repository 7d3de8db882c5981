//! 关中断的数据自旋锁
//!
//! npheap 的索引、区域和帧池都可能在缺页路径上被访问，
//! 因此持锁期间关闭本地中断，避免同一 CPU 上的中断处理程序再次争用同一把锁。

use core::ops::{Deref, DerefMut};

use crate::arch_ops;
use crate::raw_spin_lock::RawSpinLock;

/// 保存并关闭本地中断，drop 时恢复
struct IrqSave(usize);

impl IrqSave {
    fn new() -> Self {
        // SAFETY: 保存的状态只在 drop 时原样恢复
        IrqSave(unsafe { arch_ops().read_and_disable_interrupts() })
    }
}

impl Drop for IrqSave {
    fn drop(&mut self) {
        // SAFETY: 状态来自 IrqSave::new
        unsafe { arch_ops().restore_interrupts(self.0) };
    }
}

/// 提供对数据的互斥访问的自旋锁。
///
/// ```ignore
/// let lock = SpinLock::new(0);
/// *lock.lock() += 1;
/// ```
///
/// 不可重入；持锁期间本地中断被关闭，临界区内不能阻塞。
#[derive(Debug)]
pub struct SpinLock<T> {
    inner: lock_api::Mutex<RawSpinLock, T>,
}

impl<T> SpinLock<T> {
    /// 创建一个新的 SpinLock。
    pub const fn new(data: T) -> Self {
        Self {
            inner: lock_api::Mutex::const_new(<RawSpinLock as lock_api::RawMutex>::INIT, data),
        }
    }

    /// 关中断后获取锁。
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let irq = IrqSave::new();
        SpinLockGuard {
            guard: self.inner.lock(),
            _irq: irq,
        }
    }

    /// 尝试获取锁，失败时恢复中断并返回 None。
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let irq = IrqSave::new();
        self.inner.try_lock().map(|guard| SpinLockGuard { guard, _irq: irq })
    }

    /// 通过独占引用直接访问数据，无需加锁。
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut()
    }

    /// 消耗锁，取出内部数据。
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }

    /// 锁是否被占用（仅用于调试/测试）
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// SpinLock 的 RAII 保护器。
///
/// 字段按声明顺序 drop：先释放锁，再恢复中断。
pub struct SpinLockGuard<'a, T> {
    guard: lock_api::MutexGuard<'a, RawSpinLock, T>,
    _irq: IrqSave,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
