//! 锁代理
//!
//! 实现 LOCK / UNLOCK 控制调用。两次调用分属不同的系统调用，
//! 中间没有可以承载 RAII 守卫的作用域，因此这里直接使用
//! [`RawTicketLock`] 的原始加锁/解锁接口。
//!
//! - 获取顺序等于到达顺序（票号锁），释放时恰好唤醒下一个等待者；
//! - 等待期间反复调用 [`crate::HeapOps::relax`]，由宿主决定自旋还是调度；
//! - 持有者只被记录下来用于诊断，除非配置了 [`UnlockPolicy::HolderOnly`]。

use alloc::sync::Arc;
use core::ops::Deref;
use hashbrown::HashMap;
use lock_api::RawMutex;
use sync::{RawTicketLock, SpinLock};

use crate::config::{LockScope, UnlockPolicy};
use crate::error::{HeapError, HeapResult};
use crate::ops::heap_ops;

struct BrokerLock {
    raw: RawTicketLock,
    /// 持有者任务 ID。任何任务 ID（包括 `usize::MAX`）都是合法的持有者
    holder: SpinLock<Option<usize>>,
}

impl BrokerLock {
    const fn new() -> Self {
        Self {
            raw: RawTicketLock::new(),
            holder: SpinLock::new(None),
        }
    }
}

enum LockRef<'a> {
    Global(&'a BrokerLock),
    Keyed(Arc<BrokerLock>),
}

impl Deref for LockRef<'_> {
    type Target = BrokerLock;

    fn deref(&self) -> &BrokerLock {
        match self {
            LockRef::Global(lock) => lock,
            LockRef::Keyed(lock) => lock,
        }
    }
}

/// LOCK / UNLOCK 的实现
pub struct LockBroker {
    scope: LockScope,
    policy: UnlockPolicy,
    global: BrokerLock,
    /// 偏移 → 锁，仅在 [`LockScope::PerOffset`] 下使用
    per_offset: SpinLock<HashMap<u64, Arc<BrokerLock>>>,
}

impl LockBroker {
    /// 创建锁代理
    pub fn new(scope: LockScope, policy: UnlockPolicy) -> Self {
        Self {
            scope,
            policy,
            global: BrokerLock::new(),
            per_offset: SpinLock::new(HashMap::new()),
        }
    }

    /// 锁的作用范围
    pub fn scope(&self) -> LockScope {
        self.scope
    }

    /// 解锁权限策略
    pub fn policy(&self) -> UnlockPolicy {
        self.policy
    }

    /// 取得（必要时创建）偏移对应的锁
    fn lock_for(&self, offset: u64) -> LockRef<'_> {
        match self.scope {
            LockScope::Global => LockRef::Global(&self.global),
            LockScope::PerOffset => LockRef::Keyed(
                self.per_offset
                    .lock()
                    .entry(offset)
                    .or_insert_with(|| Arc::new(BrokerLock::new()))
                    .clone(),
            ),
        }
    }

    /// 取得偏移对应的锁，不存在时不创建
    fn existing_lock(&self, offset: u64) -> Option<LockRef<'_>> {
        match self.scope {
            LockScope::Global => Some(LockRef::Global(&self.global)),
            LockScope::PerOffset => self
                .per_offset
                .lock()
                .get(&offset)
                .cloned()
                .map(LockRef::Keyed),
        }
    }

    /// 阻塞直到获得锁。没有超时，也不能被取消。
    pub fn acquire(&self, offset: u64, caller: usize) {
        let lock = self.lock_for(offset);
        if lock.raw.is_locked() {
            log::trace!("npheap: task {} waits for lock {:#x}", caller, offset);
        }
        lock.raw.lock_with(|| heap_ops().relax());
        *lock.holder.lock() = Some(caller);
        log::trace!("npheap: task {} acquired lock {:#x}", caller, offset);
    }

    /// 非阻塞地尝试获得锁，锁被占用时返回 [`HeapError::WouldBlock`]
    pub fn try_acquire(&self, offset: u64, caller: usize) -> HeapResult<()> {
        let lock = self.lock_for(offset);
        if !lock.raw.try_lock() {
            self.prune(offset, lock);
            return Err(HeapError::WouldBlock);
        }
        *lock.holder.lock() = Some(caller);
        Ok(())
    }

    /// 释放锁并唤醒下一个等待者。
    ///
    /// 锁未被持有时返回 [`HeapError::NotHeld`]；
    /// 在 [`UnlockPolicy::HolderOnly`] 下，非持有者解锁返回 [`HeapError::NotOwner`]。
    pub fn release(&self, offset: u64, caller: usize) -> HeapResult<()> {
        let lock = self.existing_lock(offset).ok_or(HeapError::NotHeld)?;
        let result = self.release_held(&lock, offset, caller);
        self.prune(offset, lock);
        result
    }

    fn release_held(&self, lock: &BrokerLock, offset: u64, caller: usize) -> HeapResult<()> {
        // 持有者记录的锁覆盖到放行下一个等待者为止，新持有者只能在此之后登记
        let mut holder = lock.holder.lock();
        if !lock.raw.is_locked() {
            return Err(HeapError::NotHeld);
        }
        if *holder != Some(caller) {
            match self.policy {
                UnlockPolicy::HolderOnly => {
                    log::warn!(
                        "npheap: task {} tried to release lock {:#x} it does not hold",
                        caller,
                        offset
                    );
                    return Err(HeapError::NotOwner);
                }
                UnlockPolicy::AnyCaller => {
                    log::debug!(
                        "npheap: lock {:#x} released by non-holder task {}",
                        offset,
                        caller
                    );
                }
            }
        }
        *holder = None;
        if !lock.raw.try_unlock() {
            return Err(HeapError::NotHeld);
        }
        log::trace!("npheap: task {} released lock {:#x}", caller, offset);
        Ok(())
    }

    /// 若偏移对应的锁已空闲且无人引用，从表中移除。
    ///
    /// 新的引用只能在表锁下产生；在表锁内放下调用者自己的引用后，
    /// 引用计数为 1 说明只剩表本身，排队中的等待者都还持有各自的 `Arc`。
    fn prune(&self, offset: u64, lock: LockRef<'_>) {
        let LockRef::Keyed(lock) = lock else {
            return;
        };
        let mut table = self.per_offset.lock();
        drop(lock);
        let idle = table
            .get(&offset)
            .is_some_and(|entry| Arc::strong_count(entry) == 1 && !entry.raw.is_locked());
        if idle {
            table.remove(&offset);
        }
    }

    /// 锁当前是否被持有
    pub fn is_locked(&self, offset: u64) -> bool {
        self.existing_lock(offset).is_some_and(|lock| lock.raw.is_locked())
    }

    /// 排队等待中的调用者数量（不含持有者）
    pub fn waiters(&self, offset: u64) -> usize {
        self.existing_lock(offset).map_or(0, |lock| lock.raw.waiters())
    }

    /// 当前持有者的任务 ID
    pub fn holder(&self, offset: u64) -> Option<usize> {
        let lock = self.existing_lock(offset)?;
        *lock.holder.lock()
    }

    /// [`LockScope::PerOffset`] 下当前登记在表中的锁数量
    pub fn tracked_locks(&self) -> usize {
        self.per_offset.lock().len()
    }
}
