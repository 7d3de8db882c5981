//! 票号锁
//!
//! 每个等待者先取一张票，再等待"叫号"到自己，因此获取顺序严格等于取票顺序。
//!
//! [`RawTicketLock`] 实现了 [`lock_api::RawMutex`]：既可以包装成带数据的
//! [`TicketMutex`]，也可以像 npheap 的 LOCK / UNLOCK 控制调用那样，
//! 在两次独立调用之间手动加锁和解锁。
//!
//! 锁不记录持有者，任何调用者都可以解锁。

use core::{
    hint,
    sync::atomic::{AtomicUsize, Ordering},
};
use lock_api::{GuardSend, RawMutex};

/// 票号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(usize);

/// 不携带数据的票号锁
#[derive(Debug)]
pub struct RawTicketLock {
    /// 下一张待发放的票
    next_ticket: AtomicUsize,
    /// 当前被叫到的票；等于 next_ticket 时锁空闲
    now_serving: AtomicUsize,
}

impl RawTicketLock {
    /// 创建一个空闲的票号锁。
    pub const fn new() -> Self {
        Self {
            next_ticket: AtomicUsize::new(0),
            now_serving: AtomicUsize::new(0),
        }
    }

    /// 取一张票，之后必须调用 [`RawTicketLock::wait_turn`] 等到自己。
    pub fn take_ticket(&self) -> Ticket {
        Ticket(self.next_ticket.fetch_add(1, Ordering::Relaxed))
    }

    /// 等待叫号到 `ticket`，等待期间反复调用 `relax`。
    pub fn wait_turn(&self, ticket: Ticket, mut relax: impl FnMut()) {
        while self.now_serving.load(Ordering::Acquire) != ticket.0 {
            relax();
        }
    }

    /// 获取锁；等待期间调用 `relax`（例如让出 CPU）。
    pub fn lock_with(&self, relax: impl FnMut()) {
        let ticket = self.take_ticket();
        self.wait_turn(ticket, relax);
    }

    /// 若锁当前被持有则释放并返回 true，否则返回 false。
    ///
    /// 与 [`RawMutex::unlock`] 不同，空闲状态下调用是安全的。
    pub fn try_unlock(&self) -> bool {
        loop {
            let serving = self.now_serving.load(Ordering::Acquire);
            let next = self.next_ticket.load(Ordering::Acquire);
            if serving == next {
                return false;
            }
            if self
                .now_serving
                .compare_exchange(
                    serving,
                    serving.wrapping_add(1),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return true;
            }
        }
    }

    /// 持有者之外仍在排队的等待者数量
    pub fn waiters(&self) -> usize {
        let next = self.next_ticket.load(Ordering::Relaxed);
        let serving = self.now_serving.load(Ordering::Relaxed);
        next.wrapping_sub(serving).saturating_sub(1)
    }
}

impl Default for RawTicketLock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for RawTicketLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = GuardSend;

    fn lock(&self) {
        self.lock_with(hint::spin_loop);
    }

    fn try_lock(&self) -> bool {
        let serving = self.now_serving.load(Ordering::Acquire);
        self.next_ticket
            .compare_exchange(
                serving,
                serving.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.now_serving.fetch_add(1, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }
}

/// 基于票号锁的互斥量
pub type TicketMutex<T> = lock_api::Mutex<RawTicketLock, T>;
/// [`TicketMutex`] 的 RAII 保护器
pub type TicketMutexGuard<'a, T> = lock_api::MutexGuard<'a, RawTicketLock, T>;

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_try_lock_and_unlock() {
        let lock = RawTicketLock::new();
        assert!(!lock.is_locked());
        assert!(lock.try_lock());
        assert!(lock.is_locked());
        assert!(!lock.try_lock());
        assert!(lock.try_unlock());
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_try_unlock_when_free_is_rejected() {
        let lock = RawTicketLock::new();
        assert!(!lock.try_unlock());
        lock.lock();
        assert!(lock.try_unlock());
        assert!(!lock.try_unlock());
        // 多余的解锁不能让计数错位
        assert!(lock.try_lock());
    }

    #[test]
    fn test_tickets_are_served_in_order() {
        let lock = Arc::new(RawTicketLock::new());
        let order = Arc::new(Mutex::new(Vec::new()));
        lock.lock();

        let mut handles = Vec::new();
        for id in 0..3 {
            let ticket = lock.take_ticket();
            let lock = lock.clone();
            let order = order.clone();
            handles.push(thread::spawn(move || {
                lock.wait_turn(ticket, thread::yield_now);
                order.lock().unwrap().push(id);
                assert!(lock.try_unlock());
            }));
        }

        assert_eq!(lock.waiters(), 3);
        assert!(lock.try_unlock());
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), [0, 1, 2]);
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_ticket_mutex_guards_data() {
        let mutex = Arc::new(TicketMutex::new(0usize));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = mutex.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        *mutex.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*mutex.lock(), 2000);
    }
}
