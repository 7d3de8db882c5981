//! npheap 配置

use crate::error::{HeapError, HeapResult};

/// LOCK / UNLOCK 的作用范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// 整个设备共用一把锁，命令中的偏移被忽略
    #[default]
    Global,
    /// 每个偏移一把独立的锁，按需创建
    PerOffset,
}

/// UNLOCK 的权限策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockPolicy {
    /// 任何调用者都可以解锁，包括从未加锁的调用者。
    ///
    /// 这是历史行为，存在一个进程释放另一个进程所持锁的隐患。
    AnyCaller,
    /// 只有持有者可以解锁，否则返回 [`HeapError::NotOwner`]
    HolderOnly,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        if cfg!(feature = "strict-unlock") {
            UnlockPolicy::HolderOnly
        } else {
            UnlockPolicy::AnyCaller
        }
    }
}

/// npheap 实例的配置
#[derive(Debug, Clone)]
pub struct HeapConfig {
    /// 页大小（字节），必须是 2 的幂
    pub page_size: usize,
    /// 锁的作用范围
    pub lock_scope: LockScope,
    /// 解锁权限策略
    pub unlock_policy: UnlockPolicy,
    /// 注册到 misc 设备表时使用的名字
    pub device_name: &'static str,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            lock_scope: LockScope::default(),
            unlock_policy: UnlockPolicy::default(),
            device_name: "npheap",
        }
    }
}

impl HeapConfig {
    /// 检查配置是否可用
    pub fn validate(&self) -> HeapResult<()> {
        if !self.page_size.is_power_of_two() || self.page_size < 512 {
            log::error!("npheap: invalid page size {:#x}", self.page_size);
            return Err(HeapError::InvalidArgument);
        }
        if self.device_name.is_empty() {
            return Err(HeapError::InvalidArgument);
        }
        Ok(())
    }

    /// 把字节数向上取整到页大小，溢出时返回 None
    pub fn page_align_up(&self, len: u64) -> Option<u64> {
        let mask = self.page_size as u64 - 1;
        len.checked_add(mask).map(|v| v & !mask)
    }
}
