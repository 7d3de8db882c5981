//! npheap 错误类型
//!
//! 可通过 [`HeapError::to_errno()`] 转换为 ioctl / 缺页路径返回给用户的错误码。

use uapi::errno::{EACCES, EAGAIN, EBUSY, EFAULT, EINVAL, ENOENT, ENOMEM, ENOTTY, EPERM};

/// npheap 错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// 偏移没有对应的区域 (-ENOENT)
    ///
    /// GETSIZE 与 DELETE 会把它静默转换为 0 / 成功。
    NotFound,
    /// 区域仍被映射，不能删除 (-EBUSY)
    RegionBusy,
    /// 物理页分配失败 (-ENOMEM)
    OutOfMemory,
    /// 解锁时锁并未被持有 (-EPERM)
    NotHeld,
    /// 解锁者不是持有者，仅在 [`crate::UnlockPolicy::HolderOnly`] 下出现 (-EPERM)
    NotOwner,
    /// 缺页偏移超出区域大小，说明上游簿记有误 (-EFAULT)
    InvalidOffset,
    /// 访问地址不在映射范围内 (-EFAULT)
    BadAddress,
    /// 无效参数 (-EINVAL)
    InvalidArgument,
    /// 访问权限与映射保护标志不符 (-EACCES)
    PermissionDenied,
    /// 非阻塞加锁失败 (-EAGAIN)
    WouldBlock,
    /// 同名设备已注册 (-EBUSY)
    AlreadyRegistered,
    /// 不支持的命令 (-ENOTTY)
    NotSupported,
}

impl HeapError {
    /// 转换为系统调用错误码（负数）
    pub fn to_errno(&self) -> isize {
        match self {
            HeapError::NotFound => -ENOENT,
            HeapError::RegionBusy | HeapError::AlreadyRegistered => -EBUSY,
            HeapError::OutOfMemory => -ENOMEM,
            HeapError::NotHeld | HeapError::NotOwner => -EPERM,
            HeapError::InvalidOffset | HeapError::BadAddress => -EFAULT,
            HeapError::InvalidArgument => -EINVAL,
            HeapError::PermissionDenied => -EACCES,
            HeapError::WouldBlock => -EAGAIN,
            HeapError::NotSupported => -ENOTTY,
        }
    }
}

/// npheap 操作的结果类型
pub type HeapResult<T> = Result<T, HeapError>;
