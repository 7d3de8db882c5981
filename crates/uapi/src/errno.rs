//! 错误码（与 Linux asm-generic/errno-base.h 保持一致）

pub const EPERM: isize = 1;
pub const ENOENT: isize = 2;
pub const EAGAIN: isize = 11;
pub const ENOMEM: isize = 12;
pub const EACCES: isize = 13;
pub const EFAULT: isize = 14;
pub const EBUSY: isize = 16;
pub const EINVAL: isize = 22;
pub const ENOTTY: isize = 25;
