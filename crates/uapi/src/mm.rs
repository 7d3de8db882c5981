//! 内存映射相关标志

use bitflags::bitflags;

bitflags! {
    /// mmap 保护标志（PROT_*）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProtFlags: u32 {
        const NONE = 0;
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXEC = 1 << 2;
    }
}

impl ProtFlags {
    /// 用户态库创建映射时使用的默认权限（PROT_READ | PROT_WRITE）
    pub const fn read_write() -> Self {
        Self::READ.union(Self::WRITE)
    }
}
