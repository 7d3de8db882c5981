//! 物理地址与物理页号
//!
//! 页大小由 [`crate::HeapConfig::page_size`] 决定，因此页号与地址之间的换算
//! 都显式地接收页大小参数，而不是依赖全局配置。

use core::fmt;
use core::ops::Add;

/// 与 usize 之间的相互转换
pub trait UsizeConvert: Copy {
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
    /// 转换为 usize
    fn as_usize(&self) -> usize;
}

/// 物理地址
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Paddr(usize);

impl UsizeConvert for Paddr {
    fn from_usize(value: usize) -> Self {
        Paddr(value)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Debug for Paddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Paddr({:#x})", self.0)
    }
}

/// 物理页号，即缺页处理返回的"物理页句柄"
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ppn(usize);

impl Ppn {
    /// 包含 `addr` 的页（向下取整）
    pub fn from_addr_floor(addr: Paddr, page_size: usize) -> Self {
        Ppn(addr.as_usize() / page_size)
    }

    /// `addr` 之后第一个完整页（向上取整）
    pub fn from_addr_ceil(addr: Paddr, page_size: usize) -> Self {
        Ppn(addr.as_usize().div_ceil(page_size))
    }

    /// 该页的起始物理地址
    pub fn start_addr(&self, page_size: usize) -> Paddr {
        Paddr(self.0 * page_size)
    }
}

impl UsizeConvert for Ppn {
    fn from_usize(value: usize) -> Self {
        Ppn(value)
    }

    fn as_usize(&self) -> usize {
        self.0
    }
}

impl Add<usize> for Ppn {
    type Output = Ppn;

    fn add(self, rhs: usize) -> Ppn {
        Ppn(self.0 + rhs)
    }
}

impl fmt::Debug for Ppn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ppn({:#x})", self.0)
    }
}
