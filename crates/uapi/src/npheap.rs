//! npheap 设备的命令记录与 ioctl 编号
//!
//! 用户态库通过 `ioctl(fd, cmd, &NpheapCmd)` 发出控制调用，
//! 通过 `mmap(NULL, size, PROT_READ | PROT_WRITE, MAP_SHARED, fd, offset * PAGE_SIZE)`
//! 映射某个偏移对应的堆区域。

use crate::ioctl::iowr;

/// 控制调用的定长请求记录
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NpheapCmd {
    /// 操作码（保留字段，内核以 ioctl 命令号区分操作）
    pub op: u64,
    /// 区域偏移（区域的标识）
    pub offset: u64,
    /// 区域大小（字节）
    pub size: u64,
    /// 用户缓冲区地址（保留字段）
    pub data: u64,
}

impl NpheapCmd {
    /// 构造只携带偏移的命令记录（GETSIZE / DELETE / LOCK / UNLOCK 使用）
    pub const fn with_offset(offset: u64) -> Self {
        Self {
            op: 0,
            offset,
            size: 0,
            data: 0,
        }
    }

    /// 从用户拷贝进来的原始字节解码（本机字节序），长度不符时返回 None
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != NPHEAP_CMD_SIZE {
            return None;
        }
        let field = |i: usize| {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
            u64::from_ne_bytes(word)
        };
        Some(Self {
            op: field(0),
            offset: field(1),
            size: field(2),
            data: field(3),
        })
    }

    /// 编码为原始字节（本机字节序）
    pub fn to_bytes(&self) -> [u8; NPHEAP_CMD_SIZE] {
        let mut out = [0u8; NPHEAP_CMD_SIZE];
        for (i, v) in [self.op, self.offset, self.size, self.data].iter().enumerate() {
            out[i * 8..i * 8 + 8].copy_from_slice(&v.to_ne_bytes());
        }
        out
    }
}

/// 命令记录的字节数
pub const NPHEAP_CMD_SIZE: usize = core::mem::size_of::<NpheapCmd>();

/// npheap ioctl 类型字节
pub const NPHEAP_IOCTL_MAGIC: u8 = b'N';

pub const NPHEAP_IOCTL_LOCK: u32 = iowr(NPHEAP_IOCTL_MAGIC, 0x46, NPHEAP_CMD_SIZE);
pub const NPHEAP_IOCTL_UNLOCK: u32 = iowr(NPHEAP_IOCTL_MAGIC, 0x47, NPHEAP_CMD_SIZE);
pub const NPHEAP_IOCTL_GETSIZE: u32 = iowr(NPHEAP_IOCTL_MAGIC, 0x48, NPHEAP_CMD_SIZE);
pub const NPHEAP_IOCTL_DELETE: u32 = iowr(NPHEAP_IOCTL_MAGIC, 0x49, NPHEAP_CMD_SIZE);
