//! 设备层
//!
//! - [`MiscDevice`] 与 misc 设备注册表：模拟宿主内核的设备注册接口；
//! - [`NpHeapDevice`]：解码定长命令记录并分发到四个控制操作；
//! - [`npheap_init`] / [`npheap_exit`]：设备的加载与卸载。
//!
//! ioctl 返回值遵循内核约定：非负数表示成功（GETSIZE 返回大小），负数为 `-errno`。

use alloc::sync::Arc;
use alloc::vec::Vec;
use lazy_static::lazy_static;
use sync::SpinLock;
use uapi::mm::ProtFlags;
use uapi::npheap::{
    NPHEAP_IOCTL_DELETE, NPHEAP_IOCTL_GETSIZE, NPHEAP_IOCTL_LOCK, NPHEAP_IOCTL_UNLOCK, NpheapCmd,
};

use crate::config::HeapConfig;
use crate::error::{HeapError, HeapResult};
use crate::heap::NpHeap;
use crate::mapping::HeapMapping;

/// misc 字符设备接口
pub trait MiscDevice: Send + Sync {
    /// 设备名（在注册表中唯一）
    fn name(&self) -> &str;

    /// 处理 ioctl，`arg` 是已从用户空间拷贝进内核的参数字节
    fn ioctl(&self, cmd: u32, arg: &[u8]) -> isize;
}

lazy_static! {
    /// 已注册的 misc 设备
    static ref MISC_DEVICES: SpinLock<Vec<Arc<dyn MiscDevice>>> = SpinLock::new(Vec::new());
}

/// 注册 misc 设备，同名设备已存在时返回 [`HeapError::AlreadyRegistered`]
pub fn misc_register(device: Arc<dyn MiscDevice>) -> HeapResult<()> {
    let mut devices = MISC_DEVICES.lock();
    if devices.iter().any(|d| d.name() == device.name()) {
        return Err(HeapError::AlreadyRegistered);
    }
    devices.push(device);
    Ok(())
}

/// 注销 misc 设备，返回是否确实注销了
pub fn misc_deregister(name: &str) -> bool {
    let mut devices = MISC_DEVICES.lock();
    match devices.iter().position(|d| d.name() == name) {
        Some(i) => {
            devices.swap_remove(i);
            true
        }
        None => false,
    }
}

/// 按名字查找已注册的 misc 设备
pub fn find_misc_device(name: &str) -> Option<Arc<dyn MiscDevice>> {
    MISC_DEVICES.lock().iter().find(|d| d.name() == name).cloned()
}

/// npheap 伪设备
pub struct NpHeapDevice {
    heap: NpHeap,
}

impl NpHeapDevice {
    /// 用已构造好的共享堆创建设备
    pub fn new(heap: NpHeap) -> Self {
        Self { heap }
    }

    /// 底层共享堆
    pub fn heap(&self) -> &NpHeap {
        &self.heap
    }

    /// 分发一条已解码的命令
    pub fn dispatch(&self, cmd: u32, arg: &NpheapCmd) -> isize {
        match cmd {
            NPHEAP_IOCTL_LOCK => self.lock(arg),
            NPHEAP_IOCTL_UNLOCK => self.unlock(arg),
            NPHEAP_IOCTL_GETSIZE => self.getsize(arg),
            NPHEAP_IOCTL_DELETE => self.delete(arg),
            _ => HeapError::NotSupported.to_errno(),
        }
    }

    fn lock(&self, arg: &NpheapCmd) -> isize {
        self.heap.lock(arg.offset);
        0
    }

    fn unlock(&self, arg: &NpheapCmd) -> isize {
        match self.heap.unlock(arg.offset) {
            Ok(()) => 0,
            Err(e) => e.to_errno(),
        }
    }

    fn getsize(&self, arg: &NpheapCmd) -> isize {
        // mmap 保证区域大小不超过 isize::MAX
        isize::try_from(self.heap.getsize(arg.offset))
            .unwrap_or_else(|_| HeapError::InvalidArgument.to_errno())
    }

    fn delete(&self, arg: &NpheapCmd) -> isize {
        match self.heap.delete(arg.offset) {
            Ok(()) => 0,
            Err(e) => e.to_errno(),
        }
    }

    /// 处理对设备文件的 mmap。
    ///
    /// 宿主只交来 `vm_pgoff`（文件偏移除以页大小）。区域键取 `vm_pgoff * page_size`，
    /// 即用户态库传给 mmap 的字节偏移，ioctl 命令中的 `offset` 使用同一个键。
    pub fn mmap_pgoff(
        &self,
        vm_pgoff: u64,
        len: u64,
        start: usize,
        prot: ProtFlags,
    ) -> HeapResult<HeapMapping> {
        let offset = vm_pgoff
            .checked_mul(self.heap.config().page_size as u64)
            .ok_or(HeapError::InvalidArgument)?;
        self.heap.mmap(offset, len, start, prot)
    }
}

impl MiscDevice for NpHeapDevice {
    fn name(&self) -> &str {
        self.heap.config().device_name
    }

    fn ioctl(&self, cmd: u32, arg: &[u8]) -> isize {
        match NpheapCmd::from_bytes(arg) {
            Some(req) => self.dispatch(cmd, &req),
            None => HeapError::InvalidArgument.to_errno(),
        }
    }
}

/// 加载设备：构造共享堆并注册到 misc 设备表。
///
/// 注册失败是致命错误，记录日志后原样返回，不重试。
pub fn npheap_init(
    config: HeapConfig,
    mem_start: usize,
    mem_end: usize,
) -> HeapResult<Arc<NpHeapDevice>> {
    let name = config.device_name;
    let device = Arc::new(NpHeapDevice::new(NpHeap::new(config, mem_start, mem_end)?));
    match misc_register(device.clone()) {
        Ok(()) => {
            log::info!("\"{}\" misc device installed", name);
            Ok(device)
        }
        Err(e) => {
            log::error!("Unable to register \"{}\" misc device: {:?}", name, e);
            Err(e)
        }
    }
}

/// 卸载设备：从 misc 设备表中注销
pub fn npheap_exit(device: &NpHeapDevice) {
    let name = device.name();
    if misc_deregister(name) {
        log::info!("\"{}\" misc device removed", name);
    } else {
        log::warn!("\"{}\" misc device was not registered", name);
    }
}
