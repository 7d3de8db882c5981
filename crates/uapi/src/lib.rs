//! 与用户空间共用的定义和声明
//!
//! 包含 npheap 设备的命令记录、ioctl 编号、错误码与映射保护标志，
//! 确保内核侧实现与用户态库对同一份 ABI 达成一致。

#![no_std]
#![allow(dead_code)]
// errno 与 ioctl 常量与 Linux 头文件一一对应；逐项补 `///` 噪声较大。
#![allow(missing_docs)]

pub mod errno;
pub mod ioctl;
pub mod mm;
pub mod npheap;
