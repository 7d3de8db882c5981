//! Mock 实现模块
//!
//! 提供架构与宿主内核操作的 Mock 实现，用于测试

pub mod arch;
pub mod heap;
