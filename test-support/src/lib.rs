//! 测试支持 crate
//!
//! 提供各子系统单元测试使用的 Mock 平台实现

#![no_std]

pub mod mock;
