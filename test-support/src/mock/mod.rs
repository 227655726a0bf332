//! Mock 实现模块
//!
//! 这里的类型不直接依赖被测 crate（避免循环依赖），
//! 由各 crate 在 `cfg(test)` 下为它们实现自己的 trait。

pub mod arch;
pub mod kernel;
pub mod mm;
