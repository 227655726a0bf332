//! 资源限额与安全系统资源
//!
//! - [`ResourceLimit`] / [`ScopedResourceReservation`]: 跨内核上下文共享的配额与两阶段预留
//! - [`SystemControl`]: 平台内存控制器接口，[`BoardSystemControl`] 是模拟板上的实现
//! - [`SecureSystemResource`]: 在安全区域上建立并拆除页表、内存块、块信息三套分配器
//!
//! # 架构依赖
//!
//! [`ResourceLimit`] 与 [`BoardSystemControl`] 内部使用 [`sync::SpinLock`]，
//! 使用前必须通过 [`sync::register_arch_ops`] 注册架构操作。

#![no_std]

extern crate alloc;

pub mod board;
pub mod config;
pub mod error;
pub mod guard;
pub mod memory_block;
pub mod resource_limit;
pub mod scoped_reservation;
pub mod system_control;
pub mod system_resource;

pub use board::{BoardSystemControl, SecureRegionInfo};
pub use config::{BoardConfig, SECURE_ALIGNMENT};
pub use error::{KResult, KernelError};
pub use guard::FailureGuard;
pub use memory_block::{BlockInfo, MemoryAttribute, MemoryBlock, MemoryPermission, MemoryState};
pub use resource_limit::{LimitableResource, ResourceLimit};
pub use scoped_reservation::ScopedResourceReservation;
pub use system_control::SystemControl;
pub use system_resource::{
    BlockInfoManager, MemoryBlockSlabManager, SecureSystemResource, SystemResource,
};

#[cfg(test)]
mod test_env {
    extern crate test_support;

    use test_support::mock::arch::MOCK_ARCH_OPS;

    struct TestArchOps;

    impl sync::ArchOps for TestArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
        }

        fn interrupt_enable_bit(&self) -> usize {
            MOCK_ARCH_OPS.sstatus_sie()
        }
    }

    static TEST_ARCH_OPS: TestArchOps = TestArchOps;

    /// 注册 Mock 架构操作，可重复调用
    pub(crate) fn init() {
        if !sync::arch_ops_registered() {
            // SAFETY: TestArchOps 只访问原子变量
            unsafe { sync::register_arch_ops(&TEST_ARCH_OPS) };
        }
    }
}
