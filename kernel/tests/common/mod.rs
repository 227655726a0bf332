//! 集成测试公共环境

use std::sync::Arc;

use kernel::{BoardSystemControl, LimitableResource, ResourceLimit};
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

/// 物理内存限额
pub const MEMORY: LimitableResource = LimitableResource::PhysicalMemoryMax;

/// 注册架构操作，建立默认布局的模拟板和给定上限的资源限额
pub fn setup(limit_value: u64) -> (Arc<BoardSystemControl>, Arc<ResourceLimit>) {
    if !sync::arch_ops_registered() {
        // SAFETY: TestArchOps 只访问原子变量
        unsafe { sync::register_arch_ops(&TEST_ARCH_OPS) };
    }
    let board = Arc::new(BoardSystemControl::default());
    let limit = Arc::new(ResourceLimit::new());
    limit.set_limit_value(MEMORY, limit_value).unwrap();
    (board, limit)
}
