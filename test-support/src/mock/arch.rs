//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicBool, Ordering};

/// 中断使能位（与 RISC-V `sstatus.SIE` 一致）
pub const MOCK_SIE_BIT: usize = 0x2;

/// Mock 架构操作：只记录一个全局的“中断是否启用”标志
pub struct MockArchOps {
    pub interrupt_state: AtomicBool,
}

impl MockArchOps {
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
        }
    }

    /// 读取并禁用中断，返回值中以 [`MOCK_SIE_BIT`] 表示之前是否启用
    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        if self.interrupt_state.swap(false, Ordering::SeqCst) {
            MOCK_SIE_BIT
        } else {
            0
        }
    }

    pub unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state
            .store(flags & MOCK_SIE_BIT != 0, Ordering::SeqCst);
    }

    pub fn sstatus_sie(&self) -> usize {
        MOCK_SIE_BIT
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
