//! 同步原语
//!
//! 向内核资源子系统提供基本的锁原语：
//!
//! - [`SpinLock`]：带中断保护的自旋锁，用于跨内核上下文共享的对象（例如资源限额）
//! - [`RawSpinLockWithoutGuard`]：不触碰中断状态的原始锁，实现了 [`lock_api::RawMutex`]
//! - [`Mutex`]：基于上述原始锁的 `lock_api` 互斥锁，用作“全局内核临界区”的显式外壳
//!
//! # 架构依赖
//!
//! 中断保护通过 [`ArchOps`] trait 抽象架构相关操作。
//! 使用 [`SpinLock`] 前必须调用 [`register_arch_ops`] 注册实现。

#![no_std]

mod intr_guard;
mod raw_mutex;
mod spin_lock;

pub use intr_guard::IntrGuard;
pub use raw_mutex::{Mutex, MutexGuard, RawSpinLockWithoutGuard};
pub use spin_lock::{RawSpinLock, RawSpinLockGuard, SpinLock, SpinLockGuard};

use core::sync::atomic::{AtomicUsize, Ordering};

/// 架构相关操作的 trait
///
/// 由宿主内核实现并注册，提供中断控制
pub trait ArchOps: Send + Sync {
    /// 读取并禁用中断，返回之前的状态
    ///
    /// # Safety
    /// 调用者必须确保在适当的上下文中调用
    unsafe fn read_and_disable_interrupts(&self) -> usize;

    /// 恢复中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值
    unsafe fn restore_interrupts(&self, flags: usize);

    /// 中断使能位
    fn interrupt_enable_bit(&self) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// 重复注册时以最后一次为准。
///
/// # Safety
/// `ops` 在注册后会被所有 CPU 并发读取，调用者需保证其实现线程安全
pub unsafe fn register_arch_ops(ops: &'static dyn ArchOps) {
    let ptr = ops as *const dyn ArchOps;
    // SAFETY: fat pointer 的布局是 (data, vtable)
    let (data, vtable) = unsafe { core::mem::transmute::<*const dyn ArchOps, (usize, usize)>(ptr) };
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
    ARCH_OPS_DATA.store(data, Ordering::Release);
}

/// 是否已注册架构操作
pub fn arch_ops_registered() -> bool {
    ARCH_OPS_DATA.load(Ordering::Acquire) != 0
}

/// 获取架构操作实例
#[inline]
pub(crate) fn arch_ops() -> &'static dyn ArchOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        #[cfg(test)]
        {
            extern crate test_support;
            return &test_support::mock::arch::MOCK_ARCH_OPS;
        }
        #[cfg(not(test))]
        panic!("sync: ArchOps not registered, call register_arch_ops first");
    }
    // SAFETY: data 和 vtable 是通过 register_arch_ops 设置的有效指针
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchOps>((data, vtable)) }
}

#[cfg(test)]
mod test_mock {
    extern crate test_support;

    use super::ArchOps;
    use test_support::mock::arch::MockArchOps;

    impl ArchOps for MockArchOps {
        unsafe fn read_and_disable_interrupts(&self) -> usize {
            unsafe { MockArchOps::read_and_disable_interrupts(self) }
        }

        unsafe fn restore_interrupts(&self, flags: usize) {
            unsafe { MockArchOps::restore_interrupts(self, flags) }
        }

        fn interrupt_enable_bit(&self) -> usize {
            self.sstatus_sie()
        }
    }
}
