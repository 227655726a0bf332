//! 不带中断保护的原始锁
//!
//! 只在原子标志上自旋，不禁用中断。实现 [`lock_api::RawMutex`]，
//! 由此得到通用的 [`Mutex`]。适合把“调用者已持有全局内核锁”这一前提
//! 显式化为一个类型：把整个子系统放进 `Mutex` 里，所有变更入口都需要 guard。

use core::hint;
use core::sync::atomic::{AtomicBool, Ordering};

/// 不带中断保护的原始自旋锁
#[derive(Debug)]
pub struct RawSpinLockWithoutGuard {
    locked: AtomicBool,
}

impl RawSpinLockWithoutGuard {
    /// 创建一个未上锁的原始锁
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

impl Default for RawSpinLockWithoutGuard {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 锁状态由单个原子标志维护，Acquire/Release 保证临界区内存可见性
unsafe impl lock_api::RawMutex for RawSpinLockWithoutGuard {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        while !self.try_lock() {
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// 基于 [`RawSpinLockWithoutGuard`] 的互斥锁
pub type Mutex<T> = lock_api::Mutex<RawSpinLockWithoutGuard, T>;

/// [`Mutex`] 的保护器
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawSpinLockWithoutGuard, T>;

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::vec::Vec;

    #[test]
    fn test_mutex_basic() {
        let m = Mutex::new(1);
        *m.lock() += 1;
        assert_eq!(*m.lock(), 2);
        assert!(!m.is_locked());
    }

    #[test]
    fn test_mutex_try_lock_contended() {
        let m = Mutex::new(());
        let _g = m.lock();
        assert!(m.try_lock().is_none());
    }

    #[test]
    fn test_mutex_across_threads() {
        let m = Arc::new(Mutex::new(0usize));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        *m.lock() += 1;
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*m.lock(), 4000);
    }
}
