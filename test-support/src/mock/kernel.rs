//! 平台内存控制器的 Mock 实现
//!
//! `kernel` crate 在 `cfg(test)` 下为 [`MockSystemControl`] 实现 `SystemControl`。
//! Mock 只做记账：分配时从一个递增的基址顺序切出地址，不真正持有内存。

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 可编程的 Mock 平台内存控制器
pub struct MockSystemControl {
    next_address: AtomicUsize,
    extra_secure_size: AtomicUsize,
    fail_allocation: AtomicBool,
    return_zero_address: AtomicBool,
    allocate_calls: AtomicUsize,
    free_calls: AtomicUsize,
    outstanding_bytes: AtomicUsize,
    last_free_size: AtomicUsize,
}

impl MockSystemControl {
    /// 创建 Mock，分配地址从 `base` 开始
    pub const fn new(base: usize) -> Self {
        Self {
            next_address: AtomicUsize::new(base),
            extra_secure_size: AtomicUsize::new(0),
            fail_allocation: AtomicBool::new(false),
            return_zero_address: AtomicBool::new(false),
            allocate_calls: AtomicUsize::new(0),
            free_calls: AtomicUsize::new(0),
            outstanding_bytes: AtomicUsize::new(0),
            last_free_size: AtomicUsize::new(0),
        }
    }

    /// 计算安全内存大小时附加的字节数（模拟平台放大请求）
    pub fn set_extra_secure_size(&self, extra: usize) {
        self.extra_secure_size.store(extra, Ordering::SeqCst);
    }

    /// 附加的安全内存字节数
    pub fn extra_secure_size(&self) -> usize {
        self.extra_secure_size.load(Ordering::SeqCst)
    }

    /// 令后续分配失败
    pub fn set_fail_allocation(&self, fail: bool) {
        self.fail_allocation.store(fail, Ordering::SeqCst);
    }

    /// 分配是否被设置为失败
    pub fn fail_allocation(&self) -> bool {
        self.fail_allocation.load(Ordering::SeqCst)
    }

    /// 令后续分配“成功”但返回零地址（违反平台契约）
    pub fn set_return_zero_address(&self, zero: bool) {
        self.return_zero_address.store(zero, Ordering::SeqCst);
    }

    /// 记录一次分配，返回分配到的地址
    pub fn record_allocate(&self, size: usize, align: usize) -> usize {
        self.allocate_calls.fetch_add(1, Ordering::SeqCst);
        if self.return_zero_address.load(Ordering::SeqCst) {
            return 0;
        }
        self.outstanding_bytes.fetch_add(size, Ordering::SeqCst);
        let mut current = self.next_address.load(Ordering::SeqCst);
        loop {
            let start = (current + align - 1) & !(align - 1);
            match self.next_address.compare_exchange(
                current,
                start + size,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return start,
                Err(actual) => current = actual,
            }
        }
    }

    /// 记录一次释放
    pub fn record_free(&self, size: usize) {
        self.free_calls.fetch_add(1, Ordering::SeqCst);
        self.last_free_size.store(size, Ordering::SeqCst);
        self.outstanding_bytes.fetch_sub(size, Ordering::SeqCst);
    }

    /// 进入记账的分配调用次数
    pub fn allocate_calls(&self) -> usize {
        self.allocate_calls.load(Ordering::SeqCst)
    }

    /// 释放调用次数
    pub fn free_calls(&self) -> usize {
        self.free_calls.load(Ordering::SeqCst)
    }

    /// 尚未释放的字节数
    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding_bytes.load(Ordering::SeqCst)
    }

    /// 最近一次释放的大小
    pub fn last_free_size(&self) -> usize {
        self.last_free_size.load(Ordering::SeqCst)
    }
}
