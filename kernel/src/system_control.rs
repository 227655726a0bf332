//! 平台内存控制器接口
//!
//! 安全系统资源只消费这里的接口，不关心安全内存在具体板子上如何划出。

use mm::{MemoryPool, Paddr, Vaddr};

use crate::error::KResult;

/// 平台内存控制器
pub trait SystemControl: Send + Sync {
    /// 在 `pool` 中为 `size` 字节安全内存需要向资源限额预留的量
    ///
    /// 必须是 `(size, pool)` 的纯函数：初始化与销毁各自独立调用它，
    /// 两次的结果必须相同，否则限额的记账会泄漏或多释放。
    fn calculate_required_secure_memory_size(&self, size: usize, pool: MemoryPool) -> usize;

    /// 从 `pool` 分配 `size` 字节安全内存，返回其堆虚拟地址
    fn allocate_secure_memory(&self, size: usize, pool: MemoryPool) -> KResult<Vaddr>;

    /// 释放 [`SystemControl::allocate_secure_memory`] 分配的安全内存
    fn free_secure_memory(&self, address: Vaddr, size: usize, pool: MemoryPool);

    /// 堆虚拟地址对应的物理地址
    fn heap_physical_address(&self, address: Vaddr) -> Paddr;
}
