//! 内存管理配置
//!
//! 页大小是固定的体系结构常量；物理内存池的划分与堆的线性映射基址
//! 由 [`MemoryLayout`] 描述，宿主内核可以替换默认布局。

use crate::address::{Paddr, Vaddr};
use crate::memory_manager::MemoryPool;

/// 页大小位数
pub const PAGE_SHIFT: usize = 12;

/// 页大小
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// 单个物理内存池的区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolRegion {
    /// 所属的内存池
    pub pool: MemoryPool,
    /// 起始物理地址（页对齐）
    pub start: Paddr,
    /// 字节数（页对齐）
    pub size: usize,
}

/// 物理内存布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    /// 各内存池的区间，按 [`MemoryPool`] 的顺序排列
    pub pools: [PoolRegion; MemoryPool::COUNT],
    /// 堆线性映射的虚拟基址：`vaddr = paddr + heap_virtual_base`
    pub heap_virtual_base: Vaddr,
}

impl MemoryLayout {
    /// DRAM 起始物理地址
    pub const DRAM_BASE: usize = 0x8000_0000;

    /// 由各池的大小依次排布出布局
    pub fn from_pool_sizes(sizes: [usize; MemoryPool::COUNT], heap_virtual_base: Vaddr) -> Self {
        let mut next = Paddr(Self::DRAM_BASE);
        let pools = core::array::from_fn(|i| {
            let region = PoolRegion {
                pool: MemoryPool::ALL[i],
                start: next,
                size: sizes[i],
            };
            next += sizes[i];
            region
        });
        Self {
            pools,
            heap_virtual_base,
        }
    }

    /// 指定内存池的区间
    pub fn region(&self, pool: MemoryPool) -> &PoolRegion {
        &self.pools[pool as usize]
    }
}

impl Default for MemoryLayout {
    /// 默认布局：Application 64 MiB，Applet 16 MiB，System 32 MiB，SystemNonSecure 16 MiB
    fn default() -> Self {
        const MIB: usize = 1024 * 1024;
        Self::from_pool_sizes(
            [64 * MIB, 16 * MIB, 32 * MIB, 16 * MIB],
            Vaddr(0xffff_ffc0_0000_0000),
        )
    }
}
