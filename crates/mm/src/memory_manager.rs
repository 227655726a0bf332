//! 物理内存管理器
//!
//! 物理内存被划分为若干内存池（[`MemoryPool`]），每个池由一个
//! [`FrameAllocator`] 管理。内核堆是物理内存的线性映射，
//! [`MemoryManager::heap_virtual_address`] / [`MemoryManager::heap_physical_address`]
//! 负责两者之间的转换。

use crate::address::{Paddr, PageNum, Ppn, PpnRange, UsizeConvert, Vaddr};
use crate::config::{MemoryLayout, PAGE_SIZE};
use crate::error::{MmError, MmResult};
use crate::frame_allocator::FrameAllocator;

/// 物理内存池
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MemoryPool {
    /// 应用程序
    Application = 0,
    /// 库小程序（applet）
    Applet = 1,
    /// 系统
    System = 2,
    /// 系统（非安全）
    SystemNonSecure = 3,
}

impl MemoryPool {
    /// 内存池数量
    pub const COUNT: usize = 4;

    /// 按编号排列的所有内存池
    pub const ALL: [MemoryPool; Self::COUNT] = [
        MemoryPool::Application,
        MemoryPool::Applet,
        MemoryPool::System,
        MemoryPool::SystemNonSecure,
    ];
}

impl TryFrom<u32> for MemoryPool {
    type Error = MmError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::ALL
            .get(value as usize)
            .copied()
            .ok_or(MmError::InvalidAddress)
    }
}

/// 物理内存管理器
pub struct MemoryManager {
    layout: MemoryLayout,
    pools: [FrameAllocator; MemoryPool::COUNT],
}

impl MemoryManager {
    /// 按布局创建各内存池的帧分配器
    pub fn new(layout: MemoryLayout) -> Self {
        let pools = core::array::from_fn(|i| {
            let region = &layout.pools[i];
            FrameAllocator::new(region.start, region.size)
        });
        Self { layout, pools }
    }

    /// 内存布局
    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// 从 `pool` 分配 `num_pages` 个连续物理页，起始页号对齐到 `align_pages`
    pub fn allocate_and_open_continuous(
        &mut self,
        num_pages: usize,
        align_pages: usize,
        pool: MemoryPool,
    ) -> MmResult<Paddr> {
        if num_pages == 0 {
            return Err(MmError::InvalidSize);
        }
        let range = self.pools[pool as usize]
            .alloc_contig_frames_aligned(num_pages, align_pages)
            .ok_or(MmError::OutOfMemory)?;
        log::trace!(
            "mm: {:?} pool allocated {} pages at {:#x}",
            pool,
            num_pages,
            range.start_addr()
        );
        Ok(range.start_addr())
    }

    /// 释放从 `paddr` 开始的 `num_pages` 个物理页
    ///
    /// # Panics
    /// `paddr` 不属于任何内存池时 panic。
    pub fn close(&mut self, paddr: Paddr, num_pages: usize) {
        let start = Ppn::from_addr_floor(paddr);
        let pool = self
            .pool_of(paddr)
            .unwrap_or_else(|| panic!("mm: close of unmanaged address {:#x}", paddr));
        self.pools[pool as usize].dealloc_contig_frames(PpnRange::from_start_len(start, num_pages));
    }

    /// `paddr` 所属的内存池
    pub fn pool_of(&self, paddr: Paddr) -> Option<MemoryPool> {
        let ppn = Ppn::from_addr_floor(paddr);
        MemoryPool::ALL
            .into_iter()
            .find(|pool| self.pools[*pool as usize].contains(ppn))
    }

    /// 物理地址对应的堆虚拟地址
    pub fn heap_virtual_address(&self, paddr: Paddr) -> Vaddr {
        Vaddr(paddr.as_usize() + self.layout.heap_virtual_base.as_usize())
    }

    /// 堆虚拟地址对应的物理地址
    pub fn heap_physical_address(&self, vaddr: Vaddr) -> Paddr {
        debug_assert!(vaddr >= self.layout.heap_virtual_base);
        Paddr(vaddr - self.layout.heap_virtual_base)
    }

    /// 内存池的空闲字节数
    pub fn free_size(&self, pool: MemoryPool) -> usize {
        self.pools[pool as usize].free_frames() * PAGE_SIZE
    }

    /// 内存池的已用字节数
    pub fn used_size(&self, pool: MemoryPool) -> usize {
        self.pools[pool as usize].allocated_frames() * PAGE_SIZE
    }
}
