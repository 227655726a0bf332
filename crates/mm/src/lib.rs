//! 内存管理子系统
//!
//! 提供地址抽象、物理内存池，以及安全区域内部使用的分配器栈：
//!
//! - [`MemoryManager`]: 按内存池划分的物理帧分配与堆线性映射
//! - [`DynamicPageManager`]: 固定区间上的按页分配
//! - [`DynamicSlabHeap`] / [`PageTableSlabHeap`]: 从页管理器取页的 slab 堆
//! - [`DynamicResourceManager`] / [`PageTableManager`]: 向上暴露的 slab 管理器
//!
//! 除物理内存池外，这些分配器都不自带锁，由调用者保证互斥。

#![no_std]

extern crate alloc;

pub mod address;
pub mod config;
pub mod dynamic_page_manager;
pub mod error;
pub mod frame_allocator;
pub mod memory_manager;
pub mod page_table_heap;
pub mod resource_manager;
pub mod slab_heap;

pub use address::{AlignOps, PageNum, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr};
pub use config::{MemoryLayout, PAGE_SHIFT, PAGE_SIZE, PoolRegion};
pub use dynamic_page_manager::DynamicPageManager;
pub use error::{MmError, MmResult};
pub use frame_allocator::FrameAllocator;
pub use memory_manager::{MemoryManager, MemoryPool};
pub use page_table_heap::{
    PageTablePage, PageTableSlabHeap, RefCount, RefCountTable, calculate_reference_count_size,
};
pub use resource_manager::{DynamicResourceManager, PageTableManager};
pub use slab_heap::{DynamicSlabHeap, SlabObject};
