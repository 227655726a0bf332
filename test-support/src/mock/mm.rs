//! 内存管理相关操作的 Mock 实现

/// Mock 的堆地址映射
///
/// 采用“恒等映射”（vaddr == paddr），便于在测试中直接比较地址。
pub struct MockMmOps;

impl MockMmOps {
    pub const fn new() -> Self {
        Self
    }

    /// 堆虚拟地址转换为物理地址（恒等映射）
    pub fn heap_physical_address(&self, vaddr: usize) -> usize {
        vaddr
    }

    /// 物理地址转换为堆虚拟地址（恒等映射）
    pub fn heap_virtual_address(&self, paddr: usize) -> usize {
        paddr
    }

    /// 页大小
    pub fn page_size(&self) -> usize {
        4096
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_OPS: MockMmOps = MockMmOps::new();
