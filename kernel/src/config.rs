//! 板级配置

use mm::MemoryLayout;

/// 安全内存的对齐粒度（System 池以外）
pub const SECURE_ALIGNMENT: usize = 128 * 1024;

/// 模拟板的配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    /// 物理内存布局
    pub layout: MemoryLayout,
    /// 非 System 池的安全内存对齐粒度
    pub secure_alignment: usize,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            layout: MemoryLayout::default(),
            secure_alignment: SECURE_ALIGNMENT,
        }
    }
}
