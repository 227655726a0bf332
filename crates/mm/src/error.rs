//! 内存管理错误类型

/// 内存管理操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    /// 内存耗尽：页源或物理内存池无法再提供页
    OutOfMemory,
    /// 地址未按要求对齐或不在管理范围内
    InvalidAddress,
    /// 大小为零或未按要求对齐
    InvalidSize,
    /// 分配器尚未初始化
    NotInitialized,
    /// 分配器已经初始化过
    AlreadyInitialized,
}

/// 内存管理操作的结果类型
pub type MmResult<T> = Result<T, MmError>;
