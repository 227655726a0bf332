//! 内核结果码
//!
//! 错误以 Horizon 内核的结果描述值编码，可通过 [`KernelError::raw()`]
//! 转换为返回给调用者的原始结果码。

use mm::MmError;

/// 内核模块号
pub const KERNEL_MODULE: u32 = 1;

/// 内核错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// 功能未实现 (33)
    NotImplemented,
    /// 大小无效 (101)
    InvalidSize,
    /// 地址无效 (102)
    InvalidAddress,
    /// 内核对象资源耗尽 (103)
    OutOfResource,
    /// 内存不足 (104)
    OutOfMemory,
    /// 枚举值无效 (120)
    InvalidEnumValue,
    /// 对象状态不允许此操作 (125)
    InvalidState,
    /// 超出资源限额 (132)
    LimitReached,
}

impl KernelError {
    /// 结果描述值
    pub const fn description(&self) -> u32 {
        match self {
            KernelError::NotImplemented => 33,
            KernelError::InvalidSize => 101,
            KernelError::InvalidAddress => 102,
            KernelError::OutOfResource => 103,
            KernelError::OutOfMemory => 104,
            KernelError::InvalidEnumValue => 120,
            KernelError::InvalidState => 125,
            KernelError::LimitReached => 132,
        }
    }

    /// 原始结果码：低 9 位为模块号，其上为描述值
    pub const fn raw(&self) -> u32 {
        KERNEL_MODULE | (self.description() << 9)
    }
}

impl From<MmError> for KernelError {
    fn from(err: MmError) -> Self {
        match err {
            MmError::OutOfMemory => KernelError::OutOfMemory,
            MmError::InvalidAddress => KernelError::InvalidAddress,
            MmError::InvalidSize => KernelError::InvalidSize,
            MmError::NotInitialized | MmError::AlreadyInitialized => KernelError::InvalidState,
        }
    }
}

/// 内核操作的结果类型
pub type KResult<T> = Result<T, KernelError>;
