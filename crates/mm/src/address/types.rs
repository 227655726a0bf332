//! 地址类型
//!
//! [`Paddr`] 与 [`Vaddr`] 都是对 `usize` 的透明包装，
//! 区分二者是为了让“堆虚拟地址 ↔ 物理地址”的转换在类型上显式出现。

use core::fmt;
use core::ops::{Add, AddAssign, Sub};

use crate::config::PAGE_SIZE;

/// 与 `usize` 互相转换
pub trait UsizeConvert: Copy {
    /// 转换为 usize
    fn as_usize(&self) -> usize;
    /// 从 usize 构造
    fn from_usize(value: usize) -> Self;
}

/// 将 `value` 向上对齐到 `align`（必须是 2 的幂）
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// 将 `value` 向下对齐到 `align`（必须是 2 的幂）
#[inline]
pub const fn align_down(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    value & !(align - 1)
}

/// `value` 是否对齐到 `align`（必须是 2 的幂）
#[inline]
pub const fn is_aligned(value: usize, align: usize) -> bool {
    debug_assert!(align.is_power_of_two());
    value & (align - 1) == 0
}

/// 地址对齐操作
pub trait AlignOps: UsizeConvert {
    /// 向上对齐
    fn align_up(self, align: usize) -> Self {
        Self::from_usize(align_up(self.as_usize(), align))
    }

    /// 向下对齐
    fn align_down(self, align: usize) -> Self {
        Self::from_usize(align_down(self.as_usize(), align))
    }

    /// 是否对齐
    fn is_aligned(self, align: usize) -> bool {
        is_aligned(self.as_usize(), align)
    }

    /// 向上对齐到页边界
    fn align_up_to_page(self) -> Self {
        self.align_up(PAGE_SIZE)
    }

    /// 向下对齐到页边界
    fn align_down_to_page(self) -> Self {
        self.align_down(PAGE_SIZE)
    }

    /// 是否页对齐
    fn is_page_aligned(self) -> bool {
        self.is_aligned(PAGE_SIZE)
    }
}

/// 为地址类型实现 `UsizeConvert`、`AlignOps` 与常用运算符
macro_rules! impl_address {
    ($type:ident) => {
        impl UsizeConvert for $type {
            fn as_usize(&self) -> usize {
                self.0
            }

            fn from_usize(value: usize) -> Self {
                Self(value)
            }
        }

        impl AlignOps for $type {}

        impl $type {
            /// 空地址
            pub const fn null() -> Self {
                Self(0)
            }

            /// 是否为空地址
            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl Add<usize> for $type {
            type Output = Self;

            fn add(self, rhs: usize) -> Self {
                Self(self.0 + rhs)
            }
        }

        impl AddAssign<usize> for $type {
            fn add_assign(&mut self, rhs: usize) {
                self.0 += rhs;
            }
        }

        impl Sub<usize> for $type {
            type Output = Self;

            fn sub(self, rhs: usize) -> Self {
                Self(self.0 - rhs)
            }
        }

        /// 两个地址之差（字节数）
        impl Sub<$type> for $type {
            type Output = usize;

            fn sub(self, rhs: $type) -> usize {
                self.0 - rhs.0
            }
        }

        impl fmt::LowerHex for $type {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::LowerHex::fmt(&self.0, f)
            }
        }
    };
}

/// 物理地址
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Paddr(pub usize);
impl_address!(Paddr);

/// 虚拟地址（内核堆的线性映射区）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Vaddr(pub usize);
impl_address!(Vaddr);
