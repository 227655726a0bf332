//! 页码抽象
//!
//! 页码是地址空间中页的索引。帧分配器以 [`Ppn`] 为单位工作，
//! 连续的一段物理页用 [`PpnRange`] 表示。

use crate::address::types::{AlignOps, Paddr, UsizeConvert};
use crate::config::PAGE_SIZE;

/// 页码 Trait
pub trait PageNum: UsizeConvert + PartialEq + PartialOrd + Eq + Ord {
    /// 此页码类型关联的地址类型
    type TAddress: AlignOps;

    /// 将页码增加给定的页数。
    fn step_by(&mut self, offset: usize) {
        *self = Self::from_usize(self.as_usize() + offset);
    }

    /// 将地址转换为页码（向下取整）。
    fn from_addr_floor(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_down_to_page().as_usize() / PAGE_SIZE)
    }

    /// 将地址转换为页码（向上取整）。
    ///
    /// 页的结束地址（例如 0x1000）得到下一页的页码（例如 1）。
    fn from_addr_ceil(addr: Self::TAddress) -> Self {
        Self::from_usize(addr.align_up_to_page().as_usize() / PAGE_SIZE)
    }

    /// 页的起始地址。
    fn start_addr(self) -> Self::TAddress {
        Self::TAddress::from_usize(self.as_usize() * PAGE_SIZE)
    }
}

/// 物理页码（Physical Page Number）
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Ppn(pub usize);

impl UsizeConvert for Ppn {
    fn as_usize(&self) -> usize {
        self.0
    }

    fn from_usize(value: usize) -> Self {
        Self(value)
    }
}

impl PageNum for Ppn {
    type TAddress = Paddr;
}

impl core::ops::Add<usize> for Ppn {
    type Output = Ppn;

    fn add(self, rhs: usize) -> Ppn {
        Ppn(self.0 + rhs)
    }
}

/// 页码范围 `[start, end)`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageNumRange<T: PageNum> {
    start: T,
    end: T,
}

impl<T: PageNum> PageNumRange<T> {
    /// 创建一个新的页码范围。
    pub fn new(start: T, end: T) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// 从起始页码和页数创建。
    pub fn from_start_len(start: T, len: usize) -> Self {
        Self {
            start,
            end: T::from_usize(start.as_usize() + len),
        }
    }

    /// 起始页码。
    pub fn start(&self) -> T {
        self.start
    }

    /// 结束页码（不包含）。
    pub fn end(&self) -> T {
        self.end
    }

    /// 范围内的页数。
    pub fn len(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    /// 范围是否为空。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 是否包含给定的页码。
    pub fn contains(&self, pn: T) -> bool {
        pn >= self.start && pn < self.end
    }

    /// 是否完整包含另一个范围。
    pub fn contains_range(&self, other: &Self) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// 两个范围是否重叠（相邻不算重叠）。
    pub fn overlaps(&self, other: &Self) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    /// 按升序迭代范围内的页码。
    pub fn iter(&self) -> impl Iterator<Item = T> + use<T> {
        (self.start.as_usize()..self.end.as_usize()).map(T::from_usize)
    }
}

/// 物理页码范围
pub type PpnRange = PageNumRange<Ppn>;

impl PpnRange {
    /// 范围的起始物理地址
    pub fn start_addr(&self) -> Paddr {
        self.start.start_addr()
    }

    /// 范围覆盖的字节数
    pub fn size(&self) -> usize {
        self.len() * PAGE_SIZE
    }
}
