//! 地址模块
//!
//! - [`Paddr`] / [`Vaddr`]：物理地址与内核堆虚拟地址
//! - [`Ppn`] / [`PpnRange`]：物理页码与连续页码范围
//! - [`UsizeConvert`] / [`AlignOps`]：与 usize 的转换和对齐操作
pub mod page_num;
pub mod types;

pub use page_num::{PageNum, PageNumRange, Ppn, PpnRange};
pub use types::{AlignOps, Paddr, UsizeConvert, Vaddr, align_down, align_up, is_aligned};
