//! 与安全资源子系统并列的两类外部协作者
//!
//! - [`broker`]: 库小程序（applet）与调用者之间的数据通道，只搬运不透明的字节缓冲
//! - [`controller`]: 按定时节拍把采样状态发布到共享内存的输入控制器
//!
//! 二者都不分配或管理内存资源。

#![no_std]

extern crate alloc;

pub mod broker;
pub mod controller;

pub use broker::{AppletBroker, AppletDataBroker};
pub use controller::{ControllerBase, Digitizer, DigitizerEntry, DigitizerSharedMemory, Lifo};
