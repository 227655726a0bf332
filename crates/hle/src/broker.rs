//! 库小程序数据通道
//!
//! 调用者把输入缓冲推给小程序，小程序取出处理后把结果推回，
//! 并通过 [`AppletBroker::signal_state_changed`] 通知调用者。
//! 缓冲内容对通道不透明。

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use sync::Mutex;

/// 小程序一侧看到的通道
pub trait AppletBroker {
    /// 取出调用者推给小程序的下一个缓冲
    fn pop_normal_data_to_applet(&self) -> Option<Vec<u8>>;

    /// 把结果缓冲推给调用者
    fn push_normal_data_from_applet(&self, data: Vec<u8>);

    /// 通知调用者小程序状态已改变
    fn signal_state_changed(&self);
}

#[derive(Debug, Default)]
struct Channels {
    to_applet: VecDeque<Vec<u8>>,
    from_applet: VecDeque<Vec<u8>>,
    state_changed: usize,
}

/// 内存中的双向数据通道
#[derive(Debug, Default)]
pub struct AppletDataBroker {
    channels: Mutex<Channels>,
}

impl AppletDataBroker {
    /// 创建空通道
    pub fn new() -> Self {
        Self::default()
    }

    /// 调用者一侧：推给小程序
    pub fn push_normal_data_to_applet(&self, data: Vec<u8>) {
        self.channels.lock().to_applet.push_back(data);
    }

    /// 调用者一侧：取出小程序推回的结果
    pub fn pop_normal_data_from_applet(&self) -> Option<Vec<u8>> {
        self.channels.lock().from_applet.pop_front()
    }

    /// 状态变化通知的次数
    pub fn state_changed_count(&self) -> usize {
        self.channels.lock().state_changed
    }
}

impl AppletBroker for AppletDataBroker {
    fn pop_normal_data_to_applet(&self) -> Option<Vec<u8>> {
        self.channels.lock().to_applet.pop_front()
    }

    fn push_normal_data_from_applet(&self, data: Vec<u8>) {
        self.channels.lock().from_applet.push_back(data);
    }

    fn signal_state_changed(&self) {
        let mut channels = self.channels.lock();
        channels.state_changed += 1;
        log::trace!("applet broker: state changed ({})", channels.state_changed);
    }
}
