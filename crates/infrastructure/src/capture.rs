//! 音频采集适配器
//!
//! 本地演示和测试用的采集流：不接真实麦克风，只维护设备锁的
//! 占用/释放语义，供录音状态机验证释放约定。

use tracing::debug;

use application::media::AudioCapture;

/// 无设备的采集流
pub struct NullAudioCapture {
    released: bool,
}

impl NullAudioCapture {
    pub fn new() -> Self {
        debug!("采集流已占用");
        Self { released: false }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Default for NullAudioCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCapture for NullAudioCapture {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!("采集流已释放");
        }
    }
}
