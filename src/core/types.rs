/// 像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    RGBA,
}

/// 音频采样格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    F32,
}

/// 视频帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,      // CPU 内存数据
}

/// 音频帧数据
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub pts: i64,           // 显示时间戳（毫秒）
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub data: Vec<f32>,     // 交织采样，统一使用 f32 格式
}

/// 媒体信息
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub duration: i64,          // 总时长（毫秒）
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub video_codec: String,
    pub audio_codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// 播放事件 - 解码泵线程通过 channel 上报给管理器
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// 单个视频包解码失败，已跳过
    VideoPacketDropped(String),
    /// 单个音频包解码失败，已跳过
    AudioPacketDropped(String),
    /// 解码泵读完输入，EOS 标记已入队
    PumpFinished,
}
