use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("FFmpeg 错误: {0}")]
    FFmpegError(#[from] ffmpeg_next::Error),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("无法打开文件: {0}")]
    OpenError(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("无法找到音频流")]
    NoAudioStream,

    #[error("音频输出错误: {0}")]
    AudioError(String),

    #[error("队列已关闭")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, PlayerError>;
