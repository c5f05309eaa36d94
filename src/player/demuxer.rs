use crate::core::{MediaInfo, PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::{format, media};
use log::{debug, info};

/// 解封装器 - 负责读取媒体文件并分离音视频流
pub struct Demuxer {
    input_ctx: format::context::Input,
    video_stream_index: usize,
    audio_stream_index: usize,
    media_info: MediaInfo, // 缓存媒体信息
}

impl Demuxer {
    /// 打开本地媒体文件
    ///
    /// 视频流和音频流都是必需的，缺任何一个都是致命错误。
    pub fn open(path: &str) -> Result<Self> {
        info!("正在打开文件: {}", path);

        let input_ctx = format::input(&path)
            .map_err(|e| PlayerError::OpenError(format!("无法打开文件 {}: {}", path, e)))?;

        // 查找视频流和音频流
        let video_stream_index = input_ctx
            .streams()
            .best(media::Type::Video)
            .map(|s| s.index())
            .ok_or(PlayerError::NoVideoStream)?;

        let audio_stream_index = input_ctx
            .streams()
            .best(media::Type::Audio)
            .map(|s| s.index())
            .ok_or(PlayerError::NoAudioStream)?;

        debug!("视频流索引: {}", video_stream_index);
        debug!("音频流索引: {}", audio_stream_index);

        let mut demuxer = Self {
            input_ctx,
            video_stream_index,
            audio_stream_index,
            media_info: MediaInfo {
                duration: 0,
                width: 0,
                height: 0,
                fps: 0.0,
                video_codec: String::new(),
                audio_codec: String::new(),
                sample_rate: 0,
                channels: 0,
            },
        };
        demuxer.media_info = demuxer.extract_media_info()?;

        Ok(demuxer)
    }

    /// 提取媒体信息（内部使用）
    fn extract_media_info(&self) -> Result<MediaInfo> {
        let video_stream = self
            .input_ctx
            .stream(self.video_stream_index)
            .ok_or(PlayerError::NoVideoStream)?;

        let video_params = video_stream.parameters();
        let video_codec_name = video_params.id().name().to_string();

        let decoder = ffmpeg::codec::context::Context::from_parameters(video_params)?;
        let video_decoder = decoder.decoder().video()?;

        let width = video_decoder.width();
        let height = video_decoder.height();
        let fps = video_stream.avg_frame_rate();
        let fps = if fps.denominator() != 0 {
            fps.numerator() as f64 / fps.denominator() as f64
        } else {
            0.0
        };

        let duration = self.input_ctx.duration() / 1000; // 微秒转毫秒

        let audio_stream = self
            .input_ctx
            .stream(self.audio_stream_index)
            .ok_or(PlayerError::NoAudioStream)?;
        let audio_params = audio_stream.parameters();
        let audio_codec_name = audio_params.id().name().to_string();

        let decoder = ffmpeg::codec::context::Context::from_parameters(audio_params)?;
        let audio_decoder = decoder.decoder().audio()?;

        Ok(MediaInfo {
            duration,
            width,
            height,
            fps,
            video_codec: video_codec_name,
            audio_codec: audio_codec_name,
            sample_rate: audio_decoder.rate(),
            channels: audio_decoder.channels(),
        })
    }

    /// 获取视频流
    pub fn video_stream(&self) -> format::stream::Stream {
        self.input_ctx.stream(self.video_stream_index).unwrap()
    }

    /// 获取音频流
    pub fn audio_stream(&self) -> format::stream::Stream {
        self.input_ctx.stream(self.audio_stream_index).unwrap()
    }

    /// 读取下一个数据包
    ///
    /// 返回 (packet, is_video)；其他流的包直接跳过；None 表示输入结束。
    pub fn read_packet(&mut self) -> Option<(ffmpeg::Packet, bool)> {
        loop {
            match self.input_ctx.packets().next() {
                Some((stream, packet)) => {
                    let index = stream.index();
                    if index == self.video_stream_index {
                        return Some((packet, true));
                    } else if index == self.audio_stream_index {
                        return Some((packet, false));
                    }
                    // 跳过其他流
                }
                None => return None,
            }
        }
    }

    /// 获取媒体信息
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }
}
