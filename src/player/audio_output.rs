use crate::core::{
    AudioFrame, BoundedQueue, PlaybackClock, PlayerError, Result, SampleFormat, StreamUnit,
};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig, SupportedStreamConfigRange};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 音频渲染器 - 在 cpal 实时回调上运行的采样填充状态机
///
/// 回调路径绝不阻塞：持有的块先排空，块耗尽后用 `try_pop` 取下一块，
/// 队列空时填静音（下溢）且不推进时钟。时钟推进量严格等于
/// 实际提交给设备的采样时长，这就是整个播放器的主时钟。
pub struct AudioRenderer {
    queue: BoundedQueue<AudioFrame>,
    clock: PlaybackClock,
    channels: usize,
    sample_rate: u32,
    /// 当前持有的块与其中已消费的采样偏移
    held: Option<AudioFrame>,
    cursor: usize,
    /// 是否已消费过第一个块（之前的空队列属于预填充，不算下溢）
    started: bool,
    /// 已提交的每声道采样总数（整数微秒换算，避免舍入漂移）
    frames_consumed: u64,
    advanced_us: i64,
    underruns: Arc<AtomicU64>,
    finished: Arc<AtomicBool>,
}

impl AudioRenderer {
    pub fn new(
        queue: BoundedQueue<AudioFrame>,
        clock: PlaybackClock,
        sample_rate: u32,
        channels: u16,
    ) -> Self {
        Self {
            queue,
            clock,
            channels: channels as usize,
            sample_rate,
            held: None,
            cursor: 0,
            started: false,
            frames_consumed: 0,
            advanced_us: 0,
            underruns: Arc::new(AtomicU64::new(0)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 下溢计数器句柄（管理器在主线程读取）
    pub fn underrun_counter(&self) -> Arc<AtomicU64> {
        self.underruns.clone()
    }

    /// 播放完成标志句柄（收到 EOS 且缓冲排空后置位）
    pub fn finished_flag(&self) -> Arc<AtomicBool> {
        self.finished.clone()
    }

    /// 填充设备输出缓冲区 - cpal 回调直接调用
    pub fn fill(&mut self, out: &mut [f32]) {
        let mut filled = 0usize;

        while filled < out.len() && !self.finished.load(Ordering::Relaxed) {
            if self.held.is_none() {
                match self.queue.try_pop() {
                    Ok(Some(StreamUnit::Frame(frame))) => {
                        // 块在入队前已按设备配置重采样
                        debug_assert_eq!(frame.format, SampleFormat::F32);
                        debug_assert_eq!(frame.sample_rate, self.sample_rate);
                        debug_assert_eq!(frame.channels as usize, self.channels);
                        if !self.started {
                            // 首个音频块：以它的 PTS 作为时钟基准，
                            // 兼容不从 0 开始的流
                            self.started = true;
                            self.clock.reset(frame.pts);
                        }
                        self.held = Some(frame);
                        self.cursor = 0;
                    }
                    Ok(Some(StreamUnit::EndOfStream)) => {
                        self.finished.store(true, Ordering::Release);
                        break;
                    }
                    Ok(None) => {
                        // 队列空：下溢，剩余填静音，时钟不动
                        if self.started {
                            self.underruns.fetch_add(1, Ordering::Relaxed);
                        }
                        break;
                    }
                    Err(_) => {
                        // 队列已关闭（关停中），安静退出
                        self.finished.store(true, Ordering::Release);
                        break;
                    }
                }
            }

            let mut exhausted = false;
            if let Some(frame) = &self.held {
                let available = frame.data.len() - self.cursor;
                let want = out.len() - filled;
                let n = available.min(want);
                out[filled..filled + n]
                    .copy_from_slice(&frame.data[self.cursor..self.cursor + n]);
                filled += n;
                self.cursor += n;
                exhausted = self.cursor >= frame.data.len();
            }
            if exhausted {
                // 块已排空，在此释放所有权
                self.held = None;
            }
        }

        // 剩余部分填充静音
        for sample in &mut out[filled..] {
            *sample = 0.0;
        }

        // 按实际提交的采样数推进时钟
        if filled > 0 {
            self.frames_consumed += (filled / self.channels) as u64;
            let target_us =
                (self.frames_consumed * 1_000_000 / self.sample_rate as u64) as i64;
            let delta = target_us - self.advanced_us;
            if delta > 0 {
                self.clock.advance(Duration::from_micros(delta as u64));
                self.advanced_us = target_us;
            }
        }
    }
}

/// 音频输出 - 使用 cpal 播放音频
pub struct AudioOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
}

impl AudioOutput {
    /// 打开音频输出设备（支持非标准配置自动回退）
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self> {
        info!("初始化音频输出: {} Hz, {} 声道", sample_rate, channels);

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::AudioError("无法找到音频输出设备".to_string()))?;

        debug!("使用音频设备: {}", device.name().unwrap_or_default());

        // 尝试使用请求的配置
        let mut config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        if !Self::device_supports(&device, &config)? {
            warn!(
                "音频设备不支持 {} Hz, {} 声道配置，回退到标准配置",
                sample_rate, channels
            );

            let fallback_configs = [
                (48000, 2), // 最常见
                (44100, 2), // CD 音质
                (48000, 1),
                (44100, 1),
            ];

            let mut found_fallback = false;
            for (fb_rate, fb_channels) in fallback_configs {
                let fb_config = StreamConfig {
                    channels: fb_channels,
                    sample_rate: cpal::SampleRate(fb_rate),
                    buffer_size: cpal::BufferSize::Default,
                };
                if Self::device_supports(&device, &fb_config)? {
                    info!("使用回退配置: {} Hz, {} 声道", fb_rate, fb_channels);
                    config = fb_config;
                    found_fallback = true;
                    break;
                }
            }

            if !found_fallback {
                return Err(PlayerError::AudioError(format!(
                    "音频设备不支持任何标准配置 (原请求: {} Hz, {} 声道)",
                    sample_rate, channels
                )));
            }
        }

        Ok(Self {
            device,
            config,
            stream: None,
        })
    }

    fn device_supports(device: &Device, config: &StreamConfig) -> Result<bool> {
        let supported_configs = device
            .supported_output_configs()
            .map_err(|e| PlayerError::AudioError(format!("无法获取支持的音频配置: {}", e)))?;

        for supported in supported_configs {
            if Self::is_config_compatible(config, &supported) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// 检查配置是否兼容
    fn is_config_compatible(config: &StreamConfig, supported: &SupportedStreamConfigRange) -> bool {
        let rate_in_range = config.sample_rate.0 >= supported.min_sample_rate().0
            && config.sample_rate.0 <= supported.max_sample_rate().0;

        let channels_match = config.channels == supported.channels();

        rate_in_range && channels_match
    }

    /// 启动音频流，渲染器移交给实时回调
    pub fn start(&mut self, mut renderer: AudioRenderer) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.fill(data);
                },
                move |err| {
                    error!("音频流错误: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::AudioError(format!("创建音频流失败: {}", e)))?;

        stream
            .play()
            .map_err(|e| PlayerError::AudioError(format!("启动音频流失败: {}", e)))?;

        self.stream = Some(stream);
        info!("音频输出已启动");

        Ok(())
    }

    /// 停止播放并释放设备流
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            info!("音频输出已停止");
        }
    }

    /// 获取实际使用的音频配置
    pub fn get_config(&self) -> (u32, u16) {
        (self.config.sample_rate.0, self.config.channels)
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SampleFormat;

    // 采样率取 1000 便于换算：1 个每声道采样 = 1000 微秒
    const TEST_RATE: u32 = 1000;

    fn make_frame(pts: i64, samples: Vec<f32>) -> AudioFrame {
        AudioFrame {
            pts,
            sample_rate: TEST_RATE,
            channels: 2,
            format: SampleFormat::F32,
            data: samples,
        }
    }

    fn make_renderer() -> (AudioRenderer, BoundedQueue<AudioFrame>, PlaybackClock) {
        let queue: BoundedQueue<AudioFrame> = BoundedQueue::new(8);
        let clock = PlaybackClock::new();
        let renderer = AudioRenderer::new(queue.clone(), clock.clone(), TEST_RATE, 2);
        (renderer, queue, clock)
    }

    #[test]
    fn partial_block_drains_exactly() {
        let (mut renderer, queue, clock) = make_renderer();
        let underruns = renderer.underrun_counter();

        // 6 个采样（3 个立体声帧），请求 10 个采样
        queue
            .push(StreamUnit::Frame(make_frame(
                0,
                vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            )))
            .unwrap();

        let mut out = [9.0f32; 10];
        renderer.fill(&mut out);

        assert_eq!(&out[..6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        // 剩余为静音，不能越界写
        assert_eq!(&out[6..], &[0.0, 0.0, 0.0, 0.0]);
        // 时钟只按实际消费的 3 帧推进
        assert_eq!(clock.now_us(), 3000);
        // 块排空后队列已空，算一次下溢
        assert_eq!(underruns.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn spans_multiple_blocks_without_gap() {
        let (mut renderer, queue, clock) = make_renderer();
        let underruns = renderer.underrun_counter();

        queue
            .push(StreamUnit::Frame(make_frame(0, vec![1.0, 2.0, 3.0, 4.0])))
            .unwrap();
        queue
            .push(StreamUnit::Frame(make_frame(2, vec![5.0, 6.0, 7.0, 8.0])))
            .unwrap();

        let mut out = [0.0f32; 8];
        renderer.fill(&mut out);

        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        // 8 个采样 = 4 个立体声帧
        assert_eq!(clock.now_us(), 4000);
        // 请求被完全满足，不算下溢
        assert_eq!(underruns.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn empty_queue_before_start_is_not_underrun() {
        let (mut renderer, _queue, clock) = make_renderer();
        let underruns = renderer.underrun_counter();

        let mut out = [1.0f32; 4];
        renderer.fill(&mut out);

        // 预填充阶段：静音，无下溢计数，时钟不动
        assert_eq!(out, [0.0; 4]);
        assert_eq!(underruns.load(Ordering::Relaxed), 0);
        assert_eq!(clock.now_us(), 0);
    }

    #[test]
    fn first_block_sets_clock_baseline() {
        let (mut renderer, queue, clock) = make_renderer();

        queue
            .push(StreamUnit::Frame(make_frame(500, vec![0.1, 0.2])))
            .unwrap();

        let mut out = [0.0f32; 2];
        renderer.fill(&mut out);

        // 基准 500ms + 1 帧 (1000 微秒)
        assert_eq!(clock.now_us(), 501_000);
    }

    #[test]
    fn end_of_stream_signals_completion() {
        let (mut renderer, queue, clock) = make_renderer();
        let finished = renderer.finished_flag();

        queue.push(StreamUnit::Frame(make_frame(0, vec![1.0, 2.0]))).unwrap();
        queue.push(StreamUnit::EndOfStream).unwrap();

        let mut out = [7.0f32; 6];
        renderer.fill(&mut out);

        assert_eq!(&out[..2], &[1.0, 2.0]);
        assert_eq!(&out[2..], &[0.0, 0.0, 0.0, 0.0]);
        assert!(finished.load(Ordering::Acquire));
        assert_eq!(clock.now_us(), 1000);

        // 完成后继续回调只产出静音
        let mut out2 = [3.0f32; 4];
        renderer.fill(&mut out2);
        assert_eq!(out2, [0.0; 4]);
        assert_eq!(clock.now_us(), 1000);
    }
}
