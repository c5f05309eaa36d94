use crate::core::{
    AudioFrame, BoundedQueue, MediaInfo, PlaybackClock, PlayerEvent, Result, VideoFrame,
};
use crate::player::{
    AudioDecoder, AudioOutput, AudioRenderer, DecodePump, Demuxer, SchedulerPoll, VideoDecoder,
    VideoScheduler,
};
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// 音频队列容量（块）：典型块约 20ms，总计约 200~300ms 缓冲
const AUDIO_QUEUE_BLOCKS: usize = 16;
/// 视频队列容量按帧率取 ≈1 秒，并夹在这个范围内
const VIDEO_QUEUE_MIN_FRAMES: usize = 8;
const VIDEO_QUEUE_MAX_FRAMES: usize = 64;

/// 播放管理器 - 把解封装、解码泵、音频输出、视频调度接成一条流水线
///
/// 线程模型：解码泵线程（生产）、cpal 实时音频线程（消费+主时钟）、
/// 主线程（视频调度+呈现）。跨线程只共享两个有界队列、时钟和停止标志。
pub struct PlaybackManager {
    media_info: MediaInfo,
    clock: PlaybackClock,
    running: Arc<AtomicBool>,
    video_queue: BoundedQueue<VideoFrame>,
    audio_queue: BoundedQueue<AudioFrame>,
    scheduler: VideoScheduler,
    audio_output: AudioOutput,
    pump: Option<DecodePump>,
    events: Receiver<PlayerEvent>,
    underruns: Arc<AtomicU64>,
    audio_finished: Arc<AtomicBool>,
    video_finished: bool,
    video_decode_errors: u64,
    audio_decode_errors: u64,
    stopped: bool,
}

impl PlaybackManager {
    /// 打开媒体文件并启动整条流水线
    ///
    /// 所有致命设置错误（容器打开、缺流、编解码器打开、音频设备打开）
    /// 都在进入播放循环前从这里返回。
    pub fn open(path: &str) -> Result<Self> {
        let demuxer = Demuxer::open(path)?;
        let media_info = demuxer.media_info().clone();
        info!("媒体信息: {:?}", media_info);

        // 音频输出先就位，解码的重采样目标取设备实际配置
        let mut audio_output = AudioOutput::new(media_info.sample_rate, media_info.channels)?;
        let (actual_rate, actual_channels) = audio_output.get_config();

        let video_decoder = VideoDecoder::from_stream(demuxer.video_stream())?;
        let audio_decoder = AudioDecoder::from_stream_with_config(
            demuxer.audio_stream(),
            actual_rate,
            actual_channels,
        )?;

        // 队列容量：音频 ≈200ms，视频 ≈1 秒（按检测到的帧率）
        let video_capacity = if media_info.fps > 0.0 {
            (media_info.fps.round() as usize).clamp(VIDEO_QUEUE_MIN_FRAMES, VIDEO_QUEUE_MAX_FRAMES)
        } else {
            30
        };
        let video_queue: BoundedQueue<VideoFrame> = BoundedQueue::new(video_capacity);
        let audio_queue: BoundedQueue<AudioFrame> = BoundedQueue::new(AUDIO_QUEUE_BLOCKS);
        debug!(
            "队列容量: 视频 {} 帧, 音频 {} 块",
            video_queue.capacity(),
            audio_queue.capacity()
        );

        let clock = PlaybackClock::new();

        // 音频渲染器移交给设备回调；主时钟从此由音频推进
        let renderer = AudioRenderer::new(
            audio_queue.clone(),
            clock.clone(),
            actual_rate,
            actual_channels,
        );
        let underruns = renderer.underrun_counter();
        let audio_finished = renderer.finished_flag();
        audio_output.start(renderer)?;

        let scheduler = VideoScheduler::new(video_queue.clone(), clock.clone(), media_info.fps);

        let running = Arc::new(AtomicBool::new(true));
        let (event_tx, event_rx) = unbounded();
        let pump = DecodePump::spawn(
            demuxer,
            video_decoder,
            audio_decoder,
            video_queue.clone(),
            audio_queue.clone(),
            event_tx,
            running.clone(),
        );

        Ok(Self {
            media_info,
            clock,
            running,
            video_queue,
            audio_queue,
            scheduler,
            audio_output,
            pump: Some(pump),
            events: event_rx,
            underruns,
            audio_finished,
            video_finished: false,
            video_decode_errors: 0,
            audio_decode_errors: 0,
            stopped: false,
        })
    }

    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// 呈现线程每次重绘调用：收事件、维护时钟模式、调度下一帧
    pub fn poll_video(&mut self) -> SchedulerPoll {
        self.drain_events();

        // 音频先播完：时钟切换为自由走时，视频继续正常配速
        if self.audio_finished.load(Ordering::Acquire) && !self.clock.is_freewheeling() {
            debug!("音频流已播完，时钟切换为自由走时");
            self.clock.begin_freewheel();
        }

        let poll = self.scheduler.poll();
        if matches!(poll, SchedulerPoll::Finished) {
            self.video_finished = true;
        }
        poll
    }

    /// 两条流都播完（视频 EOS 且音频 EOS + 缓冲排空）
    pub fn is_finished(&self) -> bool {
        self.video_finished && self.audio_finished.load(Ordering::Acquire)
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            match event {
                // 泵线程已经打过 warn 日志，这里只做统计
                PlayerEvent::VideoPacketDropped(reason) => {
                    debug!("视频坏包: {}", reason);
                    self.video_decode_errors += 1;
                }
                PlayerEvent::AudioPacketDropped(reason) => {
                    debug!("音频坏包: {}", reason);
                    self.audio_decode_errors += 1;
                }
                PlayerEvent::PumpFinished => debug!("解码泵已结束，队列排空中"),
            }
        }
    }

    /// 有序关停：停泵 → 关队列（唤醒背压阻塞）→ 停音频 → 汇报统计
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        info!("停止播放");

        self.running.store(false, Ordering::SeqCst);
        debug!(
            "关停时队列残留: 视频 {} 帧, 音频 {} 块",
            self.video_queue.len(),
            self.audio_queue.len()
        );
        // 关闭队列，唤醒可能阻塞在 push 上的解码泵和回调里的消费者
        self.video_queue.close();
        self.audio_queue.close();

        if let Some(mut pump) = self.pump.take() {
            pump.join();
        }
        self.audio_output.stop();

        self.drain_events();
        let (displayed, dropped) = self.scheduler.stats();
        info!(
            "播放统计: 显示 {} 帧, 丢弃 {} 帧, 跳过坏包 视频 {} / 音频 {}, 音频下溢 {} 次, 时钟 {}ms",
            displayed,
            dropped,
            self.video_decode_errors,
            self.audio_decode_errors,
            self.underruns.load(Ordering::Relaxed),
            self.clock.now_ms()
        );
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.stop();
    }
}
