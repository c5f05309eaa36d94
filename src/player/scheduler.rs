use crate::core::{BoundedQueue, PlaybackClock, StreamUnit, VideoFrame};
use log::debug;
use std::time::Duration;

/// 提前容忍阈值：帧最多早到这么多毫秒仍立即显示
const AHEAD_TOLERANCE_MS: i64 = 10;
/// 等待时的安全余量，唤醒后帧刚好到期
const SAFETY_MARGIN_MS: i64 = 2;
/// 检测不到帧率时的保底帧间隔（≈30fps）
const FALLBACK_FRAME_INTERVAL_MS: i64 = 33;
/// 队列空时的短暂等待，给解码泵一点追上的机会
const POP_TIMEOUT: Duration = Duration::from_millis(5);

/// 单帧的同步决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// 帧已到期，立即显示
    Display,
    /// 帧还早，等待指定毫秒后再显示
    Wait(u64),
    /// 严重落后，丢弃不显示
    Drop,
}

/// 一次调度的结果
#[derive(Debug, PartialEq)]
pub enum SchedulerPoll {
    /// 该帧现在显示
    Frame(VideoFrame),
    /// 下一帧未到期，指定毫秒后再来
    WaitMs(u64),
    /// 队列暂时无帧（解码没跟上）
    Idle,
    /// 视频流已播完
    Finished,
}

/// 视频调度器 - 在呈现线程上按音频主时钟决定每帧的去留
///
/// 最多持有一个"已出队但未到期"的帧；帧的所有权在
/// 队列 → 调度器 → 呈现表面之间逐段转移，绝不跨阶段共享。
pub struct VideoScheduler {
    queue: BoundedQueue<VideoFrame>,
    clock: PlaybackClock,
    pending: Option<VideoFrame>,
    /// 落后丢帧阈值 = 2 × 检测到的帧间隔
    drop_threshold_ms: i64,
    finished: bool,
    displayed: u64,
    dropped: u64,
}

impl VideoScheduler {
    pub fn new(queue: BoundedQueue<VideoFrame>, clock: PlaybackClock, fps: f64) -> Self {
        let frame_interval = if fps > 0.0 {
            (1000.0 / fps) as i64
        } else {
            FALLBACK_FRAME_INTERVAL_MS
        };
        Self {
            queue,
            clock,
            pending: None,
            drop_threshold_ms: frame_interval * 2,
            finished: false,
            displayed: 0,
            dropped: 0,
        }
    }

    /// 单帧决策：delta = 帧 PTS - 当前时钟
    pub fn decide(&self, delta_ms: i64) -> SyncAction {
        if delta_ms > AHEAD_TOLERANCE_MS {
            SyncAction::Wait((delta_ms - SAFETY_MARGIN_MS).max(1) as u64)
        } else if delta_ms < -self.drop_threshold_ms {
            SyncAction::Drop
        } else {
            SyncAction::Display
        }
    }

    /// 调度下一帧 - 呈现线程每次重绘时调用，最多阻塞一个短超时
    pub fn poll(&mut self) -> SchedulerPoll {
        if self.finished {
            return SchedulerPoll::Finished;
        }

        loop {
            let frame = match self.pending.take() {
                Some(frame) => frame,
                None => match self.queue.pop_timeout(POP_TIMEOUT) {
                    Ok(Some(StreamUnit::Frame(frame))) => frame,
                    Ok(Some(StreamUnit::EndOfStream)) => {
                        self.finished = true;
                        return SchedulerPoll::Finished;
                    }
                    Ok(None) => return SchedulerPoll::Idle,
                    Err(_) => {
                        // 队列关闭（关停中）
                        self.finished = true;
                        return SchedulerPoll::Finished;
                    }
                },
            };

            let delta = frame.pts - self.clock.now_ms();
            match self.decide(delta) {
                SyncAction::Display => {
                    self.displayed += 1;
                    return SchedulerPoll::Frame(frame);
                }
                SyncAction::Wait(ms) => {
                    // 未到期的帧留在调度器手里，不退回队列
                    self.pending = Some(frame);
                    return SchedulerPoll::WaitMs(ms);
                }
                SyncAction::Drop => {
                    debug!("丢弃严重落后的视频帧: PTS={}ms, 落后={}ms", frame.pts, -delta);
                    self.dropped += 1;
                    // 继续取下一帧
                }
            }
        }
    }

    /// (已显示帧数, 已丢弃帧数)
    pub fn stats(&self) -> (u64, u64) {
        (self.displayed, self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PixelFormat;

    fn make_frame(pts: i64) -> VideoFrame {
        VideoFrame {
            pts,
            width: 2,
            height: 2,
            format: PixelFormat::RGBA,
            data: vec![0; 16],
        }
    }

    fn make_scheduler(fps: f64) -> (VideoScheduler, BoundedQueue<VideoFrame>, PlaybackClock) {
        let queue: BoundedQueue<VideoFrame> = BoundedQueue::new(16);
        let clock = PlaybackClock::new();
        let scheduler = VideoScheduler::new(queue.clone(), clock.clone(), fps);
        (scheduler, queue, clock)
    }

    #[test]
    fn due_frames_display_early_frame_waits() {
        // 30fps → 帧间隔 33ms → 落后阈值 66ms
        let (mut scheduler, queue, clock) = make_scheduler(30.0);
        for pts in [0, 33, 66, 100] {
            queue.push(StreamUnit::Frame(make_frame(pts))).unwrap();
        }
        clock.reset(50);

        // 0ms 和 33ms 已到期且在落后阈值内，立即显示
        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(f) if f.pts == 0));
        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(f) if f.pts == 33));

        // 66ms 还早 16ms，要求等待
        match scheduler.poll() {
            SchedulerPoll::WaitMs(ms) => assert!(ms >= 1 && ms <= 16, "等待时长异常: {}", ms),
            other => panic!("期望 WaitMs，得到 {:?}", other),
        }

        // 时间到了，之前持有的帧显示出来
        clock.reset(66);
        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(f) if f.pts == 66));

        clock.reset(100);
        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(f) if f.pts == 100));

        // 四帧全部显示，零丢帧
        assert_eq!(scheduler.stats(), (4, 0));
    }

    #[test]
    fn critically_late_frame_is_dropped() {
        let (mut scheduler, queue, clock) = make_scheduler(30.0);
        queue.push(StreamUnit::Frame(make_frame(0))).unwrap();
        clock.reset(500);

        // delta = -500ms，远超 66ms 落后阈值 → 丢弃，队列空则 Idle
        assert_eq!(scheduler.poll(), SchedulerPoll::Idle);
        assert_eq!(scheduler.stats(), (0, 1));
    }

    #[test]
    fn late_frame_skipped_until_current_one() {
        let (mut scheduler, queue, clock) = make_scheduler(30.0);
        queue.push(StreamUnit::Frame(make_frame(0))).unwrap();
        queue.push(StreamUnit::Frame(make_frame(480))).unwrap();
        clock.reset(500);

        // 旧帧丢弃后继续取到接近当前时间的帧
        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(f) if f.pts == 480));
        assert_eq!(scheduler.stats(), (1, 1));
    }

    #[test]
    fn decide_thresholds() {
        let (scheduler, _queue, _clock) = make_scheduler(30.0);

        assert_eq!(scheduler.decide(0), SyncAction::Display);
        assert_eq!(scheduler.decide(10), SyncAction::Display);
        assert_eq!(scheduler.decide(-66), SyncAction::Display);
        assert_eq!(scheduler.decide(11), SyncAction::Wait(9));
        assert_eq!(scheduler.decide(-67), SyncAction::Drop);
    }

    #[test]
    fn end_of_stream_finishes() {
        let (mut scheduler, queue, _clock) = make_scheduler(25.0);
        queue.push(StreamUnit::Frame(make_frame(0))).unwrap();
        queue.push(StreamUnit::EndOfStream).unwrap();

        assert!(matches!(scheduler.poll(), SchedulerPoll::Frame(_)));
        assert_eq!(scheduler.poll(), SchedulerPoll::Finished);
        // 终态保持
        assert_eq!(scheduler.poll(), SchedulerPoll::Finished);
    }

    #[test]
    fn closed_queue_finishes() {
        let (mut scheduler, queue, _clock) = make_scheduler(25.0);
        queue.close();
        assert_eq!(scheduler.poll(), SchedulerPoll::Finished);
    }
}
