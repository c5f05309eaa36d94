use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 播放时钟 - 用于音视频同步
///
/// 音频是主时钟：正常播放期间只有音频渲染器通过 `advance` 推进时钟，
/// 推进量等于实际提交给设备的采样时长。视频调度线程只读。
/// 音频流先结束时切换到自由走时模式，改用墙钟外推，视频继续正常调度。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<ClockInner>,
}

struct ClockInner {
    /// 当前播放位置（微秒），读取无撕裂
    position_us: AtomicI64,
    /// 自由走时模式：音频结束后由墙钟外推
    freewheel: AtomicBool,
    /// 自由走时的锚点时刻（仅视频线程读，切换时写一次）
    anchor: Mutex<Instant>,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClockInner {
                position_us: AtomicI64::new(0),
                freewheel: AtomicBool::new(false),
                anchor: Mutex::new(Instant::now()),
            }),
        }
    }

    /// 获取当前播放时间（毫秒）
    pub fn now_ms(&self) -> i64 {
        self.now_us() / 1000
    }

    /// 获取当前播放时间（微秒）
    pub fn now_us(&self) -> i64 {
        let base = self.inner.position_us.load(Ordering::Acquire);
        if self.inner.freewheel.load(Ordering::Acquire) {
            let elapsed = self.inner.anchor.lock().elapsed();
            base + elapsed.as_micros() as i64
        } else {
            base
        }
    }

    /// 推进时钟 - 仅音频渲染器调用，推进量 = 提交采样数 / 采样率
    pub fn advance(&self, by: Duration) {
        self.inner
            .position_us
            .fetch_add(by.as_micros() as i64, Ordering::AcqRel);
    }

    /// 重置到指定位置（毫秒）- 仅在流开始时使用
    pub fn reset(&self, pts_ms: i64) {
        self.inner
            .position_us
            .store(pts_ms * 1000, Ordering::Release);
        *self.inner.anchor.lock() = Instant::now();
    }

    /// 切换到自由走时模式（音频流已结束，视频尚未播完）
    ///
    /// 幂等：重复调用不会重置锚点。
    pub fn begin_freewheel(&self) {
        if self
            .inner
            .freewheel
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            *self.inner.anchor.lock() = Instant::now();
        }
    }

    /// 是否处于自由走时模式
    pub fn is_freewheeling(&self) -> bool {
        self.inner.freewheel.load(Ordering::Acquire)
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn advance_accumulates() {
        let clock = PlaybackClock::new();
        assert_eq!(clock.now_ms(), 0);

        // 1024 采样 @ 48kHz ≈ 21333 微秒
        clock.advance(Duration::from_micros(21333));
        assert_eq!(clock.now_us(), 21333);

        clock.advance(Duration::from_micros(21333));
        assert_eq!(clock.now_us(), 42666);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn reset_sets_position() {
        let clock = PlaybackClock::new();
        clock.advance(Duration::from_millis(500));
        clock.reset(1234);
        assert_eq!(clock.now_ms(), 1234);
    }

    #[test]
    fn stable_without_advance() {
        let clock = PlaybackClock::new();
        clock.reset(100);
        thread::sleep(Duration::from_millis(20));
        // 非自由走时模式下，没人推进就不走
        assert_eq!(clock.now_ms(), 100);
    }

    #[test]
    fn freewheel_tracks_wall_clock() {
        let clock = PlaybackClock::new();
        clock.reset(1000);
        clock.begin_freewheel();
        thread::sleep(Duration::from_millis(30));
        let now = clock.now_ms();
        assert!(now >= 1020, "自由走时应随墙钟前进: {}", now);

        // 幂等：再次调用不回退
        clock.begin_freewheel();
        assert!(clock.now_ms() >= now);
    }
}
