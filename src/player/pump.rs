use crate::core::{AudioFrame, BoundedQueue, PlayerEvent, StreamUnit, VideoFrame};
use crate::player::{AudioDecoder, Demuxer, VideoDecoder};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// 解码泵 - 读包、解码、转换、入队，整条生产侧在一个线程里
///
/// 背压完全来自有界队列：队列满时 `push` 阻塞，解码自然被
/// 消费速度限流。单个包解码失败记日志后跳过；读到输入结尾时
/// 刷新两个解码器，向两个队列推入 EOS 标记后退出。
pub struct DecodePump {
    handle: Option<thread::JoinHandle<()>>,
}

impl DecodePump {
    pub fn spawn(
        mut demuxer: Demuxer,
        mut video_decoder: VideoDecoder,
        mut audio_decoder: AudioDecoder,
        video_queue: BoundedQueue<VideoFrame>,
        audio_queue: BoundedQueue<AudioFrame>,
        events: Sender<PlayerEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let handle = thread::spawn(move || {
            info!("解码泵线程启动");
            let mut packet_count = 0u64;
            let mut clean_eof = false;

            'pump: while running.load(Ordering::SeqCst) {
                match demuxer.read_packet() {
                    Some((packet, true)) => {
                        packet_count += 1;
                        match video_decoder.decode(&packet) {
                            Ok(frames) => {
                                for frame in frames {
                                    // 队列满时在这里阻塞（背压）
                                    if video_queue.push(StreamUnit::Frame(frame)).is_err() {
                                        debug!("视频队列已关闭，解码泵退出");
                                        break 'pump;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("视频包解码失败（已跳过）: {}", e);
                                let _ = events.send(PlayerEvent::VideoPacketDropped(e.to_string()));
                            }
                        }
                    }
                    Some((packet, false)) => {
                        packet_count += 1;
                        match audio_decoder.decode(&packet) {
                            Ok(frames) => {
                                for frame in frames {
                                    if audio_queue.push(StreamUnit::Frame(frame)).is_err() {
                                        debug!("音频队列已关闭，解码泵退出");
                                        break 'pump;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("音频包解码失败（已跳过）: {}", e);
                                let _ = events.send(PlayerEvent::AudioPacketDropped(e.to_string()));
                            }
                        }
                    }
                    None => {
                        info!("文件读取完毕，共处理 {} 个包", packet_count);
                        clean_eof = true;
                        break;
                    }
                }
            }

            // 正常 EOF：刷新解码器，取出内部缓冲的尾帧
            if clean_eof {
                match video_decoder.flush() {
                    Ok(frames) => {
                        for frame in frames {
                            if video_queue.push(StreamUnit::Frame(frame)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!("视频解码器刷新失败: {}", e),
                }
                match audio_decoder.flush() {
                    Ok(frames) => {
                        for frame in frames {
                            if audio_queue.push(StreamUnit::Frame(frame)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => warn!("音频解码器刷新失败: {}", e),
                }
            }

            // 推入 EOS 标记（队列已关闭则忽略），通知管理器
            let _ = video_queue.push(StreamUnit::EndOfStream);
            let _ = audio_queue.push(StreamUnit::EndOfStream);
            let _ = events.send(PlayerEvent::PumpFinished);
            info!("解码泵线程结束");
        });

        Self {
            handle: Some(handle),
        }
    }

    /// 等待泵线程退出（调用前必须先关闭两个队列，否则可能卡在背压上）
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            debug!("解码泵线程已回收");
        }
    }
}
