use crate::player::{PlaybackManager, SchedulerPoll};
use crate::renderer::EguiVideoRenderer;
use egui::Context;
use log::info;
use std::time::Duration;

/// 重绘节拍上限：空闲和等待期也保持 ~60fps 的调度轮询
const REPAINT_INTERVAL: Duration = Duration::from_millis(16);

/// 播放器应用 - 单一播放表面，主线程即视频呈现线程
pub struct PlayerApp {
    manager: PlaybackManager,
    renderer: EguiVideoRenderer,
    close_sent: bool,
}

impl PlayerApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, manager: PlaybackManager) -> Self {
        Self {
            manager,
            renderer: EguiVideoRenderer::new(),
            close_sent: false,
        }
    }
}

impl eframe::App for PlayerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        // 按音频主时钟调度下一帧视频
        let mut repaint_after = REPAINT_INTERVAL;
        let new_frame = match self.manager.poll_video() {
            SchedulerPoll::Frame(frame) => Some(frame),
            SchedulerPoll::WaitMs(ms) => {
                // 下一帧未到期：等它到期（或到节拍上限）再重绘
                repaint_after = repaint_after.min(Duration::from_millis(ms));
                None
            }
            SchedulerPoll::Idle => None,
            SchedulerPoll::Finished => {
                // 视频播完；等音频缓冲也排空后关闭窗口
                if self.manager.is_finished() && !self.close_sent {
                    info!("播放结束，关闭窗口");
                    self.close_sent = true;
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
                None
            }
        };

        // 主视频区域 - 占满整个窗口
        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::BLACK))
            .show(ctx, |ui| {
                let rect = ui.available_rect_before_wrap();
                match &new_frame {
                    Some(frame) => self.renderer.update_and_render(ui, frame, rect),
                    None => self.renderer.render_current(ui, rect),
                }
            });

        ctx.request_repaint_after(repaint_after);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("播放器退出");
        self.manager.stop();
    }
}
