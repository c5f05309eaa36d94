use crate::core::{PixelFormat, VideoFrame};
use egui::{ColorImage, Rect, TextureHandle, TextureOptions, Ui};
use log::debug;

/// egui 视频渲染器 - 把解码帧作为纹理画到播放表面
///
/// 纹理只在收到新帧时更新；没有新帧的重绘直接复用上一张纹理。
pub struct EguiVideoRenderer {
    texture: Option<TextureHandle>,
    last_pts: i64,
}

impl EguiVideoRenderer {
    pub fn new() -> Self {
        Self {
            texture: None,
            last_pts: -1,
        }
    }

    /// 用新帧更新纹理并渲染
    pub fn update_and_render(&mut self, ui: &mut Ui, frame: &VideoFrame, rect: Rect) {
        // 同一帧重复送入时不重传纹理（GPU 上传较贵）
        if self.texture.is_some() && frame.pts == self.last_pts {
            self.render_current(ui, rect);
            return;
        }

        debug!(
            "渲染视频帧: {}x{}, PTS: {}ms",
            frame.width, frame.height, frame.pts
        );

        // 解码泵保证帧已转换为 RGBA
        debug_assert_eq!(frame.format, PixelFormat::RGBA);

        let color_image = ColorImage::from_rgba_unmultiplied(
            [frame.width as usize, frame.height as usize],
            &frame.data,
        );

        match &mut self.texture {
            Some(handle) => handle.set(color_image, TextureOptions::LINEAR),
            None => {
                self.texture =
                    Some(ui.ctx()
                        .load_texture("video_frame", color_image, TextureOptions::LINEAR));
            }
        }
        self.last_pts = frame.pts;

        self.render_current(ui, rect);
    }

    /// 只重绘当前纹理（本次没有新帧时调用）
    pub fn render_current(&self, ui: &mut Ui, rect: Rect) {
        if let Some(texture) = &self.texture {
            // 计算显示尺寸，保持宽高比居中
            let size = texture.size_vec2();
            let video_aspect = size.x / size.y;
            let rect_aspect = rect.width() / rect.height();

            let display_size = if video_aspect > rect_aspect {
                // 视频更宽，以宽度为准
                egui::Vec2::new(rect.width(), rect.width() / video_aspect)
            } else {
                // 视频更高，以高度为准
                egui::Vec2::new(rect.height() * video_aspect, rect.height())
            };

            let display_rect = Rect::from_center_size(rect.center(), display_size);

            ui.allocate_ui_at_rect(display_rect, |ui| {
                ui.add(egui::Image::from_texture(texture).fit_to_exact_size(display_size));
            });
        }
    }
}

impl Default for EguiVideoRenderer {
    fn default() -> Self {
        Self::new()
    }
}
