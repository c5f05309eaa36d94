use anyhow::Result;
use log::info;

mod app;
mod core;
mod player;
mod renderer;

use app::PlayerApp;
use player::PlaybackManager;

fn main() -> Result<()> {
    // 初始化日志
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    // 命令行只接受一个参数：媒体文件路径
    let path = match std::env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("用法: lethal_player <媒体文件>");
            std::process::exit(2);
        }
    };

    // 初始化 FFmpeg
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("FFmpeg 初始化失败: {}", e))?;

    // 打开媒体并启动解码/音频流水线（致命设置错误在这里退出）
    let manager =
        PlaybackManager::open(&path).map_err(|e| anyhow::anyhow!("无法开始播放: {}", e))?;

    let media_info = manager.media_info().clone();
    info!(
        "开始播放: {} ({}x{}, {:.1} fps, 时长 {}ms, 视频 {}, 音频 {})",
        path,
        media_info.width,
        media_info.height,
        media_info.fps,
        media_info.duration,
        media_info.video_codec,
        media_info.audio_codec
    );

    // 窗口标题带上文件名
    let title = std::path::Path::new(&path)
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| format!("Lethal Player - {}", name))
        .unwrap_or_else(|| "Lethal Player".to_string());

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([
                media_info.width.max(320) as f32,
                media_info.height.max(240) as f32,
            ])
            .with_title(title),
        ..Default::default()
    };

    eframe::run_native(
        "lethal_player",
        options,
        Box::new(move |cc| Box::new(PlayerApp::new(cc, manager))),
    )
    .map_err(|e| anyhow::anyhow!("应用启动失败: {}", e))?;

    Ok(())
}
