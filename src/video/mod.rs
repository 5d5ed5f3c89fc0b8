// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 视频输入输出抽象: 逐帧读取 / 逐帧写入

mod ffmpeg;
mod memory;

pub use ffmpeg::{FfmpegBackend, RgbFrameFilter};
pub use memory::MemoryBackend;

use image::RgbImage;
use std::path::Path;

use crate::error::Result;

/// 视频基本信息
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// 按顺序产出 RGB 帧; 返回 `Ok(None)` 表示结束
///
/// 丢弃 source 即释放底层解码资源, 中途退出也一样。
pub trait FrameSource {
    fn info(&self) -> VideoInfo;
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// 逐帧写入视频文件, `finish` 之后文件才完整
pub trait FrameSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()>;
    fn finish(self: Box<Self>) -> Result<()>;
}

/// 视频编解码后端
pub trait VideoBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;
    fn create(&self, path: &Path, info: VideoInfo) -> Result<Box<dyn FrameSink>>;
}
