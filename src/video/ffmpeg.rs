// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// FFmpeg 后端
// 解码: ez-ffmpeg 帧过滤器 → RGB24 → crossbeam 通道
// 编码: ffmpeg 命令行, rawvideo 通过 stdin 输入

use crossbeam_channel::{bounded, Receiver, Sender};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame};
use image::RgbImage;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

use super::{FrameSink, FrameSource, VideoBackend, VideoInfo};
use crate::error::{PipelineError, Result};

const FRAME_QUEUE: usize = 8;
const FALLBACK_FPS: f64 = 30.0;

/// FFmpeg解码过滤器: 视频帧 → RgbImage
pub struct RgbFrameFilter {
    tx: Option<Sender<RgbImage>>,
    pub count: usize,
}

impl RgbFrameFilter {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self { tx: Some(tx), count: 0 }
    }
}

impl FrameFilter for RgbFrameFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        log::debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<Frame>, String> {
        let Some(tx) = self.tx.as_ref() else {
            return Err("frame receiver already released".to_string());
        };

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() {
                return Ok(Some(frame));
            }

            let w = (*frame.as_ptr()).width as usize;
            let h = (*frame.as_ptr()).height as usize;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0] as usize;

            // filter_desc 已经转成 rgb24 (packed, 单平面)
            if w == 0 || h == 0 || data.is_null() || stride < w * 3 {
                log::warn!("⚠️ 丢弃帧 #{}: 非法帧 {}x{} stride={}", self.count, w, h, stride);
                return Ok(Some(frame));
            }

            let row_bytes = w * 3;
            let mut buf = Vec::with_capacity(row_bytes * h);
            for y in 0..h {
                let row = std::slice::from_raw_parts(data.add(y * stride), row_bytes);
                buf.extend_from_slice(row);
            }

            let Some(img) = RgbImage::from_raw(w as u32, h as u32, buf) else {
                return Err("frame buffer size mismatch".to_string());
            };
            self.count += 1;

            // 接收端已丢弃: 返回错误让 FFmpeg 停止解码
            if tx.send(img).is_err() {
                return Err("frame receiver closed".to_string());
            }
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        self.tx.take();
        log::debug!("✅ 解码线程退出, 共 {} 帧", self.count);
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// "30000/1001" → 29.97
fn parse_fraction(s: &str) -> f64 {
    match s.split_once('/') {
        Some((num, den)) => {
            let num = num.trim().parse::<f64>().unwrap_or(0.0);
            let den = den.trim().parse::<f64>().unwrap_or(0.0);
            if den > 0.0 {
                num / den
            } else {
                0.0
            }
        }
        None => s.trim().parse::<f64>().unwrap_or(0.0),
    }
}

/// FFmpeg 编解码后端
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
    codec: String,
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("mpeg4")
    }
}

impl FfmpegBackend {
    pub fn new(codec: impl Into<String>) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            codec: codec.into(),
        }
    }

    /// 用 ffprobe 读取第一个视频流的尺寸和帧率
    pub fn probe(&self, path: &Path) -> Result<VideoInfo> {
        if !path.is_file() {
            return Err(PipelineError::video(path, "file not found"));
        }

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height,r_frame_rate,avg_frame_rate",
                "-of",
                "json",
            ])
            .arg(path)
            .output()
            .map_err(|e| PipelineError::video(path, format!("ffprobe not available: {}", e)))?;

        if !output.status.success() {
            return Err(PipelineError::video(
                path,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        let stream = probe
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::video(path, "no video stream"))?;

        let (width, height) = match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
            _ => return Err(PipelineError::video(path, "video stream has no dimensions")),
        };

        let fps = [stream.avg_frame_rate, stream.r_frame_rate]
            .into_iter()
            .flatten()
            .map(|s| parse_fraction(&s))
            .find(|fps| *fps > 0.0)
            .unwrap_or(FALLBACK_FPS);

        Ok(VideoInfo { width, height, fps })
    }
}

impl VideoBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let info = self.probe(path)?;

        let (tx, rx) = bounded::<RgbImage>(FRAME_QUEUE);
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let url = path.to_string_lossy().to_string();

        let handle = thread::Builder::new()
            .name("video-decode".to_string())
            .spawn(move || -> std::result::Result<(), String> {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("rgb", Box::new(RgbFrameFilter::new(tx)));
                let out = create_null_output().add_frame_pipeline(pipe);

                let ctx = match FfmpegContext::builder()
                    .input(url.as_str())
                    .filter_desc("format=rgb24")
                    .output(out)
                    .build()
                {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let msg = format!("构建失败: {}", e);
                        let _ = ready_tx.send(Err(msg.clone()));
                        return Err(msg);
                    }
                };

                let sch = match ctx.start() {
                    Ok(sch) => sch,
                    Err(e) => {
                        let msg = format!("启动失败: {}", e);
                        let _ = ready_tx.send(Err(msg.clone()));
                        return Err(msg);
                    }
                };
                let _ = ready_tx.send(Ok(()));

                sch.wait().map_err(|e| e.to_string())
            })
            .map_err(|e| PipelineError::io(path, e))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(msg)) => return Err(PipelineError::video(path, msg)),
            Err(_) => return Err(PipelineError::video(path, "decoder thread exited")),
        }

        log::debug!(
            "🎬 打开视频 {} ({}x{} @ {:.2}fps)",
            path.display(),
            info.width,
            info.height,
            info.fps
        );

        Ok(Box::new(FfmpegSource {
            path: path.to_path_buf(),
            info,
            rx,
            handle: Some(handle),
        }))
    }

    fn create(&self, path: &Path, info: VideoInfo) -> Result<Box<dyn FrameSink>> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", info.width, info.height)])
            .args(["-r", &format!("{}", info.fps)])
            .args(["-i", "-", "-an", "-c:v", &self.codec, "-q:v", "3"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PipelineError::video(path, format!("ffmpeg not available: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PipelineError::video(path, "ffmpeg stdin unavailable"))?;

        Ok(Box::new(FfmpegSink {
            path: path.to_path_buf(),
            info,
            child,
            stdin: Some(stdin),
        }))
    }
}

struct FfmpegSource {
    path: PathBuf,
    info: VideoInfo,
    rx: Receiver<RgbImage>,
    handle: Option<JoinHandle<std::result::Result<(), String>>>,
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> VideoInfo {
        self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if let Ok(frame) = self.rx.recv() {
            return Ok(Some(frame));
        }

        // 通道关闭 = 解码结束; 解码中途出错时按结束处理, 只记录日志
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(msg)) => log::warn!("⚠️ 解码提前结束 {}: {}", self.path.display(), msg),
                Err(_) => log::warn!("⚠️ 解码线程异常退出 {}", self.path.display()),
            }
        }
        Ok(None)
    }
}

struct FfmpegSink {
    path: PathBuf,
    info: VideoInfo,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.info.width, self.info.height) {
            return Err(PipelineError::video(
                &self.path,
                format!(
                    "frame is {}x{}, stream is {}x{}",
                    frame.width(),
                    frame.height(),
                    self.info.width,
                    self.info.height
                ),
            ));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| PipelineError::video(&self.path, "encoder already closed"))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| PipelineError::video(&self.path, format!("encoder pipe: {}", e)))
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        // 关闭 stdin 通知 ffmpeg 输入结束
        drop(self.stdin.take());
        let output = self
            .child
            .wait_with_output()
            .map_err(|e| PipelineError::io(&self.path, e))?;
        if !output.status.success() {
            return Err(PipelineError::video(
                &self.path,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}
