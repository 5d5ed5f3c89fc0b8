// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 推理视频: 逐帧检测 + 绘制, 每个视频先写临时文件, 最后按顺序拼接

use ab_glyph::FontVec;
use image::imageops::{self, FilterType};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::InferenceConfig;
use crate::detection::{overlay, Detector};
use crate::error::{IoContext, PipelineError, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};
use crate::video::{VideoBackend, VideoInfo};

#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub output: PathBuf,
    pub info: Option<VideoInfo>,
    pub per_video: Vec<(PathBuf, usize)>,
    pub frames_written: usize,
    pub detections: usize,
    pub report: BatchReport,
}

/// 临时文件放在最终输出旁边
pub fn temp_path(output: &Path, idx: usize) -> PathBuf {
    let dir = output.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("temp_inference_{}.mp4", idx))
}

/// 对每个视频做检测并写出带标注的视频
///
/// 第一个成功打开的视频决定输出的宽高和帧率, 其他尺寸的帧先缩放。
/// 打不开的视频跳过; 全部打不开时返回 [`PipelineError::NoVideoOpened`] 且不生成输出。
pub fn render_inference_video(
    backend: &dyn VideoBackend,
    detector: &mut dyn Detector,
    videos: &[PathBuf],
    output: &Path,
    config: &InferenceConfig,
    font: Option<&FontVec>,
) -> Result<RenderOutcome> {
    let mut outcome = RenderOutcome {
        output: output.to_path_buf(),
        ..Default::default()
    };
    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).at(dir)?;
    }

    let mut temps: Vec<PathBuf> = Vec::new();
    for (idx, video) in videos.iter().enumerate() {
        let mut source = match backend.open(video) {
            Ok(source) => source,
            Err(e) => {
                outcome.report.skip(Diagnostic::new(
                    DiagnosticKind::UnreadableVideo,
                    video,
                    e.to_string(),
                ));
                continue;
            }
        };
        let info = *outcome.info.get_or_insert(source.info());
        log::info!(
            "🎬 处理视频 {}/{}: {} ({}x{} @ {:.2} fps)",
            idx + 1,
            videos.len(),
            video.display(),
            info.width,
            info.height,
            info.fps
        );

        let temp = temp_path(output, idx);
        let mut sink = backend.create(&temp, info)?;
        let started = Instant::now();
        let mut frames = 0usize;
        while let Some(mut frame) = source.next_frame()? {
            if frame.dimensions() != (info.width, info.height) {
                frame = imageops::resize(&frame, info.width, info.height, FilterType::Triangle);
            }
            let boxes: Vec<_> = detector
                .detect(&frame)?
                .into_iter()
                .filter(|b| b.confidence() >= config.conf_threshold)
                .collect();
            outcome.detections += boxes.len();
            overlay::draw_detections(&mut frame, &boxes, detector.names(), font);
            sink.write_frame(&frame)?;
            frames += 1;
        }
        sink.finish()?;

        let secs = started.elapsed().as_secs_f64();
        log::info!(
            "✅ {} 完成: {} 帧, {:.1} fps",
            video.display(),
            frames,
            if secs > 0.0 { frames as f64 / secs } else { 0.0 }
        );
        outcome.report.succeed();
        outcome.per_video.push((video.clone(), frames));
        temps.push(temp);
    }

    let Some(info) = outcome.info else {
        return Err(PipelineError::NoVideoOpened);
    };

    outcome.frames_written = concatenate(backend, &temps, output, info)?;
    for temp in &temps {
        if let Err(e) = fs::remove_file(temp) {
            log::warn!("临时文件删除失败 {}: {}", temp.display(), e);
        }
    }

    log::info!(
        "🎉 推理视频已保存: {} ({} 帧, {} 个检测框)",
        output.display(),
        outcome.frames_written,
        outcome.detections
    );
    Ok(outcome)
}

/// 按顺序把临时视频逐帧写入最终输出
fn concatenate(
    backend: &dyn VideoBackend,
    parts: &[PathBuf],
    output: &Path,
    info: VideoInfo,
) -> Result<usize> {
    let mut sink = backend.create(output, info)?;
    let mut frames = 0usize;
    for part in parts {
        let mut source = backend.open(part)?;
        while let Some(frame) = source.next_frame()? {
            sink.write_frame(&frame)?;
            frames += 1;
        }
    }
    sink.finish()?;
    Ok(frames)
}
