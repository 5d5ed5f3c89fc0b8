// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 抽帧: 视频 → 每隔 N 帧保存一张 JPEG

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::annotation::FrameName;
use crate::config::ExtractionConfig;
use crate::error::{IoContext, PipelineError, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};
use crate::video::VideoBackend;

/// 抽帧结果
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub frames_written: usize,
    pub per_video: Vec<(PathBuf, usize)>,
    pub report: BatchReport,
}

/// 以指定质量保存 JPEG
pub fn save_jpeg(img: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let file = File::create(path).at(path)?;
    let mut writer = BufWriter::new(file);
    let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    encoder
        .encode_image(img)
        .map_err(|e| PipelineError::image(path, e))?;
    writer.flush().at(path)
}

/// 逐个视频抽帧, 帧序号为 0, k, 2k, ...
///
/// 打不开的视频跳过并记录; 单帧写入失败记为失败后继续。
pub fn extract_frames(
    backend: &dyn VideoBackend,
    videos: &[PathBuf],
    output_dir: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractionOutcome> {
    if config.frame_interval == 0 {
        return Err(PipelineError::InvalidConfig(
            "frame interval must be at least 1".to_string(),
        ));
    }
    fs::create_dir_all(output_dir).at(output_dir)?;

    let mut outcome = ExtractionOutcome::default();
    for video in videos {
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

        let stem = video
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let mut index = 0usize;
        let mut written = 0usize;
        while let Some(frame) = source.next_frame()? {
            if index % config.frame_interval == 0 {
                let path = output_dir.join(FrameName::new(stem.as_str(), index).image_file());
                match save_jpeg(&frame, &path, config.jpeg_quality) {
                    Ok(()) => {
                        written += 1;
                        outcome.report.succeed();
                    }
                    Err(e) => outcome.report.fail(Diagnostic::new(
                        DiagnosticKind::WriteFailed,
                        &path,
                        e.to_string(),
                    )),
                }
            }
            index += 1;
        }

        log::info!(
            "🎞️ {}: 解码 {} 帧, 保存 {} 帧",
            video.display(),
            index,
            written
        );
        outcome.frames_written += written;
        outcome.per_video.push((video.clone(), written));
    }

    log::info!(
        "✅ 抽帧完成: 共 {} 帧 → {}",
        outcome.frames_written,
        output_dir.display()
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{MemoryBackend, VideoInfo};
    use image::Rgb;

    fn clip(backend: &MemoryBackend, path: &Path, n: usize) {
        let info = VideoInfo {
            width: 16,
            height: 8,
            fps: 30.0,
        };
        let frames = (0..n)
            .map(|i| RgbImage::from_pixel(16, 8, Rgb([i as u8, 0, 0])))
            .collect();
        backend.insert(path, info, frames);
    }

    #[test]
    fn test_ceil_frames_written() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let video = dir.path().join("clip.mov");
        clip(&backend, &video, 10);

        for (interval, expected) in [(1, 10), (3, 4), (4, 3), (10, 1), (11, 1)] {
            let out = dir.path().join(format!("frames_{}", interval));
            let config = ExtractionConfig {
                frame_interval: interval,
                jpeg_quality: 90,
            };
            let outcome = extract_frames(&backend, &[video.clone()], &out, &config).unwrap();
            assert_eq!(outcome.frames_written, expected, "interval {}", interval);
            assert_eq!(fs::read_dir(&out).unwrap().count(), expected);
        }
    }

    #[test]
    fn test_frame_names() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let video = dir.path().join("video1.mov");
        clip(&backend, &video, 7);

        let out = dir.path().join("frames");
        extract_frames(&backend, &[video], &out, &ExtractionConfig::default()).unwrap();
        for index in [0, 3, 6] {
            assert!(out.join(format!("video1_frame_{:05}.jpg", index)).exists());
        }
        assert!(!out.join("video1_frame_00001.jpg").exists());
    }

    #[test]
    fn test_unreadable_video_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let good = dir.path().join("good.mov");
        clip(&backend, &good, 3);

        let videos = vec![dir.path().join("missing.mov"), good];
        let outcome = extract_frames(
            &backend,
            &videos,
            &dir.path().join("frames"),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(outcome.frames_written, 1);
        assert_eq!(outcome.report.count(DiagnosticKind::UnreadableVideo), 1);
        assert_eq!(outcome.report.skipped, 1);
    }

    #[test]
    fn test_zero_interval() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig {
            frame_interval: 0,
            jpeg_quality: 95,
        };
        let err = extract_frames(&MemoryBackend::new(), &[], dir.path(), &config).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfig(_)));
    }
}
