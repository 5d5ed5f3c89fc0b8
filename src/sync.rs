// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 标注同步: 帧 ↔ 标注文件配对, 缺失统计, 复制到训练标签目录

use std::fs;
use std::path::{Path, PathBuf};

use crate::annotation::{list_files, FrameName};
use crate::error::{IoContext, PipelineError, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};

/// 汇总中展示的缺失样例数
pub const MISSING_SAMPLE: usize = 5;

#[derive(Debug, Default)]
pub struct SyncOutcome {
    pub copied: usize,
    pub missing: Vec<String>,
    pub report: BatchReport,
}

impl SyncOutcome {
    /// 缺失数量 + 前几个缺失的帧名
    pub fn summary(&self) -> String {
        if self.missing.is_empty() {
            return format!("所有 {} 帧都有标注", self.copied);
        }
        let sample: Vec<&str> = self
            .missing
            .iter()
            .take(MISSING_SAMPLE)
            .map(String::as_str)
            .collect();
        let more = if self.missing.len() > MISSING_SAMPLE {
            ", ..."
        } else {
            ""
        };
        format!(
            "缺少标注: {} 帧 ({}{})",
            self.missing.len(),
            sample.join(", "),
            more
        )
    }
}

/// 为每个 `*.jpg` 帧查找同名 `.txt` 标注, 存在则复制到目标目录
pub fn sync_annotations(
    frame_dir: &Path,
    annotation_dir: &Path,
    dest_dir: &Path,
) -> Result<SyncOutcome> {
    fs::create_dir_all(dest_dir).at(dest_dir)?;

    let mut outcome = SyncOutcome::default();
    for frame in list_files(frame_dir, "jpg")? {
        let Some(stem) = frame.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let label = format!("{}.txt", stem);
        let src = annotation_dir.join(&label);

        if src.is_file() {
            let dst = dest_dir.join(&label);
            match fs::copy(&src, &dst) {
                Ok(_) => {
                    outcome.copied += 1;
                    outcome.report.succeed();
                }
                Err(e) => outcome.report.fail(Diagnostic::new(
                    DiagnosticKind::WriteFailed,
                    &dst,
                    e.to_string(),
                )),
            }
        } else {
            let name = frame
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or(stem);
            outcome.report.skip(Diagnostic::new(
                DiagnosticKind::MissingAnnotation,
                &frame,
                format!("no {} in {}", label, annotation_dir.display()),
            ));
            outcome.missing.push(name);
        }
    }

    log::info!("📋 {}", outcome.summary());
    Ok(outcome)
}

/// 把一帧的标注复制到同一视频的后续帧
///
/// `base_file` 必须符合帧命名规则, 起始序号从文件名中解析;
/// 写出序号 start, start+interval, ... (不超过 `end_index`)。
pub fn propagate_annotation(
    annotation_dir: &Path,
    base_file: &str,
    end_index: usize,
    interval: usize,
) -> Result<Vec<PathBuf>> {
    if interval == 0 {
        return Err(PipelineError::InvalidConfig(
            "propagation interval must be at least 1".to_string(),
        ));
    }
    let base = FrameName::parse(base_file).ok_or_else(|| {
        PipelineError::InvalidConfig(format!(
            "'{}' does not look like <video>_frame_<index>.txt",
            base_file
        ))
    })?;

    let base_path = annotation_dir.join(base_file);
    let content = fs::read_to_string(&base_path).at(&base_path)?;

    let mut written = Vec::new();
    for index in (base.index..=end_index).step_by(interval) {
        let path = annotation_dir.join(FrameName::new(base.video.as_str(), index).label_file());
        if path == base_path {
            continue;
        }
        fs::write(&path, &content).at(&path)?;
        written.push(path);
    }

    log::info!(
        "✅ {} 的标注已复制到 {} 个文件",
        base_file,
        written.len()
    );
    Ok(written)
}
