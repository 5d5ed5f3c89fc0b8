// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLO 标注格式与帧命名规则

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IoContext, Result};
use crate::report::{BatchReport, Diagnostic, DiagnosticKind};

/// 帧文件名: `{视频名}_frame_{序号:05}.{扩展名}`
static FRAME_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<stem>.+)_frame_(?P<index>\d+)(?:\.(?P<ext>[A-Za-z0-9]+))?$")
        .expect("frame name pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameName {
    pub video: String,
    pub index: usize,
}

impl FrameName {
    pub fn new(video: impl Into<String>, index: usize) -> Self {
        Self {
            video: video.into(),
            index,
        }
    }

    /// 解析 `video1_frame_00042.jpg` / `video1_frame_00042.txt` / `video1_frame_00042`
    pub fn parse(name: &str) -> Option<Self> {
        let caps = FRAME_NAME.captures(name)?;
        let index = caps.name("index")?.as_str().parse().ok()?;
        Some(Self::new(caps.name("stem")?.as_str(), index))
    }

    pub fn stem(&self) -> String {
        format!("{}_frame_{:05}", self.video, self.index)
    }

    pub fn image_file(&self) -> String {
        format!("{}.jpg", self.stem())
    }

    pub fn label_file(&self) -> String {
        format!("{}.txt", self.stem())
    }
}

/// 单个标注框 (归一化 cx, cy, w, h)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
    pub class_id: usize,
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// 标注行解析失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum LineError {
    TokenCount(usize),
    NotNumeric(String),
    BadClassId(String),
    OutOfBounds,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TokenCount(n) => write!(f, "expected 5 fields, found {}", n),
            Self::NotNumeric(tok) => write!(f, "non-numeric field '{}'", tok),
            Self::BadClassId(tok) => write!(f, "invalid class id '{}'", tok),
            Self::OutOfBounds => write!(f, "box is not inside the unit square"),
        }
    }
}

const COORD_EPS: f32 = 1e-6;

impl YoloBox {
    pub fn new(class_id: usize, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            class_id,
            cx,
            cy,
            w,
            h,
        }
    }

    /// 解析一行 `class_id cx cy w h`
    pub fn parse_line(line: &str) -> std::result::Result<Self, LineError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(LineError::TokenCount(tokens.len()));
        }

        // 类别ID允许写成 "3" 或 "3.0"
        let class_id = match tokens[0].parse::<usize>() {
            Ok(id) => id,
            Err(_) => match tokens[0].parse::<f32>() {
                Ok(v) if v.is_finite() && v >= 0.0 && v.fract() == 0.0 => v as usize,
                Ok(_) => return Err(LineError::BadClassId(tokens[0].to_string())),
                Err(_) => return Err(LineError::NotNumeric(tokens[0].to_string())),
            },
        };

        let mut values = [0f32; 4];
        for (slot, tok) in values.iter_mut().zip(&tokens[1..]) {
            *slot = tok
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LineError::NotNumeric(tok.to_string()))?;
        }
        let [cx, cy, w, h] = values;

        let inside = |v: f32| (-COORD_EPS..=1.0 + COORD_EPS).contains(&v);
        if !(inside(cx) && inside(cy) && inside(w) && inside(h)) || w <= 0.0 || h <= 0.0 {
            return Err(LineError::OutOfBounds);
        }

        Ok(Self::new(class_id, cx, cy, w, h))
    }

    /// 像素坐标 (x1, y1, x2, y2)
    pub fn to_xyxy(&self, width: f32, height: f32) -> (f32, f32, f32, f32) {
        let x1 = (self.cx - self.w / 2.0) * width;
        let y1 = (self.cy - self.h / 2.0) * height;
        let x2 = (self.cx + self.w / 2.0) * width;
        let y2 = (self.cy + self.h / 2.0) * height;
        (x1, y1, x2, y2)
    }

    /// 由像素坐标构造, 先裁剪到图像范围; 面积为零时返回 None
    pub fn from_xyxy(
        class_id: usize,
        (x1, y1, x2, y2): (f32, f32, f32, f32),
        width: f32,
        height: f32,
    ) -> Option<Self> {
        let x1 = x1.clamp(0.0, width);
        let x2 = x2.clamp(0.0, width);
        let y1 = y1.clamp(0.0, height);
        let y2 = y2.clamp(0.0, height);
        let (bw, bh) = (x2 - x1, y2 - y1);
        if bw <= 1e-3 || bh <= 1e-3 {
            return None;
        }
        Some(Self::new(
            class_id,
            (x1 + bw / 2.0) / width,
            (y1 + bh / 2.0) / height,
            bw / width,
            bh / height,
        ))
    }
}

impl fmt::Display for YoloBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.cx, self.cy, self.w, self.h
        )
    }
}

/// 读取标注文件; 格式错误的行跳过并记入报告, 空行忽略
pub fn read_annotation(path: &Path, report: &mut BatchReport) -> Result<Vec<YoloBox>> {
    let text = fs::read_to_string(path).at(path)?;
    Ok(parse_annotation(&text, path, report))
}

pub fn parse_annotation(text: &str, path: &Path, report: &mut BatchReport) -> Vec<YoloBox> {
    let mut boxes = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match YoloBox::parse_line(line) {
            Ok(b) => boxes.push(b),
            Err(e) => report.note(
                Diagnostic::new(DiagnosticKind::MalformedLine, path, e.to_string()).at_line(i + 1),
            ),
        }
    }
    boxes
}

/// 目录下指定扩展名的文件 (不区分大小写), 按文件名排序
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).at(dir)? {
        let path = entry.at(dir)?.path();
        let matches = path
            .extension()
            .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
            .unwrap_or(false);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// 写标注文件, 每行一个框; 没有框时写空文件
pub fn write_annotation(path: &Path, boxes: &[YoloBox]) -> Result<()> {
    let mut text = String::new();
    for b in boxes {
        text.push_str(&b.to_string());
        text.push('\n');
    }
    fs::write(path, text).at(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_name_roundtrip() {
        let name = FrameName::new("video1", 42);
        assert_eq!(name.image_file(), "video1_frame_00042.jpg");
        assert_eq!(FrameName::parse("video1_frame_00042.jpg"), Some(name.clone()));
        assert_eq!(FrameName::parse("video1_frame_00042.txt"), Some(name));
    }

    #[test]
    fn test_frame_name_with_underscores() {
        let name = FrameName::parse("my_video_frame_01809.txt").unwrap();
        assert_eq!(name.video, "my_video");
        assert_eq!(name.index, 1809);
        assert!(FrameName::parse("random.jpg").is_none());
    }

    #[test]
    fn test_parse_line() {
        let b = YoloBox::parse_line("3 0.5 0.5 0.25 0.1").unwrap();
        assert_eq!(b.class_id, 3);
        assert!((b.w - 0.25).abs() < 1e-6);

        let b = YoloBox::parse_line("  2.0\t0.1 0.2 0.05 0.05 ").unwrap();
        assert_eq!(b.class_id, 2);
    }

    #[test]
    fn test_parse_line_rejects() {
        assert_eq!(
            YoloBox::parse_line("1 0.5 0.5 0.2"),
            Err(LineError::TokenCount(4))
        );
        assert!(matches!(
            YoloBox::parse_line("1 0.5 abc 0.2 0.2"),
            Err(LineError::NotNumeric(_))
        ));
        assert!(matches!(
            YoloBox::parse_line("-1 0.5 0.5 0.2 0.2"),
            Err(LineError::BadClassId(_))
        ));
        assert!(matches!(
            YoloBox::parse_line("1.5 0.5 0.5 0.2 0.2"),
            Err(LineError::BadClassId(_))
        ));
        assert_eq!(
            YoloBox::parse_line("0 1.5 0.5 0.2 0.2"),
            Err(LineError::OutOfBounds)
        );
        assert_eq!(
            YoloBox::parse_line("0 0.5 0.5 0.0 0.2"),
            Err(LineError::OutOfBounds)
        );
    }

    #[test]
    fn test_format_six_decimals() {
        let b = YoloBox::new(7, 0.5, 0.25, 0.125, 1.0 / 3.0);
        assert_eq!(b.to_string(), "7 0.500000 0.250000 0.125000 0.333333");
    }

    #[test]
    fn test_xyxy_clip() {
        let b = YoloBox::from_xyxy(0, (-10.0, 10.0, 50.0, 30.0), 100.0, 100.0).unwrap();
        assert!((b.cx - 0.25).abs() < 1e-6);
        assert!((b.w - 0.5).abs() < 1e-6);
        assert!((b.h - 0.2).abs() < 1e-6);
        assert!(YoloBox::from_xyxy(0, (110.0, 10.0, 150.0, 30.0), 100.0, 100.0).is_none());
    }

    #[test]
    fn test_parse_annotation_skips_bad_lines() {
        let mut report = BatchReport::new();
        let text = "0 0.5 0.5 0.2 0.2\n\nbroken line\n1 0.1 0.1 0.1 0.1\n";
        let boxes = parse_annotation(text, Path::new("a.txt"), &mut report);
        assert_eq!(boxes.len(), 2);
        assert_eq!(report.count(DiagnosticKind::MalformedLine), 1);
        assert_eq!(report.diagnostics[0].line, Some(3));
    }
}
