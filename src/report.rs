// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 批处理结果与诊断收集

use std::fmt;
use std::path::{Path, PathBuf};

/// 诊断类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    MissingAnnotation, // 帧没有对应标注
    UnreadableImage,   // 图片无法解码
    UnreadableVideo,   // 视频无法打开
    MalformedLine,     // 标注行格式错误
    UnreadableLabel,   // 标注文件无法读取
    ClassOutOfRange,   // 类别ID超出类别表
    MissingResults,    // 实验目录缺少 results.csv
    UnreadableResults, // results.csv 无法解析
    WriteFailed,       // 输出写入失败
}

impl DiagnosticKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingAnnotation => "missing annotation",
            Self::UnreadableImage => "unreadable image",
            Self::UnreadableVideo => "unreadable video",
            Self::MalformedLine => "malformed line",
            Self::UnreadableLabel => "unreadable label file",
            Self::ClassOutOfRange => "class id out of range",
            Self::MissingResults => "missing results",
            Self::UnreadableResults => "unreadable results",
            Self::WriteFailed => "write failed",
        }
    }
}

/// 单条诊断记录
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: PathBuf,
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.as_ref().to_path_buf(),
            line: None,
            message: message.into(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(
                f,
                "[{}] {}:{}: {}",
                self.kind.label(),
                self.path.display(),
                line,
                self.message
            ),
            None => write!(
                f,
                "[{}] {}: {}",
                self.kind.label(),
                self.path.display(),
                self.message
            ),
        }
    }
}

/// 批处理报告: 成功/跳过/失败计数 + 诊断列表
///
/// 每条诊断在记录时同时以 `warn!` 输出。
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self) {
        self.succeeded += 1;
    }

    /// 整个条目被跳过
    pub fn skip(&mut self, diagnostic: Diagnostic) {
        self.skipped += 1;
        self.note(diagnostic);
    }

    /// 条目处理失败 (写入错误等)
    pub fn fail(&mut self, diagnostic: Diagnostic) {
        self.failed += 1;
        self.note(diagnostic);
    }

    /// 只记录诊断, 不影响计数 (例如跳过的标注行)
    pub fn note(&mut self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty() && self.failed == 0
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded += other.succeeded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.diagnostics.extend(other.diagnostics);
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "成功 {} | 跳过 {} | 失败 {} | 诊断 {}",
            self.succeeded,
            self.skipped,
            self.failed,
            self.diagnostics.len()
        )
    }
}
