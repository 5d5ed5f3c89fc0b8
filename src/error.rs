// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 流水线错误类型

use std::path::{Path, PathBuf};

/// 流水线统一错误
///
/// 单个样本级别的问题 (缺少标注、损坏图片) 不走这里,
/// 它们作为 [`crate::report::Diagnostic`] 收集到批处理报告中。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("video backend error ({path}): {message}")]
    Video { path: PathBuf, message: String },

    #[error("inference error: {0}")]
    Inference(#[from] ort::Error),

    #[error("resize error: {0}")]
    Resize(String),

    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("training engine failed (exit code {exit_code:?}): {message}")]
    Training {
        exit_code: Option<i32>,
        message: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no experiment under {0} has a results.csv")]
    NoExperimentData(PathBuf),

    #[error("none of the input videos could be opened")]
    NoVideoOpened,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn image(path: impl AsRef<Path>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn video(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Video {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }
}

/// 给 `std::io::Result` 附加路径
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| PipelineError::io(path, e))
    }
}
