// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 交互菜单: 编号 → 动作 → 调用对应阶段

use std::fmt;
use std::path::{Path, PathBuf};

use crate::augment::augment_dataset;
use crate::config::{resolve, PipelineConfig};
use crate::dataset::{split_dataset, MANIFEST_FILE};
use crate::detection::{Detector, OnnxDetector};
use crate::error::{PipelineError, Result};
use crate::extract::extract_frames;
use crate::font::load_font;
use crate::metrics::plot_metrics;
use crate::render::render_inference_video;
use crate::sync::sync_annotations;
use crate::train::{train, TrainRequest, TrainingEngine, TrainingPreset};
use crate::video::VideoBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    Exit,
    ExtractFrames,
    SyncAnnotations,
    Augment,
    BuildDataset,
    TrainBaseline,
    /// 超参数优化, 第 1..=4 轮
    Optimize(u8),
    PlotMetrics,
    RenderInference,
}

impl MenuAction {
    /// 菜单显示顺序
    pub const ALL: [MenuAction; 12] = [
        MenuAction::ExtractFrames,
        MenuAction::SyncAnnotations,
        MenuAction::Augment,
        MenuAction::BuildDataset,
        MenuAction::TrainBaseline,
        MenuAction::Optimize(1),
        MenuAction::Optimize(2),
        MenuAction::Optimize(3),
        MenuAction::Optimize(4),
        MenuAction::PlotMetrics,
        MenuAction::RenderInference,
        MenuAction::Exit,
    ];

    pub fn number(&self) -> u8 {
        match self {
            MenuAction::Exit => 0,
            MenuAction::ExtractFrames => 1,
            MenuAction::SyncAnnotations => 2,
            MenuAction::Augment => 3,
            MenuAction::BuildDataset => 4,
            MenuAction::TrainBaseline => 5,
            MenuAction::Optimize(round) => 5 + round,
            MenuAction::PlotMetrics => 10,
            MenuAction::RenderInference => 11,
        }
    }

    /// 解析用户输入, 两端空白忽略; 不是 0-11 时返回 None
    pub fn from_input(input: &str) -> Option<Self> {
        let n: u8 = input.trim().parse().ok()?;
        Self::ALL.into_iter().find(|a| a.number() == n)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MenuAction::Exit => "退出",
            MenuAction::ExtractFrames => "从视频抽帧",
            MenuAction::SyncAnnotations => "检查并复制标注",
            MenuAction::Augment => "数据增强",
            MenuAction::BuildDataset => "创建数据集目录结构",
            MenuAction::TrainBaseline => "训练基线模型",
            MenuAction::Optimize(1) => "超参数优化 (第1轮, 从零训练)",
            MenuAction::Optimize(2) => "超参数优化 (第2轮, 从零训练)",
            MenuAction::Optimize(3) => "超参数优化 (第1轮, 基线模型微调)",
            MenuAction::Optimize(_) => "超参数优化 (第2轮, 基线模型微调)",
            MenuAction::PlotMetrics => "绘制指标图表",
            MenuAction::RenderInference => "生成推理视频",
        }
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}. {}", self.number(), self.label())
    }
}

pub fn print_menu() {
    println!("\n=== 🎛️  数据处理与训练流水线 ===");
    for action in MenuAction::ALL {
        println!("{}", action);
    }
}

/// 菜单动作的执行上下文
pub struct Pipeline {
    pub config: PipelineConfig,
    pub base: PathBuf,
    backend: Box<dyn VideoBackend>,
    engine: Box<dyn TrainingEngine>,
    detector: Option<Box<dyn Detector>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        base: impl Into<PathBuf>,
        backend: Box<dyn VideoBackend>,
        engine: Box<dyn TrainingEngine>,
    ) -> Self {
        Self {
            config,
            base: base.into(),
            backend,
            engine,
            detector: None,
        }
    }

    /// 指定检测器; 否则推理时从 `paths.inference_model` 加载 ONNX 模型
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = Some(detector);
        self
    }

    fn path(&self, p: &Path) -> PathBuf {
        resolve(&self.base, p)
    }

    fn preset(&self, action: MenuAction) -> Result<TrainingPreset> {
        match action {
            MenuAction::TrainBaseline => Ok(self.config.training.baseline.clone()),
            MenuAction::Optimize(round) => self
                .config
                .training
                .optimization
                .get(usize::from(round).wrapping_sub(1))
                .cloned()
                .ok_or_else(|| {
                    PipelineError::InvalidConfig(format!("no optimization preset for round {}", round))
                }),
            _ => Err(PipelineError::InvalidConfig(format!(
                "'{}' is not a training action",
                action.label()
            ))),
        }
    }

    /// 执行一个动作, 返回给用户看的摘要
    pub fn run(&mut self, action: MenuAction) -> Result<String> {
        let paths = self.config.paths.clone();
        match action {
            MenuAction::Exit => Ok("再见 👋".to_string()),
            MenuAction::ExtractFrames => {
                let videos: Vec<PathBuf> = paths.videos.iter().map(|v| self.path(v)).collect();
                let outcome = extract_frames(
                    self.backend.as_ref(),
                    &videos,
                    &self.path(&paths.frames),
                    &self.config.extraction,
                )?;
                Ok(format!(
                    "已抽取 {} 帧 ({}). 请用标注工具完成标注后继续下一步。",
                    outcome.frames_written, outcome.report
                ))
            }
            MenuAction::SyncAnnotations => {
                let outcome = sync_annotations(
                    &self.path(&paths.frames),
                    &self.path(&paths.annotations),
                    &self.path(&paths.synced_labels),
                )?;
                Ok(format!("已复制 {} 个标注. {}", outcome.copied, outcome.summary()))
            }
            MenuAction::Augment => {
                let outcome = augment_dataset(
                    &self.path(&paths.frames),
                    &self.path(&paths.annotations),
                    &self.path(&paths.augmented_images),
                    &self.path(&paths.augmented_labels),
                    &self.config.augmentation,
                    self.config.classes.len(),
                )?;
                Ok(format!(
                    "已生成 {} 个增强样本, 标注框 {} → {} ({})",
                    outcome.written, outcome.boxes_in, outcome.boxes_out, outcome.report
                ))
            }
            MenuAction::BuildDataset => {
                let outcome = split_dataset(
                    &self.path(&paths.augmented_images),
                    &self.path(&paths.augmented_labels),
                    &self.path(&paths.dataset),
                    &self.config.split,
                    &self.config.classes,
                )?;
                Ok(format!(
                    "train {} | val {} | test {}, 清单: {}",
                    outcome.split.train.len(),
                    outcome.split.val.len(),
                    outcome.split.test.len(),
                    outcome.manifest_path.display()
                ))
            }
            MenuAction::TrainBaseline | MenuAction::Optimize(_) => {
                let mut preset = self.preset(action)?;
                // 相对的 .pt 权重以工作目录为准, 模型名 (yolo11s.pt) 原样交给引擎
                let weights = self.path(Path::new(&preset.model));
                if weights.is_file() {
                    preset.model = weights.to_string_lossy().to_string();
                }
                let request = TrainRequest::from_preset(
                    &preset,
                    &self.path(&paths.dataset).join(MANIFEST_FILE),
                    &self.path(&paths.experiments),
                );
                let run = train(self.engine.as_mut(), &request)?;
                Ok(format!("训练完成: {}", run.run_dir.display()))
            }
            MenuAction::PlotMetrics => {
                let font = load_font(&self.fonts());
                let outcome = plot_metrics(
                    &self.path(&paths.experiments),
                    &self.path(&paths.plots),
                    &self.config.metrics,
                    font.as_ref(),
                )?;
                Ok(format!(
                    "实验 {:?}: {} 张图表已保存到 {}",
                    outcome.experiments,
                    outcome.charts.len(),
                    self.path(&paths.plots).display()
                ))
            }
            MenuAction::RenderInference => {
                if self.detector.is_none() {
                    let model = self.path(&paths.inference_model);
                    let detector =
                        OnnxDetector::new(&model, &self.config.inference, &self.config.classes)?;
                    self.detector = Some(Box::new(detector));
                }
                let font = load_font(&self.fonts());
                let videos: Vec<PathBuf> = paths.videos.iter().map(|v| self.path(v)).collect();
                let output = self.path(&paths.inference_output);
                let Some(detector) = self.detector.as_deref_mut() else {
                    return Err(PipelineError::InvalidConfig("no detector".to_string()));
                };
                let outcome = render_inference_video(
                    self.backend.as_ref(),
                    detector,
                    &videos,
                    &output,
                    &self.config.inference,
                    font.as_ref(),
                )?;
                Ok(format!(
                    "推理视频已保存: {} ({} 帧)",
                    outcome.output.display(),
                    outcome.frames_written
                ))
            }
        }
    }

    fn fonts(&self) -> Vec<PathBuf> {
        self.config.fonts.iter().map(|p| self.path(p)).collect()
    }
}
