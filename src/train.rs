// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 训练调用: 超参数预设 → 外部训练引擎 (Ultralytics `yolo` CLI)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{PipelineError, Result};

/// 转交给训练引擎的超参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    // === 训练控制 ===
    pub epochs: u32,
    pub batch: u32,
    pub imgsz: u32,
    pub device: String,
    pub workers: u32,
    pub patience: u32,
    pub val: bool,

    // === 优化器 ===
    pub optimizer: String,
    pub lr0: f64,
    pub lrf: f64,
    pub momentum: f64,
    pub weight_decay: f64,
    pub cos_lr: bool,
    pub freeze: Option<u32>, // 冻结前N层

    // === 在线增强 ===
    pub hsv_h: f64,
    pub hsv_s: f64,
    pub hsv_v: f64,
    pub degrees: f64,
    pub translate: f64,
    pub scale: f64,
    pub shear: f64,
    pub perspective: f64,
    pub flipud: f64,
    pub fliplr: f64,
    pub mosaic: f64,
    pub mixup: f64,
    pub auto_augment: String,
    pub multi_scale: bool,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch: 4,
            imgsz: 640,
            device: "0".to_string(),
            workers: 4,
            patience: 15,
            val: true,

            optimizer: "AdamW".to_string(),
            lr0: 0.001,
            lrf: 0.0001,
            momentum: 0.937,
            weight_decay: 0.0005,
            cos_lr: true,
            freeze: Some(10),

            hsv_h: 0.015,
            hsv_s: 0.7,
            hsv_v: 0.4,
            degrees: 30.0,
            translate: 0.2,
            scale: 0.9,
            shear: 0.2,
            perspective: 0.001,
            flipud: 0.5,
            fliplr: 0.5,
            mosaic: 1.0,
            mixup: 0.2,
            auto_augment: "randaugment".to_string(),
            multi_scale: true,
        }
    }
}

impl Hyperparameters {
    /// `key=value` 形式的 CLI 参数
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("epochs={}", self.epochs),
            format!("batch={}", self.batch),
            format!("imgsz={}", self.imgsz),
            format!("device={}", self.device),
            format!("workers={}", self.workers),
            format!("patience={}", self.patience),
            format!("val={}", py_bool(self.val)),
            format!("optimizer={}", self.optimizer),
            format!("lr0={}", self.lr0),
            format!("lrf={}", self.lrf),
            format!("momentum={}", self.momentum),
            format!("weight_decay={}", self.weight_decay),
            format!("cos_lr={}", py_bool(self.cos_lr)),
        ];
        if let Some(freeze) = self.freeze {
            args.push(format!("freeze={}", freeze));
        }
        args.extend([
            format!("hsv_h={}", self.hsv_h),
            format!("hsv_s={}", self.hsv_s),
            format!("hsv_v={}", self.hsv_v),
            format!("degrees={}", self.degrees),
            format!("translate={}", self.translate),
            format!("scale={}", self.scale),
            format!("shear={}", self.shear),
            format!("perspective={}", self.perspective),
            format!("flipud={}", self.flipud),
            format!("fliplr={}", self.fliplr),
            format!("mosaic={}", self.mosaic),
            format!("mixup={}", self.mixup),
            format!("auto_augment={}", self.auto_augment),
            format!("multi_scale={}", py_bool(self.multi_scale)),
        ]);
        args
    }
}

fn py_bool(v: bool) -> &'static str {
    if v {
        "True"
    } else {
        "False"
    }
}

/// 命名的训练预设: 起始模型 + 超参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingPreset {
    pub name: String,
    /// 预训练权重 (`*.pt`) 或模型结构 (`*.yaml`); 相对路径以工作目录为准
    pub model: String,
    pub hyperparameters: Hyperparameters,
}

impl TrainingPreset {
    pub fn baseline() -> Self {
        Self {
            name: "baseline".to_string(),
            model: "yolo11s.pt".to_string(),
            hyperparameters: Hyperparameters::default(),
        }
    }

    /// 超参数优化的四轮预设
    ///
    /// 第1、2轮从零开始训练模型结构, 第3、4轮在基线权重上微调。
    pub fn optimization_rounds(baseline_weights: &str) -> Vec<Self> {
        let base = Hyperparameters::default();
        vec![
            Self {
                name: "optimized".to_string(),
                model: "yolo11s.yaml".to_string(),
                hyperparameters: Hyperparameters {
                    epochs: 150,
                    patience: 30,
                    optimizer: "SGD".to_string(),
                    lr0: 0.01,
                    lrf: 0.01,
                    cos_lr: false,
                    freeze: None,
                    ..base.clone()
                },
            },
            Self {
                name: "optimized".to_string(),
                model: "yolo11s.yaml".to_string(),
                hyperparameters: Hyperparameters {
                    epochs: 200,
                    patience: 30,
                    lr0: 0.002,
                    lrf: 0.001,
                    freeze: None,
                    degrees: 15.0,
                    mixup: 0.1,
                    ..base.clone()
                },
            },
            Self {
                name: "optimized".to_string(),
                model: baseline_weights.to_string(),
                hyperparameters: Hyperparameters {
                    epochs: 60,
                    lr0: 0.0005,
                    lrf: 0.00005,
                    freeze: Some(10),
                    degrees: 10.0,
                    scale: 0.5,
                    mixup: 0.1,
                    ..base.clone()
                },
            },
            Self {
                name: "optimized".to_string(),
                model: baseline_weights.to_string(),
                hyperparameters: Hyperparameters {
                    epochs: 40,
                    lr0: 0.0002,
                    lrf: 0.00002,
                    freeze: None,
                    degrees: 5.0,
                    translate: 0.1,
                    scale: 0.3,
                    shear: 0.0,
                    perspective: 0.0,
                    flipud: 0.0,
                    mosaic: 0.5,
                    mixup: 0.0,
                    multi_scale: false,
                    ..base
                },
            },
        ]
    }
}

/// 一次训练请求
#[derive(Clone, Debug, PartialEq)]
pub struct TrainRequest {
    pub manifest: PathBuf,
    pub project: PathBuf,
    pub name: String,
    pub model: String,
    pub hyperparameters: Hyperparameters,
}

impl TrainRequest {
    pub fn from_preset(preset: &TrainingPreset, manifest: &Path, project: &Path) -> Self {
        Self {
            manifest: manifest.to_path_buf(),
            project: project.to_path_buf(),
            name: preset.name.clone(),
            model: preset.model.clone(),
            hyperparameters: preset.hyperparameters.clone(),
        }
    }

    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "detect".to_string(),
            "train".to_string(),
            format!("model={}", self.model),
            format!("data={}", self.manifest.display()),
            format!("project={}", self.project.display()),
            format!("name={}", self.name),
        ];
        args.extend(self.hyperparameters.to_args());
        args
    }
}

/// 训练引擎返回的结果, 原样交给调用方
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingRun {
    pub command: String,
    pub exit_code: Option<i32>,
    /// 实验输出目录 (project/name; 引擎可能自动追加序号)
    pub run_dir: PathBuf,
}

/// 外部训练引擎
pub trait TrainingEngine {
    fn train(&mut self, request: &TrainRequest) -> Result<TrainingRun>;
}

/// Ultralytics 命令行 `yolo detect train ...`
pub struct UltralyticsCli {
    program: String,
}

impl UltralyticsCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TrainingEngine for UltralyticsCli {
    fn train(&mut self, request: &TrainRequest) -> Result<TrainingRun> {
        let args = request.to_args();
        let command = format!("{} {}", self.program, args.join(" "));
        log::info!("🚀 启动训练: {}", command);

        // 标准输出/错误直接继承, 训练进度显示在终端
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|e| PipelineError::Training {
                exit_code: None,
                message: format!("failed to spawn '{}': {}", self.program, e),
            })?;

        if !status.success() {
            return Err(PipelineError::Training {
                exit_code: status.code(),
                message: format!("'{}' exited with {}", command, status),
            });
        }

        Ok(TrainingRun {
            command,
            exit_code: status.code(),
            run_dir: request.project.join(&request.name),
        })
    }
}

/// 把请求交给引擎, 结果不做任何加工
pub fn train(engine: &mut dyn TrainingEngine, request: &TrainRequest) -> Result<TrainingRun> {
    log::info!(
        "📊 训练 {} (model={}, epochs={}, batch={}, imgsz={})",
        request.name,
        request.model,
        request.hyperparameters.epochs,
        request.hyperparameters.batch,
        request.hyperparameters.imgsz
    );
    engine.train(request)
}
