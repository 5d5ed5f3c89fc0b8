// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
//! 流水线配置 - 通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};
use crate::train::TrainingPreset;

pub const DEFAULT_CONFIG_FILE: &str = "pipeline.json";

/// 目录布局 (相对于工作目录, 绝对路径原样使用)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub videos: Vec<PathBuf>,
    pub frames: PathBuf,
    pub annotations: PathBuf,
    pub synced_labels: PathBuf,
    pub augmented_images: PathBuf,
    pub augmented_labels: PathBuf,
    pub dataset: PathBuf,
    pub experiments: PathBuf,
    pub plots: PathBuf,
    pub inference_model: PathBuf,
    pub inference_output: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            videos: (1..=6)
                .map(|i| PathBuf::from(format!("videos/video{}.mov", i)))
                .collect(),
            frames: "frames".into(),
            annotations: "annotations".into(),
            synced_labels: "annotations/dataset/train/labels".into(),
            augmented_images: "annotations/augmented/images".into(),
            augmented_labels: "annotations/augmented/labels".into(),
            dataset: "annotations/dataset".into(),
            experiments: "annotations/experiments".into(),
            plots: "annotations/experiments/plots".into(),
            inference_model: "annotations/experiments/baseline/weights/best.onnx".into(),
            inference_output: "inference.mp4".into(),
        }
    }
}

/// 抽帧参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    pub frame_interval: usize, // 每隔N帧保存一帧
    pub jpeg_quality: u8,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            frame_interval: 3,
            jpeg_quality: 95,
        }
    }
}

/// 离线增强参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentConfig {
    pub flip_prob: f64,               // 水平翻转概率
    pub brightness_contrast_prob: f64, // 亮度/对比度概率
    pub brightness_limit: f32,
    pub contrast_limit: f32,
    pub rotate_prob: f64,
    pub rotate_limit: f32, // 角度, ±
    pub crop_prob: f64,
    pub crop_size: (u32, u32),
    pub output_size: Option<(u32, u32)>, // None: 保持原尺寸
    pub jpeg_quality: u8,
    pub seed: Option<u64>,
}

impl Default for AugmentConfig {
    fn default() -> Self {
        Self {
            flip_prob: 0.5,
            brightness_contrast_prob: 0.3,
            brightness_limit: 0.2,
            contrast_limit: 0.2,
            rotate_prob: 0.3,
            rotate_limit: 30.0,
            crop_prob: 0.3,
            crop_size: (512, 512),
            output_size: Some((640, 640)),
            jpeg_quality: 95,
            seed: None,
        }
    }
}

impl AugmentConfig {
    /// 不做任何随机变换, 只保留 resize
    pub fn disabled() -> Self {
        Self {
            flip_prob: 0.0,
            brightness_contrast_prob: 0.0,
            rotate_prob: 0.0,
            crop_prob: 0.0,
            output_size: None,
            ..Self::default()
        }
    }
}

/// 数据集划分参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    pub holdout_ratio: f64, // 第一次划分: 验证+测试占比
    pub test_ratio: f64,    // 第二次划分: 余下部分中测试集占比
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            holdout_ratio: 0.3,
            test_ratio: 0.5,
            seed: 42,
        }
    }
}

/// 训练参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub program: String,
    pub baseline: TrainingPreset,
    pub optimization: Vec<TrainingPreset>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            program: "yolo".to_string(),
            baseline: TrainingPreset::baseline(),
            optimization: TrainingPreset::optimization_rounds(
                "annotations/experiments/baseline/weights/best.pt",
            ),
        }
    }
}

/// 指标图表参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub compare: Option<Vec<String>>, // 只比较这些实验
    pub write_report: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            compare: None,
            write_report: true,
        }
    }
}

/// 推理视频参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub input_size: u32,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub video_codec: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.5,
            iou_threshold: 0.45,
            video_codec: "mpeg4".to_string(),
        }
    }
}

pub fn default_classes() -> Vec<String> {
    [
        "steak",
        "salad",
        "soup",
        "cake",
        "tea",
        "empty_plate_steak",
        "empty_plate_salad",
        "empty_plate_soup",
        "empty_plate_cake",
        "cup",
        "empty_cup",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// 字体候选 (找到第一个存在的)
pub fn default_font_candidates() -> Vec<PathBuf> {
    [
        "assets/font/msyh.ttc",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        "C:\\Windows\\Fonts\\arial.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// 流水线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub extraction: ExtractionConfig,
    pub augmentation: AugmentConfig,
    pub split: SplitConfig,
    pub classes: Vec<String>,
    pub training: TrainingConfig,
    pub metrics: MetricsConfig,
    pub inference: InferenceConfig,
    pub fonts: Vec<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            extraction: ExtractionConfig::default(),
            augmentation: AugmentConfig::default(),
            split: SplitConfig::default(),
            classes: default_classes(),
            training: TrainingConfig::default(),
            metrics: MetricsConfig::default(),
            inference: InferenceConfig::default(),
            fonts: default_font_candidates(),
        }
    }
}

impl PipelineConfig {
    /// 从JSON文件加载配置; 不存在时写出默认配置, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    log::info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    log::error!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| PipelineError::io(path, e))?;
        log::info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 检查互相矛盾或无意义的参数
    pub fn validate(&self) -> Result<()> {
        if self.extraction.frame_interval == 0 {
            return Err(PipelineError::InvalidConfig(
                "extraction.frame_interval must be at least 1".to_string(),
            ));
        }
        for (name, ratio) in [
            ("split.holdout_ratio", self.split.holdout_ratio),
            ("split.test_ratio", self.split.test_ratio),
        ] {
            if !(0.0..1.0).contains(&ratio) {
                return Err(PipelineError::InvalidConfig(format!(
                    "{} must be in [0, 1), got {}",
                    name, ratio
                )));
            }
        }
        if self.classes.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "classes must not be empty".to_string(),
            ));
        }
        if self.training.optimization.len() != 4 {
            return Err(PipelineError::InvalidConfig(format!(
                "training.optimization needs 4 presets, got {}",
                self.training.optimization.len()
            )));
        }
        Ok(())
    }

    /// 第一个存在的字体文件
    pub fn font_path(&self, base: &Path) -> Option<PathBuf> {
        self.fonts.iter().map(|p| resolve(base, p)).find(|p| p.is_file())
    }

    /// 打印当前配置
    pub fn print_summary(&self, base: &Path) {
        println!("\n🎛️  当前流水线配置:");
        println!("  工作目录: {}", base.display());
        println!("  视频数量: {}", self.paths.videos.len());
        println!("  抽帧间隔: {}", self.extraction.frame_interval);
        println!(
            "  划分比例: 训练 {:.0}% | 验证/测试 {:.0}% | 种子 {}",
            (1.0 - self.split.holdout_ratio) * 100.0,
            self.split.holdout_ratio * 100.0,
            self.split.seed
        );
        println!("  类别数: {}", self.classes.len());
        println!("  训练程序: {}", self.training.program);
        println!(
            "  推理: 输入 {} | 置信度 {:.2} | IOU {:.2}\n",
            self.inference.input_size, self.inference.conf_threshold, self.inference.iou_threshold
        );
    }
}

/// 相对路径拼接到工作目录
pub fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classes.len(), 11);
        assert_eq!(config.paths.videos.len(), 6);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = PipelineConfig::default();
        config.extraction.frame_interval = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let config = PipelineConfig::load(&path);
        assert!(path.exists());
        assert_eq!(config, PipelineConfig::default());

        let reloaded = PipelineConfig::load(&path);
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "classes": ["a", "b"] }"#).unwrap();
        let config = PipelineConfig::load(&path);
        assert_eq!(config.classes, vec!["a", "b"]);
        assert_eq!(config.split.seed, 42);
    }

    #[test]
    fn test_resolve() {
        let base = Path::new("/work");
        assert_eq!(resolve(base, Path::new("frames")), PathBuf::from("/work/frames"));
        assert_eq!(resolve(base, Path::new("/abs")), PathBuf::from("/abs"));
    }
}
